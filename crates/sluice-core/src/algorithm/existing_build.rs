//! Lookup of builds a job already ran for an input's resource.

use std::collections::BTreeMap;

use super::sets::BuildSet;
use super::versions_db::VersionStore;
use crate::{JobId, ResourceId, VersionId};

/// Answers whether the job owning an input already has a build that
/// consumed a given version of the input's resource.
#[derive(Debug, Clone, Default)]
pub struct ExistingBuildResolver {
    builds: BTreeMap<VersionId, BuildSet>,
}

impl ExistingBuildResolver {
    pub fn new(
        store: &(impl VersionStore + ?Sized),
        job_id: JobId,
        resource_id: ResourceId,
    ) -> Self {
        Self {
            builds: store.build_inputs_for(job_id, resource_id),
        }
    }

    pub fn exists_for_version(&self, version_id: VersionId) -> bool {
        self.builds
            .get(&version_id)
            .is_some_and(|builds| !builds.is_empty())
    }
}
