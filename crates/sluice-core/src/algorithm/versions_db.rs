//! Point-in-time snapshot of resource versions and build history.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::candidates::VersionCandidates;
use super::sets::{BuildSet, JobSet};
use crate::pipeline::Version;
use crate::{BuildId, JobId, ResourceId, VersionId};

/// Read-only queries the resolver makes against version history.
///
/// Implementations must answer every call of one resolution from the same
/// point in time.
pub trait VersionStore {
    /// Every recorded version of the resource, without build references.
    fn all_versions_for_resource(&self, resource_id: ResourceId) -> VersionCandidates;

    /// Versions of the resource that, for every job in `passed`, were an
    /// input or output of at least one successful build of that job.
    fn versions_of_resource_passed_jobs(
        &self,
        resource_id: ResourceId,
        passed: &JobSet,
    ) -> VersionCandidates;

    /// Builds of `job_id` that consumed each version of the resource.
    fn build_inputs_for(&self, job_id: JobId, resource_id: ResourceId)
    -> BTreeMap<VersionId, BuildSet>;
}

/// A recorded version of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub version_id: VersionId,
    pub resource_id: ResourceId,
    pub check_order: i64,
    #[serde(default)]
    pub version: Version,
}

/// A version a build consumed, whatever the build's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInput {
    pub version_id: VersionId,
    pub resource_id: ResourceId,
    pub check_order: i64,
    pub build_id: BuildId,
    pub job_id: JobId,
    pub input_name: String,
}

/// A version a successful build produced or consumed.
///
/// Inputs of successful builds are recorded here as implicit outputs, so a
/// version counts as having passed a job once any successful build of that
/// job touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub version_id: VersionId,
    pub resource_id: ResourceId,
    pub check_order: i64,
    pub build_id: BuildId,
    pub job_id: JobId,
}

/// Immutable snapshot of a pipeline's version history, loaded once per
/// scheduling tick and shared by every job resolved in that tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionsDb {
    pub resource_versions: Vec<ResourceVersion>,
    pub build_inputs: Vec<BuildInput>,
    pub build_outputs: Vec<BuildOutput>,
    pub job_ids: HashMap<String, JobId>,
    pub resource_ids: HashMap<String, ResourceId>,
}

impl VersionsDb {
    pub fn job_id(&self, name: &str) -> Option<JobId> {
        self.job_ids.get(name).copied()
    }

    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.resource_ids.get(name).copied()
    }

    /// The newest version of the resource whose payload contains every
    /// field of `pinned`.
    pub fn find_version(&self, resource_id: ResourceId, pinned: &Version) -> Option<VersionId> {
        self.resource_versions
            .iter()
            .filter(|rv| rv.resource_id == resource_id)
            .filter(|rv| pinned.iter().all(|(k, v)| rv.version.get(k) == Some(v)))
            .max_by_key(|rv| (rv.check_order, rv.version_id))
            .map(|rv| rv.version_id)
    }

    fn passed_through(&self, resource_id: ResourceId, job_id: JobId) -> VersionCandidates {
        let mut candidates = VersionCandidates::new();
        for output in &self.build_outputs {
            if output.resource_id == resource_id && output.job_id == job_id {
                candidates.add_build(output.version_id, output.check_order, job_id, output.build_id);
            }
        }
        candidates
    }
}

impl VersionStore for VersionsDb {
    fn all_versions_for_resource(&self, resource_id: ResourceId) -> VersionCandidates {
        let mut candidates = VersionCandidates::new();
        for rv in &self.resource_versions {
            if rv.resource_id == resource_id {
                candidates.add_version(rv.version_id, rv.check_order);
            }
        }
        candidates
    }

    fn versions_of_resource_passed_jobs(
        &self,
        resource_id: ResourceId,
        passed: &JobSet,
    ) -> VersionCandidates {
        let mut jobs = passed.iter();
        let Some(first) = jobs.next() else {
            return VersionCandidates::new();
        };

        let mut candidates = self.passed_through(resource_id, first);
        for job_id in jobs {
            if candidates.is_empty() {
                break;
            }
            candidates = candidates.intersect_by_version(&self.passed_through(resource_id, job_id));
        }
        candidates
    }

    fn build_inputs_for(
        &self,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> BTreeMap<VersionId, BuildSet> {
        let mut builds: BTreeMap<VersionId, BuildSet> = BTreeMap::new();
        for input in &self.build_inputs {
            if input.job_id == job_id && input.resource_id == resource_id {
                builds.entry(input.version_id).or_default().insert(input.build_id);
            }
        }
        builds
    }
}
