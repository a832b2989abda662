//! Job input configuration and the entry point of resolution.

use std::cmp::Reverse;
use tracing::debug;

use super::existing_build::ExistingBuildResolver;
use super::input_candidates::{InputCandidates, InputVersionCandidates};
use super::resolution::{MissingInputReasons, Resolution};
use super::sets::JobSet;
use super::versions_db::VersionStore;
use crate::{JobId, ResourceId, VersionId};

/// One input of a job, with names already resolved to ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConfig {
    /// Input name, unique within the job.
    pub name: String,
    /// Job that owns the input.
    pub job_id: JobId,
    pub resource_id: ResourceId,
    /// Upstream jobs the chosen version must have passed through.
    pub passed: JobSet,
    pub use_every_version: bool,
    /// Takes precedence over `use_every_version`.
    pub pinned_version_id: Option<VersionId>,
}

/// Every input of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputConfigs(Vec<InputConfig>);

impl From<Vec<InputConfig>> for InputConfigs {
    fn from(configs: Vec<InputConfig>) -> Self {
        Self(configs)
    }
}

impl FromIterator<InputConfig> for InputConfigs {
    fn from_iter<I: IntoIterator<Item = InputConfig>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl InputConfigs {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputConfig> {
        self.0.iter()
    }

    /// Choose one version per input against a single snapshot.
    ///
    /// The first input with an empty pool fails the whole resolution with
    /// only that input's reason. Otherwise the result is either a mapping
    /// covering every input or the reasons for every input that could not be
    /// satisfied.
    pub fn resolve<S: VersionStore + ?Sized>(&self, store: &S) -> Resolution {
        let mut jobs = JobSet::new();
        let mut candidates = Vec::with_capacity(self.0.len());

        for config in &self.0 {
            let versions = if config.passed.is_empty() {
                let versions = store.all_versions_for_resource(config.resource_id);
                if versions.is_empty() {
                    let mut reasons = MissingInputReasons::new();
                    reasons.register_no_versions(&config.name);
                    return Resolution::Missing(reasons);
                }
                versions
            } else {
                jobs = jobs.union(&config.passed);

                let versions =
                    store.versions_of_resource_passed_jobs(config.resource_id, &config.passed);
                if versions.is_empty() {
                    let mut reasons = MissingInputReasons::new();
                    reasons.register_passed_constraint(&config.name);
                    return Resolution::Missing(reasons);
                }
                versions
            };

            let existing_builds = ExistingBuildResolver::new(store, config.job_id, config.resource_id);
            candidates.push(InputVersionCandidates::new(config, versions, existing_builds));
        }

        // widest pools first; stable, so ties keep declaration order
        candidates.sort_by_key(|c| Reverse(c.versions().len()));

        let candidates = InputCandidates::from(candidates);
        debug!(%candidates, "reducing input candidates");

        candidates.reduce(&jobs)
    }
}
