//! The backtracking reduction over per-input candidate pools.

use std::fmt;
use std::sync::Arc;

use super::candidates::VersionCandidates;
use super::existing_build::ExistingBuildResolver;
use super::input_configs::InputConfig;
use super::resolution::{InputMapping, MissingInputReasons, Resolution};
use super::sets::{BuildSet, JobSet};
use crate::{JobId, VersionId};

/// One input's constraints joined with the versions it may still choose.
///
/// Pools are shared behind `Arc`; restricting or pruning produces a new pool
/// and leaves every other snapshot untouched.
#[derive(Debug, Clone)]
pub struct InputVersionCandidates {
    pub input: String,
    pub passed: JobSet,
    pub use_every_version: bool,
    pub pinned_version_id: Option<VersionId>,
    existing_builds: Arc<ExistingBuildResolver>,
    versions: Arc<VersionCandidates>,
}

impl InputVersionCandidates {
    pub fn new(
        config: &InputConfig,
        versions: VersionCandidates,
        existing_builds: ExistingBuildResolver,
    ) -> Self {
        Self {
            input: config.name.clone(),
            passed: config.passed.clone(),
            use_every_version: config.use_every_version,
            pinned_version_id: config.pinned_version_id,
            existing_builds: Arc::new(existing_builds),
            versions: Arc::new(versions),
        }
    }

    pub fn versions(&self) -> &VersionCandidates {
        &self.versions
    }

    fn restricted_to(&self, version_id: VersionId) -> Self {
        Self {
            versions: Arc::new(self.versions.for_version(version_id)),
            ..self.clone()
        }
    }

    /// Whether a build exists for the candidate at `index` or the next older
    /// one. The oldest candidate always counts as built.
    fn built_at_or_before(&self, version_ids: &[VersionId], index: usize) -> bool {
        self.existing_builds.exists_for_version(version_ids[index])
            || version_ids
                .get(index + 1)
                .is_none_or(|older| self.existing_builds.exists_for_version(*older))
    }
}

/// Candidate pools for every input of one job.
#[derive(Debug, Clone, Default)]
pub struct InputCandidates(Vec<InputVersionCandidates>);

impl From<Vec<InputVersionCandidates>> for InputCandidates {
    fn from(candidates: Vec<InputVersionCandidates>) -> Self {
        Self(candidates)
    }
}

impl fmt::Display for InputCandidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summaries: Vec<String> = self
            .0
            .iter()
            .map(|c| format!("{} ({} versions)", c.input, c.versions.len()))
            .collect();
        write!(f, "[{}]", summaries.join("; "))
    }
}

impl InputCandidates {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reduce every pool to a single jointly consistent version.
    ///
    /// `jobs` is the union of every input's passed set.
    pub fn reduce(&self, jobs: &JobSet) -> Resolution {
        match self.reduce_from(jobs, None) {
            Ok(mapping) => Resolution::Resolved(mapping),
            Err(reasons) => Resolution::Missing(reasons),
        }
    }

    fn reduce_from(
        &self,
        jobs: &JobSet,
        mut last_satisfied: Option<InputMapping>,
    ) -> Result<InputMapping, MissingInputReasons> {
        let mut current = self.prune_to_common_builds(jobs);

        for i in 0..current.0.len() {
            let input = current.0[i].clone();

            if let Some(pinned) = input.pinned_version_id {
                current.0[i] = input.restricted_to(pinned);
                current = current.prune_to_common_builds(jobs);
                continue;
            }

            let version_ids = input.versions.version_ids();
            if version_ids.len() <= 1 {
                continue;
            }

            for (j, &version_id) in version_ids.iter().enumerate() {
                let mut attempt = current.clone();
                attempt.0[i] = input.restricted_to(version_id);

                // only the final reasons matter, so nested ones are dropped
                match attempt.reduce_from(jobs, last_satisfied.clone()) {
                    Ok(mapping) => {
                        if !input.use_every_version || input.built_at_or_before(&version_ids, j) {
                            return Ok(mapping);
                        }
                        last_satisfied = Some(mapping);
                    }
                    Err(_) if input.use_every_version => {
                        if let Some(mapping) = last_satisfied {
                            return Ok(mapping);
                        }
                        if input.built_at_or_before(&version_ids, j) {
                            break;
                        }
                    }
                    Err(_) => {}
                }
            }

            // this input cannot be narrowed to one version in this frame
            break;
        }

        let mut mapping = InputMapping::new();
        let mut reasons = MissingInputReasons::new();

        for candidates in &current.0 {
            let version_ids = candidates.versions.version_ids();
            if version_ids.len() != 1 || candidates.versions.job_ids() != candidates.passed {
                reasons.register_passed_constraint(&candidates.input);
            } else {
                mapping.insert(candidates.input.clone(), version_ids[0]);
            }
        }

        if reasons.is_empty() {
            Ok(mapping)
        } else {
            Err(reasons)
        }
    }

    fn prune_to_common_builds(&self, jobs: &JobSet) -> Self {
        let mut pruned = self.clone();

        for job_id in jobs.iter() {
            let Some(common) = pruned.common_build_ids(job_id) else {
                continue;
            };

            for candidates in &mut pruned.0 {
                if let Some(versions) = candidates
                    .versions
                    .prune_versions_of_other_build_ids(job_id, &common)
                {
                    candidates.versions = Arc::new(versions);
                }
            }
        }

        pruned
    }

    /// Builds of `job_id` shared by every input that references the job.
    fn common_build_ids(&self, job_id: JobId) -> Option<BuildSet> {
        self.0
            .iter()
            .map(|c| c.versions.build_ids(job_id))
            .filter(|builds| !builds.is_empty())
            .reduce(|common, builds| common.intersect(&builds))
    }
}
