//! Version candidate pools.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::sets::{BuildSet, JobSet};
use crate::{BuildId, JobId, VersionId};

/// One candidate version and the builds that tie it to upstream jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCandidate {
    /// Store ordering; higher is newer.
    pub check_order: i64,
    /// Builds per job that consumed or produced this version.
    pub builds: BTreeMap<JobId, BuildSet>,
}

/// The pool of versions an input may still choose from.
///
/// A version with no build references is a raw existing-version record. A
/// version that had build references and lost all of them through pruning is
/// removed from the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionCandidates {
    versions: BTreeMap<VersionId, VersionCandidate>,
}

impl VersionCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a version with no build association.
    pub fn add_version(&mut self, version_id: VersionId, check_order: i64) {
        self.versions
            .entry(version_id)
            .or_insert_with(|| VersionCandidate {
                check_order,
                builds: BTreeMap::new(),
            });
    }

    /// Record that `build_id` of `job_id` consumed or produced the version.
    pub fn add_build(
        &mut self,
        version_id: VersionId,
        check_order: i64,
        job_id: JobId,
        build_id: BuildId,
    ) {
        self.add_version(version_id, check_order);
        if let Some(candidate) = self.versions.get_mut(&version_id) {
            candidate.builds.entry(job_id).or_default().insert(build_id);
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn get(&self, version_id: VersionId) -> Option<&VersionCandidate> {
        self.versions.get(&version_id)
    }

    /// Version ids in store order, newest first.
    pub fn version_ids(&self) -> Vec<VersionId> {
        let mut ordered: Vec<_> = self
            .versions
            .iter()
            .map(|(id, c)| (c.check_order, *id))
            .collect();
        ordered.sort_by_key(|&(order, id)| Reverse((order, id)));
        ordered.into_iter().map(|(_, id)| id).collect()
    }

    /// Keep only the versions present in both pools, merging their builds.
    pub fn intersect_by_version(&self, other: &Self) -> Self {
        let versions = self
            .versions
            .iter()
            .filter_map(|(id, mine)| {
                let theirs = other.versions.get(id)?;
                let mut merged = mine.clone();
                for (job_id, builds) in &theirs.builds {
                    let entry = merged.builds.entry(*job_id).or_default();
                    *entry = entry.union(builds);
                }
                Some((*id, merged))
            })
            .collect();
        Self { versions }
    }

    /// The pool restricted to a single version (empty if it is absent).
    pub fn for_version(&self, version_id: VersionId) -> Self {
        let versions = self
            .versions
            .get(&version_id)
            .map(|c| (version_id, c.clone()))
            .into_iter()
            .collect();
        Self { versions }
    }

    /// All builds of `job_id` referenced by any version in the pool.
    pub fn build_ids(&self, job_id: JobId) -> BuildSet {
        self.versions
            .values()
            .filter_map(|c| c.builds.get(&job_id))
            .flat_map(|builds| builds.iter())
            .collect()
    }

    /// Jobs with at least one build referencing a version in the pool.
    pub fn job_ids(&self) -> JobSet {
        self.versions
            .values()
            .flat_map(|c| c.builds.keys().copied())
            .collect()
    }

    /// Drop references to builds of `job_id` outside `keep`.
    ///
    /// Returns `None` when nothing would change, so callers can keep sharing
    /// the existing pool.
    pub fn prune_versions_of_other_build_ids(&self, job_id: JobId, keep: &BuildSet) -> Option<Self> {
        let touched = self.versions.values().any(|c| {
            c.builds
                .get(&job_id)
                .is_some_and(|builds| builds.iter().any(|b| !keep.contains(&b)))
        });
        if !touched {
            return None;
        }

        let versions = self
            .versions
            .iter()
            .filter_map(|(id, candidate)| {
                let Some(builds) = candidate.builds.get(&job_id) else {
                    return Some((*id, candidate.clone()));
                };

                let mut pruned = candidate.clone();
                let remaining = builds.intersect(keep);
                if remaining.is_empty() {
                    pruned.builds.remove(&job_id);
                } else {
                    pruned.builds.insert(job_id, remaining);
                }

                if pruned.builds.is_empty() {
                    None
                } else {
                    Some((*id, pruned))
                }
            })
            .collect();
        Some(Self { versions })
    }
}
