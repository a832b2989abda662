//! Ordered id sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{BuildId, JobId};

/// A set of ids with deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSet<T: Ord>(BTreeSet<T>);

pub type JobSet = IdSet<JobId>;
pub type BuildSet = IdSet<BuildId>;

impl<T: Ord> Default for IdSet<T> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

impl<T: Ord + Copy> IdSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: T) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: &T) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }
}

impl<T: Ord> FromIterator<T> for IdSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Ord> Extend<T> for IdSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jobs(ids: &[i64]) -> JobSet {
        ids.iter().copied().map(JobId::new).collect()
    }

    #[test]
    fn test_union_and_intersect() {
        let a = jobs(&[1, 2, 3]);
        let b = jobs(&[2, 3, 4]);

        assert_eq!(a.union(&b), jobs(&[1, 2, 3, 4]));
        assert_eq!(a.intersect(&b), jobs(&[2, 3]));
        assert!(a.intersect(&jobs(&[])).is_empty());
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let mut a = JobSet::new();
        a.insert(JobId::new(3));
        a.insert(JobId::new(1));
        assert_eq!(a, jobs(&[1, 3]));
        assert_ne!(a, jobs(&[1]));
    }
}
