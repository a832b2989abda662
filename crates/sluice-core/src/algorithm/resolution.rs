//! Resolver outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::VersionId;

/// Input name to the single version chosen for it.
pub type InputMapping = BTreeMap<String, VersionId>;

/// Why an input could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingInputReason {
    /// The resource has no recorded versions.
    NoVersions,
    /// No version satisfies the input's passed constraints jointly with the
    /// other inputs.
    PassedConstraintUnsatisfied,
    /// The pinned version is not among the recorded versions.
    PinnedVersionUnavailable,
}

impl MissingInputReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingInputReason::NoVersions => "no-versions",
            MissingInputReason::PassedConstraintUnsatisfied => "passed-constraint-unsatisfied",
            MissingInputReason::PinnedVersionUnavailable => "pinned-version-unavailable",
        }
    }
}

impl fmt::Display for MissingInputReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input name to the reason it is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissingInputReasons(BTreeMap<String, MissingInputReason>);

impl MissingInputReasons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, input: &str, reason: MissingInputReason) {
        self.0.insert(input.to_string(), reason);
    }

    pub fn register_no_versions(&mut self, input: &str) {
        self.register(input, MissingInputReason::NoVersions);
    }

    pub fn register_passed_constraint(&mut self, input: &str) {
        self.register(input, MissingInputReason::PassedConstraintUnsatisfied);
    }

    pub fn get(&self, input: &str) -> Option<MissingInputReason> {
        self.0.get(input).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, MissingInputReason)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// The outcome of resolving one job's inputs: a total mapping or the
/// reasons it could not be built. Never partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "inputs", rename_all = "snake_case")]
pub enum Resolution {
    Resolved(InputMapping),
    Missing(MissingInputReasons),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn mapping(&self) -> Option<&InputMapping> {
        match self {
            Resolution::Resolved(mapping) => Some(mapping),
            Resolution::Missing(_) => None,
        }
    }

    pub fn missing(&self) -> Option<&MissingInputReasons> {
        match self {
            Resolution::Resolved(_) => None,
            Resolution::Missing(reasons) => Some(reasons),
        }
    }
}

impl From<MissingInputReasons> for Resolution {
    fn from(reasons: MissingInputReasons) -> Self {
        Resolution::Missing(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        let mut reasons = MissingInputReasons::new();
        reasons.register_no_versions("repo");
        reasons.register_passed_constraint("lib");

        let json = serde_json::to_value(Resolution::Missing(reasons)).unwrap();
        assert_eq!(json["status"], "missing");
        assert_eq!(json["inputs"]["repo"], "no-versions");
        assert_eq!(json["inputs"]["lib"], "passed-constraint-unsatisfied");
        assert_eq!(
            MissingInputReason::PinnedVersionUnavailable.to_string(),
            "pinned-version-unavailable"
        );
    }
}
