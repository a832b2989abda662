//! Pipeline configuration: resources, jobs and the inputs jobs declare.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A version payload, e.g. `{"ref": "abc123"}`.
pub type Version = BTreeMap<String, String>;

/// A pipeline definition as stored and scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name (e.g., "main").
    pub name: String,
    /// Versioned resources jobs can take as inputs.
    pub resources: Vec<ResourceConfig>,
    /// Jobs, in declaration order.
    pub jobs: Vec<JobConfig>,
}

impl PipelineConfig {
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// A versioned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    /// Resource type (e.g., "git"). Opaque to the scheduler.
    #[serde(rename = "type")]
    pub resource_type: String,
}

/// A job and the inputs it consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub inputs: Vec<JobInput>,
}

/// One `get` of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    /// Input name, unique within the job.
    pub name: String,
    /// Resource the input fetches. Defaults to the input name.
    pub resource: String,
    /// Upstream jobs the chosen version must have passed through.
    #[serde(default)]
    pub passed: Vec<String>,
    /// Which version to pick.
    #[serde(default)]
    pub version: VersionPolicy,
}

/// How an input picks among the available versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Always the newest satisfying version.
    #[default]
    Latest,
    /// Every version, oldest not-yet-built first.
    Every,
    /// A single version whose payload contains these fields.
    Pinned(Version),
}

impl VersionPolicy {
    pub fn is_every(&self) -> bool {
        matches!(self, VersionPolicy::Every)
    }

    pub fn pinned(&self) -> Option<&Version> {
        match self {
            VersionPolicy::Pinned(version) => Some(version),
            _ => None,
        }
    }
}
