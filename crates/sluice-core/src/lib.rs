//! Core domain types for the Sluice pipeline scheduler.
//!
//! This crate contains:
//! - Integer identifiers for jobs, resources, versions, builds and pipelines
//! - Pipeline configuration types (jobs, resources, job inputs)
//! - The input-version resolution algorithm and the version snapshot it reads

pub mod algorithm;
pub mod id;
pub mod pipeline;

pub use id::{BuildId, JobId, PipelineId, ResourceId, VersionId};
