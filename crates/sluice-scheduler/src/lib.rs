//! Pipeline scheduling for Sluice.
//!
//! One [`Runner`] per pipeline resolves every job's inputs on a fixed
//! interval while holding the pipeline's scheduling lease. The [`Syncer`]
//! keeps a runner alive for each active pipeline.

pub mod error;
pub mod inputs;
pub mod runner;
pub mod syncer;
pub mod trigger;

#[cfg(test)]
mod testing;

pub use error::{SchedulerError, SchedulerResult};
pub use runner::{RunOutcome, Runner};
pub use syncer::Syncer;
pub use trigger::{BuildTrigger, DbBuildTrigger};
