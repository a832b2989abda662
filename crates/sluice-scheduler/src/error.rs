//! Error types for scheduling.

use sluice_db::DbError;
use thiserror::Error;

/// Errors that can occur while scheduling a pipeline.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("lease lost: {0}")]
    LeaseLost(String),

    #[error("build trigger failed: {0}")]
    Trigger(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
