//! Where resolved inputs go once a job has been scheduled.

use async_trait::async_trait;
use sluice_core::algorithm::Resolution;
use sluice_core::pipeline::JobConfig;
use sluice_db::PipelineDb;
use std::sync::Arc;
use tracing::debug;

use crate::{SchedulerError, SchedulerResult};

/// Receives the outcome of resolving one job's inputs.
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    async fn deliver(&self, job: &JobConfig, resolution: &Resolution) -> SchedulerResult<()>;
}

/// Records each job's latest resolution in the pipeline database.
pub struct DbBuildTrigger {
    db: Arc<dyn PipelineDb>,
}

impl DbBuildTrigger {
    pub fn new(db: Arc<dyn PipelineDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BuildTrigger for DbBuildTrigger {
    async fn deliver(&self, job: &JobConfig, resolution: &Resolution) -> SchedulerResult<()> {
        self.db
            .save_job_resolution(&job.name, resolution)
            .await
            .map_err(|e| SchedulerError::Trigger(format!("saving {}: {}", job.name, e)))?;

        debug!(
            pipeline = %self.db.pipeline_name(),
            job = %job.name,
            resolved = resolution.is_resolved(),
            "Recorded input resolution"
        );
        Ok(())
    }
}
