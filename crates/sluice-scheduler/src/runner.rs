//! The per-pipeline scheduling loop.

use futures::future::join_all;
use sluice_config::SchedulerConfig;
use sluice_core::algorithm::{Resolution, VersionsDb};
use sluice_core::pipeline::{JobConfig, PipelineConfig};
use sluice_db::{Lease, PipelineDb};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::inputs::input_configs;
use crate::{BuildTrigger, SchedulerError, SchedulerResult};

/// Why a runner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped,
    PipelineRemoved,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Scheduled,
    Skipped,
    PipelineRemoved,
}

/// Resolves every job of one pipeline on a fixed interval.
pub struct Runner {
    db: Arc<dyn PipelineDb>,
    trigger: Arc<dyn BuildTrigger>,
    interval: Duration,
    noop: bool,
}

impl Runner {
    pub fn new(
        db: Arc<dyn PipelineDb>,
        trigger: Arc<dyn BuildTrigger>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            db,
            trigger,
            interval: config.interval,
            noop: config.noop,
        }
    }

    /// Tick until `shutdown` flips or the pipeline disappears.
    ///
    /// Each tick is followed by a full interval of waiting, so the lease
    /// this replica signed during the tick has expired by the next one.
    /// Shutdown is only observed between ticks; a tick in progress always
    /// finishes and releases its lease first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<RunOutcome> {
        if self.interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "scheduler interval must be greater than zero".into(),
            ));
        }

        let pipeline = self.db.pipeline_name();
        info!(pipeline = %pipeline, interval_ms = self.interval.as_millis() as u64, "Starting scheduler");

        while !*shutdown.borrow() {
            match self.tick().await {
                Ok(TickOutcome::PipelineRemoved) => {
                    info!(pipeline = %pipeline, "Pipeline removed, stopping scheduler");
                    return Ok(RunOutcome::PipelineRemoved);
                }
                Ok(_) => {}
                Err(e) => error!(pipeline = %pipeline, error = %e, "Failed to schedule pipeline"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                // a dropped sender counts as shutdown too
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        info!(pipeline = %pipeline, "Scheduler stopped");
        Ok(RunOutcome::Stopped)
    }

    /// Run one scheduling pass.
    pub async fn tick(&self) -> SchedulerResult<TickOutcome> {
        let pipeline = self.db.pipeline_name();

        let Some(config) = self.db.get_config().await? else {
            return Ok(TickOutcome::PipelineRemoved);
        };

        if self.noop {
            debug!(pipeline = %pipeline, "Noop mode, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        let Some(mut lease) = self.db.lease_scheduling(self.interval).await? else {
            debug!(pipeline = %pipeline, "Scheduling lease held elsewhere, skipping tick");
            return Ok(TickOutcome::Skipped);
        };

        let result = self.schedule(&config, &lease).await;
        lease.release().await;

        result.map(|()| TickOutcome::Scheduled)
    }

    async fn schedule(&self, config: &PipelineConfig, lease: &Lease) -> SchedulerResult<()> {
        let pipeline = self.db.pipeline_name();
        let start = Instant::now();

        let versions = self.db.load_versions_db().await?;
        let load_ms = start.elapsed().as_millis() as u64;

        let jobs = join_all(
            config
                .jobs
                .iter()
                .map(|job| self.schedule_job(job, &versions, lease)),
        );

        let results = tokio::select! {
            biased;
            _ = lease.lost() => {
                return Err(SchedulerError::LeaseLost(lease.key().to_string()));
            }
            results = jobs => results,
        };

        for (job, result) in config.jobs.iter().zip(results) {
            if let Err(e) = result {
                error!(pipeline = %pipeline, job = %job.name, error = %e, "Failed to schedule job");
            }
        }

        info!(
            pipeline = %pipeline,
            jobs = config.jobs.len(),
            load_versions_ms = load_ms,
            duration_ms = start.elapsed().as_millis() as u64,
            "Scheduled pipeline"
        );
        Ok(())
    }

    async fn schedule_job(
        &self,
        job: &JobConfig,
        versions: &VersionsDb,
        lease: &Lease,
    ) -> SchedulerResult<()> {
        let start = Instant::now();

        let job_id = versions.job_id(&job.name).ok_or_else(|| {
            SchedulerError::InvalidConfig(format!("job {} has not been saved", job.name))
        })?;

        let resolution = match input_configs(job, job_id, versions) {
            Ok(configs) => configs.resolve(versions),
            Err(missing) => Resolution::from(missing),
        };

        if !lease.is_held() {
            return Err(SchedulerError::LeaseLost(lease.key().to_string()));
        }

        self.trigger.deliver(job, &resolution).await?;

        debug!(
            pipeline = %self.db.pipeline_name(),
            job = %job.name,
            resolved = resolution.is_resolved(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Scheduled job"
        );
        Ok(())
    }
}
