//! Keeps one scheduler loop running per active pipeline.

use sluice_config::SchedulerConfig;
use sluice_db::{PipelineDbFactory, PipelinesRepo, SavedPipeline};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{DbBuildTrigger, RunOutcome, Runner, SchedulerError, SchedulerResult};

struct RunningPipeline {
    name: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<SchedulerResult<RunOutcome>>,
}

impl RunningPipeline {
    async fn stop(self) {
        let _ = self.stop.send(true);
        self.join().await;
    }

    async fn join(self) {
        match self.handle.await {
            Ok(Ok(outcome)) => info!(pipeline = %self.name, ?outcome, "Scheduler exited"),
            Ok(Err(e)) => error!(pipeline = %self.name, error = %e, "Scheduler failed"),
            Err(e) => error!(pipeline = %self.name, error = %e, "Scheduler task panicked"),
        }
    }
}

/// Starts and stops [`Runner`]s as pipelines come and go.
pub struct Syncer {
    repo: Arc<dyn PipelinesRepo>,
    factory: Arc<dyn PipelineDbFactory>,
    config: SchedulerConfig,
    runners: HashMap<i64, RunningPipeline>,
}

impl Syncer {
    pub fn new(
        repo: Arc<dyn PipelinesRepo>,
        factory: Arc<dyn PipelineDbFactory>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            factory,
            config,
            runners: HashMap::new(),
        }
    }

    /// Names of the pipelines that currently have a runner, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.runners.values().map(|r| r.name.clone()).collect();
        names.sort();
        names
    }

    /// Sync until `shutdown` flips, then stop every runner and wait for it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        if self.config.sync_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "sync interval must be greater than zero".into(),
            ));
        }

        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => self.sync().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(runners = self.runners.len(), "Stopping schedulers");
        for (_, runner) in self.runners.drain() {
            runner.stop().await;
        }
        Ok(())
    }

    /// Reap finished runners, stop runners of pipelines that are no longer
    /// active and start runners for new ones.
    pub async fn sync(&mut self) {
        self.reap().await;

        let pipelines = match self.repo.list_pipelines().await {
            Ok(pipelines) => pipelines,
            Err(e) => {
                warn!(error = %e, "Failed to list pipelines");
                return;
            }
        };

        let active: HashSet<i64> = pipelines.iter().map(|p| p.id).collect();
        let gone: Vec<i64> = self
            .runners
            .keys()
            .filter(|id| !active.contains(id))
            .copied()
            .collect();
        for id in gone {
            if let Some(runner) = self.runners.remove(&id) {
                info!(pipeline = %runner.name, "Pipeline no longer active");
                runner.stop().await;
            }
        }

        for pipeline in &pipelines {
            if !self.runners.contains_key(&pipeline.id) {
                self.start(pipeline);
            }
        }
    }

    fn start(&mut self, pipeline: &SavedPipeline) {
        let db = self.factory.build(pipeline);
        let trigger = Arc::new(DbBuildTrigger::new(db.clone()));
        let runner = Runner::new(db, trigger, &self.config);
        let (stop, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { runner.run(stop_rx).await });

        self.runners.insert(
            pipeline.id,
            RunningPipeline {
                name: pipeline.name.clone(),
                stop,
                handle,
            },
        );
    }

    async fn reap(&mut self) {
        let finished: Vec<i64> = self
            .runners
            .iter()
            .filter(|(_, runner)| runner.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            if let Some(runner) = self.runners.remove(&id) {
                runner.join().await;
            }
        }
    }
}
