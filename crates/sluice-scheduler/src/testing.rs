//! Storage and trigger fakes shared by the scheduler tests.

use async_trait::async_trait;
use chrono::Utc;
use sluice_core::algorithm::{BuildOutput, Resolution, ResourceVersion, VersionsDb};
use sluice_core::pipeline::{JobConfig, JobInput, PipelineConfig, ResourceConfig, VersionPolicy};
use sluice_core::{BuildId, JobId, PipelineId, ResourceId, VersionId};
use sluice_db::{
    DbError, DbResult, Lease, LeaseKey, MemoryLeaseStore, PipelineDb, PipelineDbFactory,
    PipelinesRepo, SavedPipeline,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::{BuildTrigger, SchedulerError, SchedulerResult};

pub fn saved(id: i64, name: &str) -> SavedPipeline {
    SavedPipeline {
        id,
        name: name.into(),
        created_at: Utc::now(),
    }
}

/// `repo` has versions 1..=3; `build` consumes it freely and has a
/// successful build of version 2; `deploy` only takes what passed `build`.
pub fn two_job_pipeline() -> (PipelineConfig, VersionsDb) {
    let config = PipelineConfig {
        name: "main".into(),
        resources: vec![ResourceConfig {
            name: "repo".into(),
            resource_type: "git".into(),
        }],
        jobs: vec![
            JobConfig {
                name: "build".into(),
                inputs: vec![JobInput {
                    name: "repo".into(),
                    resource: "repo".into(),
                    passed: vec![],
                    version: VersionPolicy::Latest,
                }],
            },
            JobConfig {
                name: "deploy".into(),
                inputs: vec![JobInput {
                    name: "repo".into(),
                    resource: "repo".into(),
                    passed: vec!["build".into()],
                    version: VersionPolicy::Latest,
                }],
            },
        ],
    };

    let mut versions = VersionsDb::default();
    versions.resource_ids.insert("repo".into(), ResourceId::new(1));
    versions.job_ids.insert("build".into(), JobId::new(1));
    versions.job_ids.insert("deploy".into(), JobId::new(2));
    for order in 1..=3 {
        versions.resource_versions.push(ResourceVersion {
            version_id: VersionId::new(order),
            resource_id: ResourceId::new(1),
            check_order: order,
            version: [("ref".to_string(), format!("v{order}"))].into(),
        });
    }
    versions.build_outputs.push(BuildOutput {
        version_id: VersionId::new(2),
        resource_id: ResourceId::new(1),
        check_order: 2,
        build_id: BuildId::new(10),
        job_id: JobId::new(1),
    });

    (config, versions)
}

pub struct FakePipelineDb {
    pub pipeline: SavedPipeline,
    pub leases: Arc<MemoryLeaseStore>,
    pub config: Mutex<Option<PipelineConfig>>,
    pub versions: Mutex<VersionsDb>,
    pub fail_load: AtomicBool,
    pub saved: Mutex<Vec<(String, Resolution)>>,
}

impl FakePipelineDb {
    pub fn new(pipeline: SavedPipeline, config: PipelineConfig, versions: VersionsDb) -> Self {
        Self {
            pipeline,
            leases: Arc::new(MemoryLeaseStore::new()),
            config: Mutex::new(Some(config)),
            versions: Mutex::new(versions),
            fail_load: AtomicBool::new(false),
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn lease_key(&self) -> LeaseKey {
        LeaseKey::PipelineScheduling(self.pipeline_id())
    }

    pub fn saved_jobs(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(job, _)| job.clone())
            .collect()
    }
}

#[async_trait]
impl PipelineDb for FakePipelineDb {
    fn pipeline_id(&self) -> PipelineId {
        PipelineId::new(self.pipeline.id)
    }

    fn pipeline_name(&self) -> &str {
        &self.pipeline.name
    }

    async fn get_config(&self) -> DbResult<Option<PipelineConfig>> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn lease_scheduling(&self, interval: Duration) -> DbResult<Option<Lease>> {
        Lease::acquire(self.leases.clone(), self.lease_key(), interval).await
    }

    async fn load_versions_db(&self) -> DbResult<VersionsDb> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(DbError::NotFound("versions".into()));
        }
        Ok(self.versions.lock().unwrap().clone())
    }

    async fn save_job_resolution(&self, job: &str, resolution: &Resolution) -> DbResult<()> {
        self.saved
            .lock()
            .unwrap()
            .push((job.to_string(), resolution.clone()));
        Ok(())
    }
}

/// Records deliveries. Jobs in `failing` error out; jobs in `blocking`
/// never finish delivering. Every delivery takes `delay`.
#[derive(Default)]
pub struct RecordingTrigger {
    pub delivered: Mutex<Vec<(String, Resolution)>>,
    pub failing: HashSet<String>,
    pub blocking: HashSet<String>,
    pub delay: Option<Duration>,
    pub entered: Notify,
}

impl RecordingTrigger {
    pub fn delivered(&self, job: &str) -> Option<Resolution> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == job)
            .map(|(_, resolution)| resolution.clone())
    }

    pub fn deliveries(&self, job: &str) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == job)
            .count()
    }
}

#[async_trait]
impl BuildTrigger for RecordingTrigger {
    async fn deliver(&self, job: &JobConfig, resolution: &Resolution) -> SchedulerResult<()> {
        if self.blocking.contains(&job.name) {
            self.entered.notify_one();
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&job.name) {
            return Err(SchedulerError::Trigger(format!("{} refused", job.name)));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((job.name.clone(), resolution.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePipelinesRepo {
    pub pipelines: Mutex<Vec<SavedPipeline>>,
}

#[async_trait]
impl PipelinesRepo for FakePipelinesRepo {
    async fn list_pipelines(&self) -> DbResult<Vec<SavedPipeline>> {
        Ok(self.pipelines.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub dbs: HashMap<i64, Arc<FakePipelineDb>>,
}

impl PipelineDbFactory for FakeFactory {
    fn build(&self, pipeline: &SavedPipeline) -> Arc<dyn PipelineDb> {
        match self.dbs.get(&pipeline.id) {
            Some(db) => db.clone(),
            None => {
                let (config, versions) = two_job_pipeline();
                Arc::new(FakePipelineDb::new(pipeline.clone(), config, versions))
            }
        }
    }
}
