//! Pipeline listing and per-pipeline repository construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use super::lease::PgLeaseStore;
use super::pipeline::{PgPipelineDb, PipelineDb};
use crate::DbResult;

/// A stored pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SavedPipeline {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PipelinesRepo: Send + Sync {
    /// Pipelines that are not paused, by name.
    async fn list_pipelines(&self) -> DbResult<Vec<SavedPipeline>>;
}

/// Builds a per-pipeline repository for a saved pipeline.
pub trait PipelineDbFactory: Send + Sync {
    fn build(&self, pipeline: &SavedPipeline) -> Arc<dyn PipelineDb>;
}

/// PostgreSQL implementation of PipelinesRepo.
pub struct PgPipelinesRepo {
    pool: PgPool,
}

impl PgPipelinesRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelinesRepo for PgPipelinesRepo {
    async fn list_pipelines(&self) -> DbResult<Vec<SavedPipeline>> {
        let pipelines = sqlx::query_as::<_, SavedPipeline>(
            "SELECT id, name, created_at FROM pipelines WHERE NOT paused ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(pipelines)
    }
}

/// Builds [`PgPipelineDb`]s sharing one pool and lease store.
pub struct PgPipelineDbFactory {
    pool: PgPool,
    leases: Arc<PgLeaseStore>,
}

impl PgPipelineDbFactory {
    pub fn new(pool: PgPool) -> Self {
        let leases = Arc::new(PgLeaseStore::new(pool.clone()));
        Self { pool, leases }
    }
}

impl PipelineDbFactory for PgPipelineDbFactory {
    fn build(&self, pipeline: &SavedPipeline) -> Arc<dyn PipelineDb> {
        Arc::new(PgPipelineDb::new(
            self.pool.clone(),
            self.leases.clone(),
            pipeline.clone(),
        ))
    }
}
