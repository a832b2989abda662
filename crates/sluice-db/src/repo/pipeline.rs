//! Per-pipeline repository: configuration, scheduling lease, version
//! snapshot and per-job resolution results.

use async_trait::async_trait;
use sluice_core::algorithm::{BuildInput, BuildOutput, Resolution, ResourceVersion, VersionsDb};
use sluice_core::pipeline::{PipelineConfig, Version};
use sluice_core::{BuildId, JobId, PipelineId, ResourceId, VersionId};
use sqlx::PgPool;
use sqlx::types::Json;
use std::sync::Arc;
use std::time::Duration;

use super::lease::PgLeaseStore;
use super::pipelines::SavedPipeline;
use crate::lease::Lease;
use crate::{DbError, DbResult};

/// Everything a scheduler loop needs from storage for one pipeline.
#[async_trait]
pub trait PipelineDb: Send + Sync {
    fn pipeline_id(&self) -> PipelineId;
    fn pipeline_name(&self) -> &str;

    /// The current configuration, or `None` once the pipeline is deleted.
    async fn get_config(&self) -> DbResult<Option<PipelineConfig>>;

    /// Try to take the pipeline's scheduling lease.
    async fn lease_scheduling(&self, interval: Duration) -> DbResult<Option<Lease>>;

    /// Load a consistent snapshot of versions and build history.
    async fn load_versions_db(&self) -> DbResult<VersionsDb>;

    /// Record the latest resolution of a job's inputs.
    async fn save_job_resolution(&self, job: &str, resolution: &Resolution) -> DbResult<()>;
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    version_id: i64,
    resource_id: i64,
    check_order: i64,
    version: Json<Version>,
}

#[derive(sqlx::FromRow)]
struct BuildInputRow {
    version_id: i64,
    resource_id: i64,
    check_order: i64,
    build_id: i64,
    job_id: i64,
    input_name: String,
}

#[derive(sqlx::FromRow)]
struct BuildOutputRow {
    version_id: i64,
    resource_id: i64,
    check_order: i64,
    build_id: i64,
    job_id: i64,
}

#[derive(sqlx::FromRow)]
struct NamedIdRow {
    id: i64,
    name: String,
}

/// Decode a stored pipeline configuration.
fn decode_config(value: serde_json::Value) -> DbResult<PipelineConfig> {
    Ok(serde_json::from_value(value)?)
}

/// PostgreSQL implementation of PipelineDb.
pub struct PgPipelineDb {
    pool: PgPool,
    leases: Arc<PgLeaseStore>,
    pipeline: SavedPipeline,
}

impl PgPipelineDb {
    pub fn new(pool: PgPool, leases: Arc<PgLeaseStore>, pipeline: SavedPipeline) -> Self {
        Self {
            pool,
            leases,
            pipeline,
        }
    }
}

#[async_trait]
impl PipelineDb for PgPipelineDb {
    fn pipeline_id(&self) -> PipelineId {
        PipelineId::new(self.pipeline.id)
    }

    fn pipeline_name(&self) -> &str {
        &self.pipeline.name
    }

    async fn get_config(&self) -> DbResult<Option<PipelineConfig>> {
        let config: Option<Json<serde_json::Value>> =
            sqlx::query_scalar("SELECT config FROM pipelines WHERE id = $1")
                .bind(self.pipeline.id)
                .fetch_optional(&self.pool)
                .await?;
        config.map(|Json(value)| decode_config(value)).transpose()
    }

    async fn lease_scheduling(&self, interval: Duration) -> DbResult<Option<Lease>> {
        self.leases
            .lease_pipeline_scheduling(self.pipeline_id(), interval)
            .await
    }

    async fn load_versions_db(&self) -> DbResult<VersionsDb> {
        // one repeatable-read transaction so every query sees the same point in time
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let versions = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT v.id AS version_id, v.resource_id, v.check_order, v.version
            FROM versioned_resources v
            JOIN resources r ON r.id = v.resource_id
            WHERE r.pipeline_id = $1 AND v.enabled
            "#,
        )
        .bind(self.pipeline.id)
        .fetch_all(&mut *tx)
        .await?;

        let inputs = sqlx::query_as::<_, BuildInputRow>(
            r#"
            SELECT v.id AS version_id, v.resource_id, v.check_order,
                   b.id AS build_id, b.job_id, i.name AS input_name
            FROM build_inputs i
            JOIN builds b ON b.id = i.build_id
            JOIN jobs j ON j.id = b.job_id
            JOIN versioned_resources v ON v.id = i.versioned_resource_id
            WHERE j.pipeline_id = $1 AND v.enabled
            "#,
        )
        .bind(self.pipeline.id)
        .fetch_all(&mut *tx)
        .await?;

        // inputs of successful builds count as implicit outputs
        let outputs = sqlx::query_as::<_, BuildOutputRow>(
            r#"
            SELECT v.id AS version_id, v.resource_id, v.check_order,
                   b.id AS build_id, b.job_id
            FROM build_outputs o
            JOIN builds b ON b.id = o.build_id
            JOIN jobs j ON j.id = b.job_id
            JOIN versioned_resources v ON v.id = o.versioned_resource_id
            WHERE j.pipeline_id = $1 AND v.enabled AND b.status = 'succeeded'
            UNION
            SELECT v.id, v.resource_id, v.check_order, b.id, b.job_id
            FROM build_inputs i
            JOIN builds b ON b.id = i.build_id
            JOIN jobs j ON j.id = b.job_id
            JOIN versioned_resources v ON v.id = i.versioned_resource_id
            WHERE j.pipeline_id = $1 AND v.enabled AND b.status = 'succeeded'
            "#,
        )
        .bind(self.pipeline.id)
        .fetch_all(&mut *tx)
        .await?;

        let jobs =
            sqlx::query_as::<_, NamedIdRow>("SELECT id, name FROM jobs WHERE pipeline_id = $1")
                .bind(self.pipeline.id)
                .fetch_all(&mut *tx)
                .await?;

        let resources = sqlx::query_as::<_, NamedIdRow>(
            "SELECT id, name FROM resources WHERE pipeline_id = $1",
        )
        .bind(self.pipeline.id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(VersionsDb {
            resource_versions: versions
                .into_iter()
                .map(|row| ResourceVersion {
                    version_id: VersionId::new(row.version_id),
                    resource_id: ResourceId::new(row.resource_id),
                    check_order: row.check_order,
                    version: row.version.0,
                })
                .collect(),
            build_inputs: inputs
                .into_iter()
                .map(|row| BuildInput {
                    version_id: VersionId::new(row.version_id),
                    resource_id: ResourceId::new(row.resource_id),
                    check_order: row.check_order,
                    build_id: BuildId::new(row.build_id),
                    job_id: JobId::new(row.job_id),
                    input_name: row.input_name,
                })
                .collect(),
            build_outputs: outputs
                .into_iter()
                .map(|row| BuildOutput {
                    version_id: VersionId::new(row.version_id),
                    resource_id: ResourceId::new(row.resource_id),
                    check_order: row.check_order,
                    build_id: BuildId::new(row.build_id),
                    job_id: JobId::new(row.job_id),
                })
                .collect(),
            job_ids: jobs
                .into_iter()
                .map(|row| (row.name, JobId::new(row.id)))
                .collect(),
            resource_ids: resources
                .into_iter()
                .map(|row| (row.name, ResourceId::new(row.id)))
                .collect(),
        })
    }

    async fn save_job_resolution(&self, job: &str, resolution: &Resolution) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_input_resolutions (job_id, resolved, resolution, updated_at)
            SELECT id, $3, $4, NOW() FROM jobs WHERE pipeline_id = $1 AND name = $2
            ON CONFLICT (job_id) DO UPDATE
            SET resolved = EXCLUDED.resolved,
                resolution = EXCLUDED.resolution,
                updated_at = NOW()
            "#,
        )
        .bind(self.pipeline.id)
        .bind(job)
        .bind(resolution.is_resolved())
        .bind(Json(resolution))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!(
                "job {} in pipeline {}",
                job, self.pipeline.name
            )));
        }

        Ok(())
    }
}
