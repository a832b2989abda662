//! PostgreSQL lease store.
//!
//! Each lease kind lives on the row it protects: builds carry
//! `last_tracked`/`last_scheduled`, pipelines carry `last_scheduled`, and
//! named tasks get a row in `leases`.

use async_trait::async_trait;
use sluice_core::{BuildId, PipelineId};
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::Postgres;
use std::sync::Arc;
use std::time::Duration;

use crate::lease::{Lease, LeaseKey, LeaseStore};
use crate::{DbError, DbResult};

/// PostgreSQL implementation of LeaseStore.
pub struct PgLeaseStore {
    pool: PgPool,
}

impl PgLeaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lease the right to track a running build.
    pub async fn lease_build_tracking(
        self: &Arc<Self>,
        build_id: BuildId,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Lease::build_tracking(self.clone(), build_id, interval).await
    }

    /// Lease the right to schedule a pending build.
    pub async fn lease_build_scheduling(
        self: &Arc<Self>,
        build_id: BuildId,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Lease::build_scheduling(self.clone(), build_id, interval).await
    }

    /// Lease one scheduling pass over a pipeline.
    pub async fn lease_pipeline_scheduling(
        self: &Arc<Self>,
        pipeline_id: PipelineId,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Lease::pipeline_scheduling(self.clone(), pipeline_id, interval).await
    }

    /// Lease a named periodic task, creating its row on first use.
    pub async fn get_lease(
        self: &Arc<Self>,
        task_name: &str,
        interval: Duration,
    ) -> DbResult<Option<Lease>> {
        Lease::task(self.clone(), task_name, interval).await
    }
}

fn sign_statement(key: &LeaseKey) -> &'static str {
    match key {
        LeaseKey::BuildTracking(_) => {
            r#"
            UPDATE builds SET last_tracked = NOW()
            WHERE id = $1 AND NOW() - last_tracked >= make_interval(secs => $2)
            "#
        }
        LeaseKey::BuildScheduling(_) => {
            r#"
            UPDATE builds SET last_scheduled = NOW()
            WHERE id = $1 AND NOW() - last_scheduled >= make_interval(secs => $2)
            "#
        }
        LeaseKey::PipelineScheduling(_) => {
            r#"
            UPDATE pipelines SET last_scheduled = NOW()
            WHERE id = $1 AND NOW() - last_scheduled >= make_interval(secs => $2)
            "#
        }
        LeaseKey::Task(_) => {
            r#"
            UPDATE leases SET last_invalidated = NOW()
            WHERE name = $1 AND NOW() - last_invalidated >= make_interval(secs => $2)
            "#
        }
    }
}

fn renew_statement(key: &LeaseKey) -> &'static str {
    match key {
        LeaseKey::BuildTracking(_) => "UPDATE builds SET last_tracked = NOW() WHERE id = $1",
        LeaseKey::BuildScheduling(_) => "UPDATE builds SET last_scheduled = NOW() WHERE id = $1",
        LeaseKey::PipelineScheduling(_) => {
            "UPDATE pipelines SET last_scheduled = NOW() WHERE id = $1"
        }
        LeaseKey::Task(_) => "UPDATE leases SET last_invalidated = NOW() WHERE name = $1",
    }
}

fn bind_key<'q>(
    query: Query<'q, Postgres, PgArguments>,
    key: &'q LeaseKey,
) -> Query<'q, Postgres, PgArguments> {
    match key {
        LeaseKey::BuildTracking(id) | LeaseKey::BuildScheduling(id) => query.bind(id.get()),
        LeaseKey::PipelineScheduling(id) => query.bind(id.get()),
        LeaseKey::Task(name) => query.bind(name.as_str()),
    }
}

#[async_trait]
impl LeaseStore for PgLeaseStore {
    async fn attempt_sign(&self, key: &LeaseKey, interval: Duration) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        if let LeaseKey::Task(name) = key {
            sqlx::query(
                r#"
                INSERT INTO leases (name, last_invalidated)
                SELECT $1, 'epoch'
                WHERE NOT EXISTS (SELECT 1 FROM leases WHERE name = $1)
                "#,
            )
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        let result = bind_key(sqlx::query(sign_statement(key)), key)
            .bind(interval.as_secs_f64())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn renew(&self, key: &LeaseKey) -> DbResult<()> {
        let result = bind_key(sqlx::query(renew_statement(key)), key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::LeaseNotFound(key.to_string()));
        }

        Ok(())
    }
}
