//! Storage layer for Sluice.
//!
//! Provides the storage traits the scheduler consumes, their PostgreSQL
//! implementations, and the renewable leases that keep scheduler replicas
//! from working on the same pipeline at once.

pub mod error;
pub mod lease;
pub mod memory;
pub mod repo;

pub use error::{DbError, DbResult};
pub use lease::{Lease, LeaseKey, LeaseStore};
pub use memory::MemoryLeaseStore;
pub use repo::*;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
