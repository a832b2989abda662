//! Subcommand implementations.

use anyhow::{Context, Result};
use sluice_config::{SystemConfig, load_pipeline, load_system_config};
use sluice_db::{PgPipelineDbFactory, PgPipelinesRepo, create_pool, run_migrations};
use sluice_scheduler::Syncer;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Run the scheduler until interrupted.
pub async fn run(config: Option<&Path>, database_url: Option<String>, noop: bool) -> Result<()> {
    let mut system = match config {
        Some(path) => load_system_config(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SystemConfig::default(),
    };
    if noop {
        system.scheduler.noop = true;
    }

    let database_url = database_url
        .or(system.database.url.clone())
        .context("no database URL: pass --database-url or set database.url")?;

    let replica = Uuid::now_v7();
    info!(
        %replica,
        interval_ms = system.scheduler.interval.as_millis() as u64,
        noop = system.scheduler.noop,
        "Starting sluiced"
    );

    info!("Connecting to database...");
    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;
    info!("Database ready");

    let syncer = Syncer::new(
        Arc::new(PgPipelinesRepo::new(pool.clone())),
        Arc::new(PgPipelineDbFactory::new(pool)),
        system.scheduler,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let syncer = tokio::spawn(syncer.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!(%replica, "Shutting down");
    let _ = shutdown_tx.send(true);

    syncer.await??;
    info!(%replica, "Stopped");
    Ok(())
}

/// Check a pipeline file and report the first problem found.
pub fn validate(path: &Path) -> Result<()> {
    match load_pipeline(path) {
        Ok(pipeline) => {
            println!(
                "Pipeline {} is valid: {} resources, {} jobs",
                pipeline.name,
                pipeline.resources.len(),
                pipeline.jobs.len()
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
