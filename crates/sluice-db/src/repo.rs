//! Repository traits and PostgreSQL implementations.

pub mod lease;
pub mod pipeline;
pub mod pipelines;

pub use lease::PgLeaseStore;
pub use pipeline::{PgPipelineDb, PipelineDb};
pub use pipelines::{
    PgPipelineDbFactory, PgPipelinesRepo, PipelineDbFactory, PipelinesRepo, SavedPipeline,
};
