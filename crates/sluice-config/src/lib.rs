//! KDL configuration parsing for Sluice.
//!
//! This crate handles parsing of:
//! - Pipeline definitions (resources, jobs and their inputs)
//! - Scheduler system configuration

mod kdl_util;
pub mod error;
pub mod pipeline;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{load_pipeline, parse_pipeline};
pub use system::{
    DatabaseConfig, SchedulerConfig, SystemConfig, load_system_config, parse_duration,
    parse_system_config,
};
