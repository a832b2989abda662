//! System configuration parsing.

use crate::kdl_util::{bool_arg, first_string_arg};
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*(ms|s|m|h)\s*$").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
}

/// Scheduling cadence, owned by each scheduler loop for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Time between ticks; also the scheduling lease interval.
    pub interval: Duration,
    /// Time between pipeline list refreshes.
    pub sync_interval: Duration,
    /// Run the loop without scheduling anything.
    pub noop: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            sync_interval: Duration::from_secs(10),
            noop: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

/// Read and parse a system configuration file.
pub fn load_system_config(path: &Path) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

/// Parse system configuration from KDL text.
///
/// ```kdl
/// scheduler {
///     interval "10s"
///     sync-interval "30s"
///     noop #false
/// }
///
/// database {
///     url "postgres://sluice@localhost/sluice"
/// }
/// ```
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "scheduler" => config.scheduler = parse_scheduler(node)?,
            "database" => {
                for child in children(node) {
                    if child.name().value() == "url" {
                        config.database.url = first_string_arg(child);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(config)
}

fn parse_scheduler(node: &KdlNode) -> ConfigResult<SchedulerConfig> {
    let mut scheduler = SchedulerConfig::default();

    for child in children(node) {
        let key = child.name().value();
        match key {
            "interval" | "sync-interval" => {
                let text = first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField(format!("scheduler {}", key)))?;
                let duration = parse_duration(&text)?;
                if duration.is_zero() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("scheduler {}", key),
                        message: "must be greater than zero".to_string(),
                    });
                }
                if key == "interval" {
                    scheduler.interval = duration;
                } else {
                    scheduler.sync_interval = duration;
                }
            }
            "noop" => {
                scheduler.noop = bool_arg(child).ok_or_else(|| ConfigError::InvalidValue {
                    field: "scheduler noop".to_string(),
                    message: "expected a boolean".to_string(),
                })?;
            }
            _ => {}
        }
    }

    Ok(scheduler)
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|c| c.nodes())
}

/// Parse a duration such as `500ms`, `10s`, `5m` or `1h`.
pub fn parse_duration(text: &str) -> ConfigResult<Duration> {
    let invalid = || ConfigError::InvalidValue {
        field: "duration".to_string(),
        message: format!("cannot parse '{}'", text),
    };

    let captures = DURATION.captures(text).ok_or_else(invalid)?;
    let amount: u64 = captures[1].parse().map_err(|_| invalid())?;

    let duration = match &captures[2] {
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        _ => amount.checked_mul(60 * 60).map(Duration::from_secs),
    };

    duration.ok_or_else(|| ConfigError::InvalidValue {
        field: "duration".to_string(),
        message: format!("'{}' is out of range", text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("ten seconds").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        let err = parse_duration("9999999999999999h").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(parse_duration("9999999999999999999m").is_err());
        assert_eq!(
            parse_duration("9999999999999999s").unwrap(),
            Duration::from_secs(9_999_999_999_999_999)
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_system_config(Path::new("/nonexistent/sluice.kdl")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_parse_system_config() {
        let kdl = r#"
            scheduler {
                interval "30s"
                sync-interval "1m"
                noop "true"
            }

            database {
                url "postgres://localhost/sluice"
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.scheduler.interval, Duration::from_secs(30));
        assert_eq!(config.scheduler.sync_interval, Duration::from_secs(60));
        assert!(config.scheduler.noop);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/sluice")
        );
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = parse_system_config("").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let kdl = r#"
            scheduler {
                interval "0s"
            }
        "#;

        assert!(matches!(
            parse_system_config(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }
}
