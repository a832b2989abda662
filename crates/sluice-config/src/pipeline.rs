//! Pipeline definition parsing.

use crate::kdl_util::{first_string_arg, string_list, string_prop, string_props};
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use sluice_core::pipeline::{JobConfig, JobInput, PipelineConfig, ResourceConfig, Version, VersionPolicy};
use std::collections::HashSet;
use std::path::Path;

/// Read and parse a pipeline definition file.
pub fn load_pipeline(path: &Path) -> ConfigResult<PipelineConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_pipeline(&content)
}

/// Parse a pipeline definition from KDL text.
///
/// ```kdl
/// pipeline "main"
///
/// resource "repo" type="git"
///
/// job "unit" {
///     get "repo" version="every"
/// }
///
/// job "ship" {
///     get "repo" {
///         passed "unit"
///     }
/// }
/// ```
pub fn parse_pipeline(kdl: &str) -> ConfigResult<PipelineConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut resources = Vec::new();
    let mut jobs = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "pipeline" => {
                name = first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?;
            }
            "resource" => {
                resources.push(parse_resource(node)?);
            }
            "job" => {
                jobs.push(parse_job(node)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("pipeline name".to_string()));
    }

    let config = PipelineConfig {
        name,
        resources,
        jobs,
    };
    validate(&config)?;

    Ok(config)
}

fn parse_resource(node: &KdlNode) -> ConfigResult<ResourceConfig> {
    let name = first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("resource name".to_string()))?;
    let resource_type = string_prop(node, "type")
        .ok_or_else(|| ConfigError::MissingField(format!("type for resource '{}'", name)))?;

    Ok(ResourceConfig {
        name,
        resource_type,
    })
}

fn parse_job(node: &KdlNode) -> ConfigResult<JobConfig> {
    let name =
        first_string_arg(node).ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;

    let mut inputs = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "get" {
                inputs.push(parse_input(&name, child)?);
            }
        }
    }

    Ok(JobConfig { name, inputs })
}

fn parse_input(job: &str, node: &KdlNode) -> ConfigResult<JobInput> {
    let name = first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField(format!("input name in job '{}'", job)))?;
    let resource = string_prop(node, "resource").unwrap_or_else(|| name.clone());
    let passed = string_list(node, "passed");

    let mut version = match string_prop(node, "version") {
        Some(policy) => parse_policy(&name, &policy)?,
        None => VersionPolicy::Latest,
    };

    let version_node = node
        .children()
        .and_then(|children| children.nodes().iter().find(|c| c.name().value() == "version"));
    if let Some(version_node) = version_node {
        let pinned: Version = string_props(version_node).into_iter().collect();
        version = match first_string_arg(version_node) {
            Some(policy) if pinned.is_empty() => parse_policy(&name, &policy)?,
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    field: format!("version of input '{}'", name),
                    message: "a pinned version cannot also name a policy".to_string(),
                });
            }
            None if pinned.is_empty() => {
                return Err(ConfigError::MissingField(format!(
                    "pinned version fields for input '{}'",
                    name
                )));
            }
            None => VersionPolicy::Pinned(pinned),
        };
    }

    Ok(JobInput {
        name,
        resource,
        passed,
        version,
    })
}

fn parse_policy(input: &str, policy: &str) -> ConfigResult<VersionPolicy> {
    match policy {
        "latest" => Ok(VersionPolicy::Latest),
        "every" => Ok(VersionPolicy::Every),
        other => Err(ConfigError::InvalidValue {
            field: format!("version of input '{}'", input),
            message: format!("unknown version policy: {}", other),
        }),
    }
}

/// Check names are unique and every reference points at something declared.
fn validate(config: &PipelineConfig) -> ConfigResult<()> {
    let mut resource_names = HashSet::new();
    for resource in &config.resources {
        if !resource_names.insert(resource.name.as_str()) {
            return Err(ConfigError::Duplicate(format!("resource '{}'", resource.name)));
        }
    }

    let mut job_names = HashSet::new();
    for job in &config.jobs {
        if !job_names.insert(job.name.as_str()) {
            return Err(ConfigError::Duplicate(format!("job '{}'", job.name)));
        }
    }

    for job in &config.jobs {
        let mut input_names = HashSet::new();
        for input in &job.inputs {
            if !input_names.insert(input.name.as_str()) {
                return Err(ConfigError::Duplicate(format!(
                    "input '{}' in job '{}'",
                    input.name, job.name
                )));
            }

            if !resource_names.contains(input.resource.as_str()) {
                return Err(ConfigError::InvalidReference(format!(
                    "input '{}' of job '{}' uses unknown resource '{}'",
                    input.name, job.name, input.resource
                )));
            }

            for upstream in &input.passed {
                if upstream == &job.name {
                    return Err(ConfigError::InvalidReference(format!(
                        "input '{}' of job '{}' cannot pass through its own job",
                        input.name, job.name
                    )));
                }

                let upstream_job = config.job(upstream).ok_or_else(|| {
                    ConfigError::InvalidReference(format!(
                        "input '{}' of job '{}' passes unknown job '{}'",
                        input.name, job.name, upstream
                    ))
                })?;

                if !upstream_job.inputs.iter().any(|i| i.resource == input.resource) {
                    return Err(ConfigError::InvalidReference(format!(
                        "job '{}' does not use resource '{}' required by input '{}' of job '{}'",
                        upstream, input.resource, input.name, job.name
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pipeline() {
        let kdl = r#"
            pipeline "main"

            resource "repo" type="git"

            job "unit" {
                get "repo"
            }
        "#;

        let pipeline = parse_pipeline(kdl).unwrap();
        assert_eq!(pipeline.name, "main");
        assert_eq!(pipeline.resources.len(), 1);
        assert_eq!(pipeline.resources[0].resource_type, "git");
        assert_eq!(pipeline.jobs[0].inputs[0].resource, "repo");
        assert_eq!(pipeline.jobs[0].inputs[0].version, VersionPolicy::Latest);
    }

    #[test]
    fn test_parse_passed_and_policies() {
        let kdl = r#"
            pipeline "main"

            resource "repo" type="git"
            resource "library" type="git"

            job "unit" {
                get "repo" version="every"
                get "library"
            }

            job "ship" {
                get "source" resource="repo" {
                    passed "unit"
                }
                get "lib" resource="library" passed="unit"
                get "pinned" resource="repo" {
                    version ref="abc123"
                }
            }
        "#;

        let pipeline = parse_pipeline(kdl).unwrap();
        assert_eq!(pipeline.jobs[0].inputs[0].version, VersionPolicy::Every);

        let ship = pipeline.job("ship").unwrap();
        assert_eq!(ship.inputs[0].resource, "repo");
        assert_eq!(ship.inputs[0].passed, vec!["unit"]);
        assert_eq!(ship.inputs[1].passed, vec!["unit"]);
        assert_eq!(
            ship.inputs[2].version.pinned().and_then(|v| v.get("ref")),
            Some(&"abc123".to_string())
        );
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let kdl = r#"
            pipeline "main"
            resource "repo" type="git"
            job "unit" {
                get "repo" version="sometimes"
            }
        "#;

        assert!(matches!(
            parse_pipeline(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_unknown_resource_rejected() {
        let kdl = r#"
            pipeline "main"
            job "unit" {
                get "repo"
            }
        "#;

        assert!(matches!(
            parse_pipeline(kdl).unwrap_err(),
            ConfigError::InvalidReference(_)
        ));
    }

    #[test]
    fn test_passed_job_must_use_resource() {
        let kdl = r#"
            pipeline "main"
            resource "repo" type="git"
            resource "other" type="git"
            job "unit" {
                get "other"
            }
            job "ship" {
                get "repo" passed="unit"
            }
        "#;

        assert!(matches!(
            parse_pipeline(kdl).unwrap_err(),
            ConfigError::InvalidReference(_)
        ));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let kdl = r#"
            pipeline "main"
            resource "repo" type="git"
            job "unit" {
                get "repo"
                get "repo"
            }
        "#;

        assert!(matches!(
            parse_pipeline(kdl).unwrap_err(),
            ConfigError::Duplicate(_)
        ));
    }

    #[test]
    fn test_missing_pipeline_name() {
        let kdl = r#"
            resource "repo" type="git"
        "#;

        assert!(matches!(
            parse_pipeline(kdl).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_load_pipeline_file() {
        let path =
            std::env::temp_dir().join(format!("sluice-pipeline-{}.kdl", std::process::id()));
        std::fs::write(&path, "pipeline \"main\"\nresource \"repo\" type=\"git\"\n").unwrap();

        let pipeline = load_pipeline(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(pipeline.name, "main");

        let err = load_pipeline(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
