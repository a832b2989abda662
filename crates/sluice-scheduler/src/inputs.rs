//! Translation of a job's declared inputs into resolver input configs.

use sluice_core::JobId;
use sluice_core::algorithm::{
    InputConfig, InputConfigs, JobSet, MissingInputReason, MissingInputReasons, VersionsDb,
};
use sluice_core::pipeline::JobConfig;

/// Look up every name a job's inputs refer to in the snapshot.
///
/// Inputs that cannot be translated are reported with the reason the
/// resolver would have given had it seen them: an unknown resource has no
/// versions, an unknown upstream job can never be passed, and a pinned
/// payload that matches nothing is unavailable.
pub fn input_configs(
    job: &JobConfig,
    job_id: JobId,
    versions: &VersionsDb,
) -> Result<InputConfigs, MissingInputReasons> {
    let mut configs = Vec::with_capacity(job.inputs.len());
    let mut missing = MissingInputReasons::new();

    for input in &job.inputs {
        let Some(resource_id) = versions.resource_id(&input.resource) else {
            missing.register_no_versions(&input.name);
            continue;
        };

        let passed: Option<JobSet> = input
            .passed
            .iter()
            .map(|name| versions.job_id(name))
            .collect();
        let Some(passed) = passed else {
            missing.register_passed_constraint(&input.name);
            continue;
        };

        let pinned_version_id = match input.version.pinned() {
            Some(pinned) => match versions.find_version(resource_id, pinned) {
                Some(version_id) => Some(version_id),
                None => {
                    missing.register(&input.name, MissingInputReason::PinnedVersionUnavailable);
                    continue;
                }
            },
            None => None,
        };

        configs.push(InputConfig {
            name: input.name.clone(),
            job_id,
            resource_id,
            passed,
            use_every_version: input.version.is_every(),
            pinned_version_id,
        });
    }

    if missing.is_empty() {
        Ok(configs.into())
    } else {
        Err(missing)
    }
}
