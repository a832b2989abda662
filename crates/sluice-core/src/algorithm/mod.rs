//! Input-version resolution.
//!
//! Given the inputs a job declares and a point-in-time [`VersionStore`]
//! snapshot, [`InputConfigs::resolve`] picks exactly one version per input so
//! that every `passed` constraint, pin and every-version policy holds at once,
//! or reports per input why no such assignment exists.

mod candidates;
mod existing_build;
mod input_candidates;
mod input_configs;
mod resolution;
mod sets;
mod versions_db;

pub use candidates::{VersionCandidate, VersionCandidates};
pub use existing_build::ExistingBuildResolver;
pub use input_candidates::{InputCandidates, InputVersionCandidates};
pub use input_configs::{InputConfig, InputConfigs};
pub use resolution::{InputMapping, MissingInputReason, MissingInputReasons, Resolution};
pub use sets::{BuildSet, IdSet, JobSet};
pub use versions_db::{BuildInput, BuildOutput, ResourceVersion, VersionStore, VersionsDb};
