//! Integer identifiers.
//!
//! Every identifier is a distinct newtype over the database's `BIGINT` so a
//! job id can never be passed where a build id is expected.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            Display, From,
        )]
        #[serde(transparent)]
        #[display("{_0}")]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying integer.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

int_id!(
    /// A job within a pipeline.
    JobId
);

int_id!(
    /// A resource (an external versioned artifact source) within a pipeline.
    ResourceId
);

int_id!(
    /// One observed version of a resource. Immutable once recorded.
    VersionId
);

int_id!(
    /// A build of a job.
    BuildId
);

int_id!(
    /// A pipeline.
    PipelineId
);
