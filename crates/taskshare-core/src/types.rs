//! Strong identifier types.
//!
//! All identifiers are newtypes over the store's integer keys so a task id
//! can never be passed where a category id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in milliseconds.
pub type Timestamp = i64;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Create an identifier from a raw store key.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw store key.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(
    /// Identifier of a user.
    UserId,
    "UserId"
);
id_type!(
    /// Identifier of a category.
    CategoryId,
    "CategoryId"
);
id_type!(
    /// Identifier of a task.
    TaskId,
    "TaskId"
);
id_type!(
    /// Identifier of a share request row.
    RequestId,
    "RequestId"
);
