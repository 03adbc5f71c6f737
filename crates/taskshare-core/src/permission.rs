//! Permission values.
//!
//! [`Permission`] is what a grant or request carries; [`PermissionLevel`] is
//! what resolution produces. Only the latter has a `None` value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ValidationError};

/// Access conferred by a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
}

impl Permission {
    /// Stable string form used in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Edit => "edit",
        }
    }

    /// Parse user input, case-insensitively.
    pub fn parse_input(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Permission::View),
            "edit" => Ok(Permission::Edit),
            _ => Err(ValidationError::InvalidPermission(input.to_string())),
        }
    }

    /// The resolved level this permission confers.
    pub const fn level(self) -> PermissionLevel {
        match self {
            Permission::View => PermissionLevel::View,
            Permission::Edit => PermissionLevel::Edit,
        }
    }
}

impl FromStr for Permission {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Permission::View),
            "edit" => Ok(Permission::Edit),
            other => Err(CoreError::UnknownPermission(other.to_string())),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective access of an actor on a resource.
///
/// Ordered: `None < View < Edit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    None,
    View,
    Edit,
}

impl PermissionLevel {
    /// Whether this level allows reading the resource.
    pub fn can_view(self) -> bool {
        self >= PermissionLevel::View
    }

    /// Whether this level allows modifying the resource.
    pub fn can_edit(self) -> bool {
        self == PermissionLevel::Edit
    }

    /// Whether this level satisfies `required`.
    pub fn allows(self, required: Permission) -> bool {
        self >= required.level()
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionLevel::None => "none",
            PermissionLevel::View => "view",
            PermissionLevel::Edit => "edit",
        })
    }
}

impl From<Permission> for PermissionLevel {
    fn from(p: Permission) -> Self {
        p.level()
    }
}
