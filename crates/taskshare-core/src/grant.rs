//! Grant records.
//!
//! A grant is an active sharing relationship. Category grants are the
//! current mechanism; per-task grants and "share with everyone" global
//! grants predate them and are kept queryable for old data.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::permission::Permission;
use crate::resource::ResourceRef;
use crate::types::{CategoryId, TaskId, Timestamp, UserId};

/// The single resource a [`Grant`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum GrantTarget {
    Category(CategoryId),
    /// Legacy direct task share.
    Task(TaskId),
}

impl GrantTarget {
    /// Stable discriminator used in storage.
    pub const fn kind(&self) -> &'static str {
        match self {
            GrantTarget::Category(_) => "category",
            GrantTarget::Task(_) => "task",
        }
    }

    pub const fn resource_id(&self) -> i64 {
        match self {
            GrantTarget::Category(id) => id.0,
            GrantTarget::Task(id) => id.0,
        }
    }

    pub fn from_parts(kind: &str, resource_id: i64) -> Result<Self, CoreError> {
        match kind {
            "category" => Ok(GrantTarget::Category(CategoryId(resource_id))),
            "task" => Ok(GrantTarget::Task(TaskId(resource_id))),
            other => Err(CoreError::UnknownScope(other.to_string())),
        }
    }
}

impl From<GrantTarget> for ResourceRef {
    fn from(target: GrantTarget) -> Self {
        match target {
            GrantTarget::Category(id) => ResourceRef::Category(id),
            GrantTarget::Task(id) => ResourceRef::Task(id),
        }
    }
}

impl From<ResourceRef> for GrantTarget {
    fn from(r: ResourceRef) -> Self {
        match r {
            ResourceRef::Category(id) => GrantTarget::Category(id),
            ResourceRef::Task(id) => GrantTarget::Task(id),
        }
    }
}

impl fmt::Display for GrantTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.resource_id())
    }
}

/// Access to one resource for one grantee.
///
/// Unique per `(target, grantee_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub target: GrantTarget,
    pub grantee_id: UserId,
    pub permission: Permission,
    pub created_at: Timestamp,
}

impl Grant {
    pub fn new(
        target: GrantTarget,
        grantee_id: UserId,
        permission: Permission,
        created_at: Timestamp,
    ) -> Self {
        Self {
            target,
            grantee_id,
            permission,
            created_at,
        }
    }
}

/// Deprecated: access to every task an owner has.
///
/// Unique per `(owner_id, grantee_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalGrant {
    pub owner_id: UserId,
    pub grantee_id: UserId,
    pub permission: Permission,
    pub created_at: Timestamp,
}
