//! Users and shareable resources.
//!
//! Only the fields the sharing subsystem reads are modeled here; profile,
//! password, due dates and the rest live with the task manager itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{CategoryId, TaskId, UserId};

/// A user identity. Email is unique and stored normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: crate::validation::normalize_email(&email.into()),
        }
    }
}

/// A named grouping of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub owner_id: UserId,
    pub name: String,
}

/// A task, optionally filed under a category whose sharing it inherits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: UserId,
    pub category_id: Option<CategoryId>,
    pub title: String,
}

/// Reference to a resource whose access is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ResourceRef {
    Category(CategoryId),
    Task(TaskId),
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Category(id) => write!(f, "category:{}", id),
            ResourceRef::Task(id) => write!(f, "task:{}", id),
        }
    }
}

/// What a share request proposes to share.
///
/// Only [`ShareScope::Category`] is produced today. `Task` and `Global`
/// describe rows written before category sharing existed; they are read
/// back for history but never materialized into new grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ShareScope {
    Category(CategoryId),
    Task(TaskId),
    /// Every task the requester owns.
    Global,
}

impl ShareScope {
    /// Stable discriminator used in storage.
    pub const fn kind(&self) -> &'static str {
        match self {
            ShareScope::Category(_) => "category",
            ShareScope::Task(_) => "task",
            ShareScope::Global => "global",
        }
    }

    /// Raw resource id, if the scope targets a single resource.
    pub fn resource_id(&self) -> Option<i64> {
        match self {
            ShareScope::Category(id) => Some(id.get()),
            ShareScope::Task(id) => Some(id.get()),
            ShareScope::Global => None,
        }
    }

    /// Whether requests with this scope may still be created.
    pub fn is_legacy(&self) -> bool {
        !matches!(self, ShareScope::Category(_))
    }

    /// Rebuild a scope from its stored discriminator and resource id.
    pub fn from_parts(kind: &str, resource_id: Option<i64>) -> Result<Self, CoreError> {
        match (kind, resource_id) {
            ("category", Some(id)) => Ok(ShareScope::Category(CategoryId(id))),
            ("task", Some(id)) => Ok(ShareScope::Task(TaskId(id))),
            ("global", _) => Ok(ShareScope::Global),
            ("category", None) => Err(CoreError::MissingResourceId { scope: "category" }),
            ("task", None) => Err(CoreError::MissingResourceId { scope: "task" }),
            (other, _) => Err(CoreError::UnknownScope(other.to_string())),
        }
    }
}

impl fmt::Display for ShareScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareScope::Category(id) => write!(f, "category:{}", id),
            ShareScope::Task(id) => write!(f, "task:{}", id),
            ShareScope::Global => f.write_str("global"),
        }
    }
}

impl From<ResourceRef> for ShareScope {
    fn from(r: ResourceRef) -> Self {
        match r {
            ResourceRef::Category(id) => ShareScope::Category(id),
            ResourceRef::Task(id) => ShareScope::Task(id),
        }
    }
}
