//! Grant sources consulted by the resolver.
//!
//! Sharing accreted three mechanisms over time. Each is a [`GrantSource`]
//! variant with its own lookup; the resolver walks them in
//! [`GrantSource::PRIORITY`] order and stops at the first hit.

use std::fmt;

use taskshare_core::{GrantTarget, Permission, ResourceRef, UserId};
use taskshare_store::{ResourceFacts, Store};

use crate::error::Result;

/// One historical way of granting access to another user's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantSource {
    /// A grant on the category itself, or on the task's category.
    Category,
    /// A deprecated "all my tasks" grant from the resource owner.
    Global,
    /// A deprecated grant on a single task.
    LegacyTask,
}

impl GrantSource {
    /// Lookup order after ownership.
    pub const PRIORITY: [GrantSource; 3] =
        [GrantSource::Category, GrantSource::Global, GrantSource::LegacyTask];

    /// Stable name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            GrantSource::Category => "category",
            GrantSource::Global => "global",
            GrantSource::LegacyTask => "legacy_task",
        }
    }

    /// Look up the permission this source grants `actor` on `resource`.
    ///
    /// Returns `None` when the source does not apply to the resource or holds
    /// no grant for the actor.
    pub async fn lookup<S: Store + ?Sized>(
        self,
        store: &S,
        actor: UserId,
        resource: ResourceRef,
        facts: &ResourceFacts,
    ) -> Result<Option<Permission>> {
        let permission = match self {
            GrantSource::Category => match facts.category_id {
                Some(category) => store
                    .get_grant(&GrantTarget::Category(category), actor)
                    .await?
                    .map(|g| g.permission),
                None => None,
            },
            GrantSource::Global => store
                .get_global_grant(facts.owner_id, actor)
                .await?
                .map(|g| g.permission),
            GrantSource::LegacyTask => match resource {
                ResourceRef::Task(task) => store
                    .get_grant(&GrantTarget::Task(task), actor)
                    .await?
                    .map(|g| g.permission),
                ResourceRef::Category(_) => None,
            },
        };
        Ok(permission)
    }
}

impl fmt::Display for GrantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
