//! Effective permission resolution.
//!
//! Resolution order, first match wins:
//! 1. Ownership - the owner always gets `edit`.
//! 2. Category grant - on the category, or on the task's category.
//! 3. Global grant - from the resource owner to the actor.
//! 4. Legacy task grant - on the task itself.
//! 5. Otherwise `none`.
//!
//! Deletion is a separate rule: only the owner may delete.

use std::sync::Arc;

use tracing::trace;

use taskshare_core::{PermissionLevel, ResourceRef, UserId};
use taskshare_store::{ResourceFacts, Store, StoreExt};

use crate::error::{PermsError, Result};
use crate::source::GrantSource;

/// Where a resolved permission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSource {
    /// The actor owns the resource.
    Owner,
    /// A grant source matched.
    Grant(GrantSource),
    /// Nothing matched.
    Denied,
}

/// A resolved permission together with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub level: PermissionLevel,
    pub source: PermissionSource,
}

impl Resolution {
    fn denied() -> Self {
        Self {
            level: PermissionLevel::None,
            source: PermissionSource::Denied,
        }
    }
}

/// Read-only resolver over a [`Store`].
///
/// Never writes to the grant store or the ledger.
pub struct PermissionResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for PermissionResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store + ?Sized> PermissionResolver<S> {
    /// Create a resolver reading from `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Effective permission of `actor` on `resource`.
    pub async fn resolve(&self, actor: UserId, resource: ResourceRef) -> Result<PermissionLevel> {
        Ok(self.explain(actor, resource).await?.level)
    }

    /// Effective permission of `actor` on `resource`, with the source that
    /// produced it.
    pub async fn explain(&self, actor: UserId, resource: ResourceRef) -> Result<Resolution> {
        let facts = self.facts(resource).await?;

        if facts.owner_id == actor {
            return Ok(Resolution {
                level: PermissionLevel::Edit,
                source: PermissionSource::Owner,
            });
        }

        for source in GrantSource::PRIORITY {
            if let Some(permission) = source
                .lookup(self.store.as_ref(), actor, resource, &facts)
                .await?
            {
                trace!(actor = %actor, resource = %resource, source = %source, "grant matched");
                return Ok(Resolution {
                    level: permission.level(),
                    source: PermissionSource::Grant(source),
                });
            }
        }

        Ok(Resolution::denied())
    }

    /// Whether `actor` may delete `resource`. No grant ever allows this.
    pub async fn can_delete(&self, actor: UserId, resource: ResourceRef) -> Result<bool> {
        Ok(self.facts(resource).await?.owner_id == actor)
    }

    /// The owner of `resource`.
    pub async fn owner_of(&self, resource: ResourceRef) -> Result<UserId> {
        Ok(self.facts(resource).await?.owner_id)
    }

    async fn facts(&self, resource: ResourceRef) -> Result<ResourceFacts> {
        self.store
            .resource_facts(resource)
            .await?
            .ok_or(PermsError::ResourceNotFound(resource))
    }
}
