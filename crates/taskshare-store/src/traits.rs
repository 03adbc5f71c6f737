//! Store trait: the abstract interface for sharing persistence.
//!
//! This trait keeps the sharing core storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use taskshare_core::{
    Category, CategoryId, GlobalGrant, Grant, GrantTarget, NewShareRequest, Permission,
    RequestId, RequestStatus, ResourceRef, ShareRequest, ShareToken, Task, TaskId, Timestamp,
    User, UserId,
};

use crate::error::Result;

/// Result of inserting a share request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestInsert {
    /// The request was stored.
    Inserted(ShareRequest),
    /// A valid pending request already exists for the same
    /// `(requester, scope, recipient)` tuple. Nothing was written.
    Duplicate {
        /// The existing request.
        existing: RequestId,
    },
    /// The generated token is already taken. Nothing was written; the
    /// caller should retry with a fresh token.
    TokenCollision,
}

/// Result of a compare-and-set status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The request moved out of `pending`.
    Applied(ShareRequest),
    /// The request was no longer `pending`; nothing changed.
    Stale {
        /// The status found instead.
        current: RequestStatus,
    },
    /// No request with that id.
    NotFound,
}

/// Result of inserting a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantInsert {
    /// The grant was stored.
    Inserted,
    /// A grant for the same resource and grantee exists (idempotent - not
    /// an error). The stored permission is left untouched.
    AlreadyExists {
        /// The permission already on record.
        existing: Permission,
    },
    /// The resource already has `limit` grantees. Nothing was written.
    CapExceeded {
        /// The cap that was hit.
        limit: usize,
    },
}

/// The Store trait: async interface for sharing persistence.
///
/// # Design Notes
///
/// - **Atomic check-then-insert**: `insert_request` and the grant inserts
///   perform their existence checks and the write as one atomic unit, backed
///   by uniqueness constraints, so concurrent callers cannot both pass the
///   check.
/// - **Compare-and-set transitions**: `transition_request` only moves a
///   request out of `pending`; a second responder observes `Stale`.
/// - **No deletes on requests**: request rows are retained forever.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Directory
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a user. Fails with `AlreadyExists` on a duplicate id or email.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Get a user by id.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Find a user by email. The lookup normalizes `email` first.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert or replace a category.
    async fn upsert_category(&self, category: &Category) -> Result<()>;

    /// Get a category by id.
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    /// Insert or replace a task.
    async fn upsert_task(&self, task: &Task) -> Result<()>;

    /// Get a task by id.
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Share Request Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a pending share request.
    ///
    /// Atomically:
    /// 1. If a pending request for the same `(requester, scope, recipient)`
    ///    exists and `now < expires_at`, returns `Duplicate`.
    /// 2. If the token is taken, returns `TokenCollision`.
    /// 3. Pending requests for the tuple that are past expiry are retired to
    ///    `expired` so they stop occupying the pending slot.
    /// 4. Otherwise inserts and returns the stored row.
    async fn insert_request(&self, request: &NewShareRequest, now: Timestamp)
        -> Result<RequestInsert>;

    /// Get a request by id, regardless of status or expiry.
    async fn get_request(&self, id: RequestId) -> Result<Option<ShareRequest>>;

    /// Get a request by token, regardless of status or expiry.
    async fn find_request_by_token(&self, token: &ShareToken) -> Result<Option<ShareRequest>>;

    /// Move a `pending` request to `to`, stamping `responded_at`.
    async fn transition_request(
        &self,
        id: RequestId,
        to: RequestStatus,
        responded_at: Option<Timestamp>,
    ) -> Result<Transition>;

    /// Stamp `granted_at` on an `approved` request that has none yet.
    ///
    /// Returns whether the row changed.
    async fn mark_request_granted(&self, id: RequestId, at: Timestamp) -> Result<bool>;

    /// Requests created by `requester`, newest first.
    async fn list_requests_by_requester(&self, requester: UserId) -> Result<Vec<ShareRequest>>;

    /// Requests addressed to `email`, newest first.
    async fn list_requests_for_recipient(&self, email: &str) -> Result<Vec<ShareRequest>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Store
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a grant unless one exists for `(target, grantee)` or the target
    /// already has `max_grantees` grantees.
    async fn insert_grant(&self, grant: &Grant, max_grantees: usize) -> Result<GrantInsert>;

    /// Get the grant for `(target, grantee)`.
    async fn get_grant(&self, target: &GrantTarget, grantee: UserId) -> Result<Option<Grant>>;

    /// All grants on `target`, oldest first.
    async fn list_grants(&self, target: &GrantTarget) -> Result<Vec<Grant>>;

    /// Delete the grant for `(target, grantee)`. Returns whether a row was removed.
    async fn delete_grant(&self, target: &GrantTarget, grantee: UserId) -> Result<bool>;

    /// Insert a global grant unless one exists for `(owner, grantee)` or the
    /// owner already has `max_grantees` global grantees.
    async fn insert_global_grant(
        &self,
        grant: &GlobalGrant,
        max_grantees: usize,
    ) -> Result<GrantInsert>;

    /// Get the global grant for `(owner, grantee)`.
    async fn get_global_grant(&self, owner: UserId, grantee: UserId)
        -> Result<Option<GlobalGrant>>;

    /// All global grants issued by `owner`, oldest first.
    async fn list_global_grants(&self, owner: UserId) -> Result<Vec<GlobalGrant>>;

    /// Delete the global grant for `(owner, grantee)`.
    async fn delete_global_grant(&self, owner: UserId, grantee: UserId) -> Result<bool>;
}

/// Ownership facts about a resource, as the resolver needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceFacts {
    pub owner_id: UserId,
    /// The category whose grants apply: the category itself, or the task's
    /// category.
    pub category_id: Option<CategoryId>,
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Look up the owner and governing category of a resource.
    fn resource_facts(
        &self,
        resource: ResourceRef,
    ) -> impl std::future::Future<Output = Result<Option<ResourceFacts>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn resource_facts(&self, resource: ResourceRef) -> Result<Option<ResourceFacts>> {
        let facts = match resource {
            ResourceRef::Category(id) => self.get_category(id).await?.map(|c| ResourceFacts {
                owner_id: c.owner_id,
                category_id: Some(c.id),
            }),
            ResourceRef::Task(id) => self.get_task(id).await?.map(|t| ResourceFacts {
                owner_id: t.owner_id,
                category_id: t.category_id,
            }),
        };
        Ok(facts)
    }
}
