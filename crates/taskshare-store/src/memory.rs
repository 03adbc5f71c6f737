//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! (including the uniqueness rules and the grantee cap) but keeps everything
//! in memory with no persistence. Every write runs under one `RwLock` write
//! guard, which is what makes its check-then-insert sequences atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use taskshare_core::{
    normalize_email, Category, CategoryId, GlobalGrant, Grant, GrantTarget, NewShareRequest,
    RequestId, RequestStatus, ShareRequest, ShareToken, Task, TaskId, Timestamp, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::traits::{GrantInsert, RequestInsert, Store, Transition};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    users: HashMap<UserId, User>,
    /// Email index: normalized email -> user id.
    emails: HashMap<String, UserId>,
    categories: HashMap<CategoryId, Category>,
    tasks: HashMap<TaskId, Task>,

    /// Requests by id. BTreeMap keeps insertion order for listing.
    requests: BTreeMap<RequestId, ShareRequest>,
    /// Token index: token -> request id.
    tokens: HashMap<ShareToken, RequestId>,
    next_request_id: i64,

    /// Grants indexed by (target, grantee).
    grants: BTreeMap<(GrantTarget, UserId), Grant>,
    /// Global grants indexed by (owner, grantee).
    global_grants: BTreeMap<(UserId, UserId), GlobalGrant>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                next_request_id: 1,
                ..Default::default()
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(mut requests: Vec<ShareRequest>) -> Vec<ShareRequest> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    requests
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut inner = self.write()?;
        let email = normalize_email(&user.email);

        if inner.users.contains_key(&user.id) {
            return Err(StoreError::AlreadyExists(format!("user {}", user.id)));
        }
        if inner.emails.contains_key(&email) {
            return Err(StoreError::AlreadyExists(format!("user with email {}", email)));
        }

        inner.emails.insert(email.clone(), user.id);
        inner.users.insert(user.id, User { id: user.id, email });
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.read()?;
        Ok(inner
            .emails
            .get(&normalize_email(email))
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn upsert_category(&self, category: &Category) -> Result<()> {
        self.write()?.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn upsert_task(&self, task: &Task) -> Result<()> {
        self.write()?.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.read()?.tasks.get(&id).cloned())
    }

    async fn insert_request(
        &self,
        request: &NewShareRequest,
        now: Timestamp,
    ) -> Result<RequestInsert> {
        let mut inner = self.write()?;

        let same_tuple: Vec<RequestId> = inner
            .requests
            .values()
            .filter(|r| {
                r.status == RequestStatus::Pending
                    && r.requester_id == request.requester_id
                    && r.scope == request.scope
                    && r.recipient_email == request.recipient_email
            })
            .map(|r| r.id)
            .collect();

        for id in &same_tuple {
            if let Some(existing) = inner.requests.get(id) {
                if existing.is_valid(now) {
                    return Ok(RequestInsert::Duplicate { existing: existing.id });
                }
            }
        }

        if inner.tokens.contains_key(&request.token) {
            return Ok(RequestInsert::TokenCollision);
        }

        // Whatever is still pending for this tuple is past expiry.
        for id in same_tuple {
            if let Some(stale) = inner.requests.get_mut(&id) {
                stale.status = RequestStatus::Expired;
                debug!(request_id = %id, "retired expired pending request");
            }
        }

        let id = RequestId(inner.next_request_id);
        inner.next_request_id += 1;

        let stored = request.clone().into_request(id);
        inner.tokens.insert(stored.token.clone(), id);
        inner.requests.insert(id, stored.clone());

        Ok(RequestInsert::Inserted(stored))
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<ShareRequest>> {
        Ok(self.read()?.requests.get(&id).cloned())
    }

    async fn find_request_by_token(&self, token: &ShareToken) -> Result<Option<ShareRequest>> {
        let inner = self.read()?;
        Ok(inner
            .tokens
            .get(token)
            .and_then(|id| inner.requests.get(id))
            .cloned())
    }

    async fn transition_request(
        &self,
        id: RequestId,
        to: RequestStatus,
        responded_at: Option<Timestamp>,
    ) -> Result<Transition> {
        let mut inner = self.write()?;

        let Some(request) = inner.requests.get_mut(&id) else {
            return Ok(Transition::NotFound);
        };

        if !request.status.can_transition_to(to) {
            return Ok(Transition::Stale {
                current: request.status,
            });
        }

        request.status = to;
        request.responded_at = responded_at;
        Ok(Transition::Applied(request.clone()))
    }

    async fn mark_request_granted(&self, id: RequestId, at: Timestamp) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.requests.get_mut(&id) {
            Some(request)
                if request.status == RequestStatus::Approved && request.granted_at.is_none() =>
            {
                request.granted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_requests_by_requester(&self, requester: UserId) -> Result<Vec<ShareRequest>> {
        let inner = self.read()?;
        Ok(newest_first(
            inner
                .requests
                .values()
                .filter(|r| r.requester_id == requester)
                .cloned()
                .collect(),
        ))
    }

    async fn list_requests_for_recipient(&self, email: &str) -> Result<Vec<ShareRequest>> {
        let email = normalize_email(email);
        let inner = self.read()?;
        Ok(newest_first(
            inner
                .requests
                .values()
                .filter(|r| r.recipient_email == email)
                .cloned()
                .collect(),
        ))
    }

    async fn insert_grant(&self, grant: &Grant, max_grantees: usize) -> Result<GrantInsert> {
        let mut inner = self.write()?;
        let key = (grant.target, grant.grantee_id);

        if let Some(existing) = inner.grants.get(&key) {
            return Ok(GrantInsert::AlreadyExists {
                existing: existing.permission,
            });
        }

        let count = inner
            .grants
            .keys()
            .filter(|(target, _)| *target == grant.target)
            .count();
        if count >= max_grantees {
            return Ok(GrantInsert::CapExceeded {
                limit: max_grantees,
            });
        }

        inner.grants.insert(key, grant.clone());
        Ok(GrantInsert::Inserted)
    }

    async fn get_grant(&self, target: &GrantTarget, grantee: UserId) -> Result<Option<Grant>> {
        Ok(self.read()?.grants.get(&(*target, grantee)).cloned())
    }

    async fn list_grants(&self, target: &GrantTarget) -> Result<Vec<Grant>> {
        let inner = self.read()?;
        let mut grants: Vec<Grant> = inner
            .grants
            .values()
            .filter(|g| g.target == *target)
            .cloned()
            .collect();
        grants.sort_by_key(|g| (g.created_at, g.grantee_id));
        Ok(grants)
    }

    async fn delete_grant(&self, target: &GrantTarget, grantee: UserId) -> Result<bool> {
        Ok(self.write()?.grants.remove(&(*target, grantee)).is_some())
    }

    async fn insert_global_grant(
        &self,
        grant: &GlobalGrant,
        max_grantees: usize,
    ) -> Result<GrantInsert> {
        let mut inner = self.write()?;
        let key = (grant.owner_id, grant.grantee_id);

        if let Some(existing) = inner.global_grants.get(&key) {
            return Ok(GrantInsert::AlreadyExists {
                existing: existing.permission,
            });
        }

        let count = inner
            .global_grants
            .keys()
            .filter(|(owner, _)| *owner == grant.owner_id)
            .count();
        if count >= max_grantees {
            return Ok(GrantInsert::CapExceeded {
                limit: max_grantees,
            });
        }

        inner.global_grants.insert(key, grant.clone());
        Ok(GrantInsert::Inserted)
    }

    async fn get_global_grant(
        &self,
        owner: UserId,
        grantee: UserId,
    ) -> Result<Option<GlobalGrant>> {
        Ok(self.read()?.global_grants.get(&(owner, grantee)).cloned())
    }

    async fn list_global_grants(&self, owner: UserId) -> Result<Vec<GlobalGrant>> {
        let inner = self.read()?;
        let mut grants: Vec<GlobalGrant> = inner
            .global_grants
            .values()
            .filter(|g| g.owner_id == owner)
            .cloned()
            .collect();
        grants.sort_by_key(|g| (g.created_at, g.grantee_id));
        Ok(grants)
    }

    async fn delete_global_grant(&self, owner: UserId, grantee: UserId) -> Result<bool> {
        Ok(self.write()?.global_grants.remove(&(owner, grantee)).is_some())
    }
}
