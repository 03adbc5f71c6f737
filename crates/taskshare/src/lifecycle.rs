//! The request lifecycle engine.
//!
//! Moves requests out of `pending` and materializes grants on approval.
//!
//! ## State machine
//!
//! ```text
//! pending ──approve──> approved ──(grant write)──> grant row, granted_at set
//!    │
//!    ├──reject──> rejected
//!    └──cancel──> cancelled
//! ```
//!
//! The status change is persisted before the grant is written. If the grant
//! write fails the request stays `approved` without a grant, the caller gets
//! [`ApproveOutcome::ApprovedWithoutGrant`], and [`LifecycleEngine::retry_grant`]
//! can finish the job later.
//!
//! Once the grant is in place the request is stamped `granted_at`. From then
//! on a retry never writes a grant again: if the owner has since unshared,
//! the retry fails with [`ShareError::GrantRevoked`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use taskshare_core::{
    normalize_email, Clock, Grant, GrantTarget, RequestId, RequestStatus, ResourceRef,
    ShareRequest, ShareScope, User, UserId,
};
use taskshare_store::{GrantInsert, Store, Transition};

use crate::config::ShareConfig;
use crate::error::{Result, ShareError};
use crate::ledger::ShareLedger;

/// Who is responding to a request, as established by the caller's own
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingIdentity {
    pub user_id: UserId,
    /// Stored normalized.
    pub email: String,
}

impl ActingIdentity {
    pub fn new(user_id: UserId, email: impl AsRef<str>) -> Self {
        Self {
            user_id,
            email: normalize_email(email.as_ref()),
        }
    }
}

impl From<&User> for ActingIdentity {
    fn from(user: &User) -> Self {
        Self::new(user.id, &user.email)
    }
}

/// Why an approved request has no grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantFailure {
    /// Legacy task/global requests are never materialized.
    UnsupportedShareType { scope: &'static str },
    /// The resource already has the maximum number of grantees.
    CapExceeded { limit: usize },
    /// The shared resource no longer exists.
    ResourceMissing(ResourceRef),
    /// The grant write failed.
    Store(String),
}

impl GrantFailure {
    /// Whether [`LifecycleEngine::retry_grant`] could succeed later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GrantFailure::CapExceeded { .. } | GrantFailure::Store(_))
    }
}

impl fmt::Display for GrantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantFailure::UnsupportedShareType { scope } => {
                write!(f, "{} shares are no longer granted", scope)
            }
            GrantFailure::CapExceeded { limit } => {
                write!(f, "already shared with {} people, the maximum allowed", limit)
            }
            GrantFailure::ResourceMissing(resource) => write!(f, "{} no longer exists", resource),
            GrantFailure::Store(msg) => write!(f, "grant could not be saved: {}", msg),
        }
    }
}

/// Result of approving a request or retrying its grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    /// The grant exists. `created` is false when it was already there.
    Granted {
        request: ShareRequest,
        target: GrantTarget,
        created: bool,
    },
    /// The request is approved but no grant was written.
    ApprovedWithoutGrant {
        request: ShareRequest,
        reason: GrantFailure,
    },
}

impl ApproveOutcome {
    pub fn request(&self) -> &ShareRequest {
        match self {
            ApproveOutcome::Granted { request, .. }
            | ApproveOutcome::ApprovedWithoutGrant { request, .. } => request,
        }
    }

    /// True only when the grant is in place.
    pub fn is_complete(&self) -> bool {
        matches!(self, ApproveOutcome::Granted { .. })
    }
}

/// Drives requests through approve and reject.
pub struct LifecycleEngine<S: ?Sized> {
    ledger: ShareLedger<S>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ShareConfig,
}

impl<S: Store + ?Sized> LifecycleEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: ShareConfig) -> Self {
        Self {
            ledger: ShareLedger::new(store.clone(), clock.clone(), config.clone()),
            store,
            clock,
            config,
        }
    }

    /// The ledger this engine reads requests through.
    pub fn ledger(&self) -> &ShareLedger<S> {
        &self.ledger
    }

    /// Approve the request behind `token` and grant access to `acting`.
    pub async fn approve(&self, token: &str, acting: &ActingIdentity) -> Result<ApproveOutcome> {
        let request = self.authorize(token, acting).await?;
        let now = self.clock.now_millis();

        let approved = match self
            .store
            .transition_request(request.id, RequestStatus::Approved, Some(now))
            .await?
        {
            Transition::Applied(approved) => approved,
            Transition::Stale { current } => return Err(ShareError::AlreadyResponded(current)),
            Transition::NotFound => return Err(ShareError::NotFound),
        };

        info!(
            request_id = %approved.id,
            requester = %approved.requester_id,
            grantee = %acting.user_id,
            scope = %approved.scope,
            "share request approved"
        );

        Ok(self.materialize(approved, acting.user_id).await)
    }

    /// Reject the request behind `token`. No grant is written.
    pub async fn reject(&self, token: &str, acting: &ActingIdentity) -> Result<ShareRequest> {
        let request = self.authorize(token, acting).await?;
        let now = self.clock.now_millis();

        match self
            .store
            .transition_request(request.id, RequestStatus::Rejected, Some(now))
            .await?
        {
            Transition::Applied(rejected) => {
                info!(
                    request_id = %rejected.id,
                    requester = %rejected.requester_id,
                    "share request rejected"
                );
                Ok(rejected)
            }
            Transition::Stale { current } => Err(ShareError::AlreadyResponded(current)),
            Transition::NotFound => Err(ShareError::NotFound),
        }
    }

    /// Re-run grant materialization for an approved request that never got
    /// its grant.
    ///
    /// Either side of the share may retry. When the grant is already in
    /// place this is a no-op reported as `Granted { created: false }`. A
    /// request whose grant existed and was later removed is refused.
    pub async fn retry_grant(
        &self,
        request_id: RequestId,
        acting: &ActingIdentity,
    ) -> Result<ApproveOutcome> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(ShareError::RequestNotFound(request_id))?;

        if request.status != RequestStatus::Approved {
            return Err(ShareError::NotApproved(request.status));
        }

        let recipient = self
            .store
            .find_user_by_email(&request.recipient_email)
            .await?
            .ok_or(ShareError::RecipientUnknown)?;

        let is_requester = acting.user_id == request.requester_id;
        let is_recipient = acting.user_id == recipient.id && request.is_addressed_to(&acting.email);
        if !is_requester && !is_recipient {
            return Err(ShareError::Unauthorized(
                "only the people on a share can retry it".into(),
            ));
        }

        if request.granted_at.is_some() {
            return self.already_granted(request, recipient.id).await;
        }

        debug!(request_id = %request_id, grantee = %recipient.id, "retrying grant");
        Ok(self.materialize(request, recipient.id).await)
    }

    /// Retry of a request that was granted before: report the grant if it is
    /// still there, never recreate it.
    async fn already_granted(
        &self,
        request: ShareRequest,
        grantee: UserId,
    ) -> Result<ApproveOutcome> {
        let target = match request.scope {
            ShareScope::Category(id) => GrantTarget::Category(id),
            _ => return Err(ShareError::GrantRevoked(request.id)),
        };

        if self.store.get_grant(&target, grantee).await?.is_some() {
            return Ok(ApproveOutcome::Granted {
                request,
                target,
                created: false,
            });
        }

        warn!(
            request_id = %request.id,
            grantee = %grantee,
            target = %target,
            "retry refused, grant was removed by the owner"
        );
        Err(ShareError::GrantRevoked(request.id))
    }

    /// Look up a valid request and check `acting` is its recipient.
    async fn authorize(&self, token: &str, acting: &ActingIdentity) -> Result<ShareRequest> {
        let request = self
            .ledger
            .find_valid_by_token(token)
            .await?
            .ok_or(ShareError::NotFound)?;

        if !request.is_addressed_to(&acting.email) {
            warn!(request_id = %request.id, actor = %acting.user_id, "response from a different email than invited");
            return Err(ShareError::Unauthorized(
                "this invitation was sent to a different email address".into(),
            ));
        }

        match self.store.find_user_by_email(&request.recipient_email).await? {
            Some(owner) if owner.id == acting.user_id => Ok(request),
            _ => {
                warn!(request_id = %request.id, actor = %acting.user_id, "acting user does not own the invited email");
                Err(ShareError::Unauthorized(
                    "your account does not match the invited email address".into(),
                ))
            }
        }
    }

    /// Write the grant for an approved request. Never fails: anything that
    /// goes wrong after approval is reported as a partial outcome.
    async fn materialize(&self, request: ShareRequest, grantee: UserId) -> ApproveOutcome {
        let category = match request.scope {
            ShareScope::Category(id) => id,
            legacy => {
                let reason = GrantFailure::UnsupportedShareType {
                    scope: legacy.kind(),
                };
                return self.partial(request, reason);
            }
        };

        match self.store.get_category(category).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let reason = GrantFailure::ResourceMissing(ResourceRef::Category(category));
                return self.partial(request, reason);
            }
            Err(e) => return self.partial(request, GrantFailure::Store(e.to_string())),
        }

        let target = GrantTarget::Category(category);
        let grant = Grant::new(target, grantee, request.permission, self.clock.now_millis());

        match self
            .store
            .insert_grant(&grant, self.config.max_grantees_per_resource)
            .await
        {
            Ok(GrantInsert::Inserted) => {
                info!(
                    request_id = %request.id,
                    grantee = %grantee,
                    target = %target,
                    permission = %request.permission,
                    "grant created"
                );
                ApproveOutcome::Granted {
                    request: self.mark_granted(request).await,
                    target,
                    created: true,
                }
            }
            Ok(GrantInsert::AlreadyExists { existing }) => {
                debug!(
                    request_id = %request.id,
                    grantee = %grantee,
                    target = %target,
                    existing = %existing,
                    "grant already present"
                );
                ApproveOutcome::Granted {
                    request: self.mark_granted(request).await,
                    target,
                    created: false,
                }
            }
            Ok(GrantInsert::CapExceeded { limit }) => {
                self.partial(request, GrantFailure::CapExceeded { limit })
            }
            Err(e) => self.partial(request, GrantFailure::Store(e.to_string())),
        }
    }

    /// Stamp `granted_at`. The grant itself is already written, so a failure
    /// here is logged and the outcome stays `Granted`.
    async fn mark_granted(&self, mut request: ShareRequest) -> ShareRequest {
        let now = self.clock.now_millis();
        match self.store.mark_request_granted(request.id, now).await {
            Ok(true) => request.granted_at = Some(now),
            Ok(false) => {}
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "could not record grant on request");
            }
        }
        request
    }

    fn partial(&self, request: ShareRequest, reason: GrantFailure) -> ApproveOutcome {
        error!(
            request_id = %request.id,
            scope = %request.scope,
            reason = %reason,
            retriable = reason.is_retriable(),
            "share request approved without grant"
        );
        ApproveOutcome::ApprovedWithoutGrant { request, reason }
    }
}
