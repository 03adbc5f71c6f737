//! The sharing service: the API consumed by CLI and HTTP layers.
//!
//! Wires the ledger, the lifecycle engine, the resolver, and a notifier
//! together. Notifications are sent after the state change and their
//! failure only produces a warning.

use std::sync::Arc;

use tracing::{info, warn};

use taskshare_core::{
    Clock, GlobalGrant, Grant, GrantTarget, Permission, PermissionLevel, RequestId, ResourceRef,
    ShareRequest, ShareToken, SystemClock, Timestamp, User, UserId,
};
use taskshare_perms::{PermissionResolver, Resolution};
use taskshare_store::Store;

use crate::config::ShareConfig;
use crate::error::{Result, ShareError};
use crate::ledger::CreateOutcome;
use crate::lifecycle::{ActingIdentity, ApproveOutcome, LifecycleEngine};
use crate::notify::{Notifier, ShareNotice, TracingNotifier};

/// Result of [`ShareService::create_share_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateResult {
    /// A new request was created. `notified` reports whether the recipient
    /// notification went out.
    Created {
        id: RequestId,
        token: ShareToken,
        notified: bool,
    },
    /// An equivalent request is already pending.
    AlreadyRequested { id: RequestId },
}

impl CreateResult {
    pub fn id(&self) -> RequestId {
        match self {
            CreateResult::Created { id, .. } | CreateResult::AlreadyRequested { id } => *id,
        }
    }
}

/// A request as shown in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedRequest {
    pub request: ShareRequest,
    /// Still pending and unexpired.
    pub valid: bool,
}

/// Requests a user sent and received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestListing {
    pub outgoing: Vec<ListedRequest>,
    pub incoming: Vec<ListedRequest>,
}

/// The sharing service.
pub struct ShareService<S: ?Sized> {
    store: Arc<S>,
    engine: LifecycleEngine<S>,
    resolver: PermissionResolver<S>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: ShareConfig,
}

impl<S: Store + ?Sized> ShareService<S> {
    /// Create a service on the system clock with the tracing notifier.
    pub fn new(store: Arc<S>, config: ShareConfig) -> Result<Self> {
        Self::with_parts(
            store,
            config,
            Arc::new(SystemClock),
            Arc::new(TracingNotifier::new()),
        )
    }

    /// Create a service with an explicit clock and notifier.
    pub fn with_parts(
        store: Arc<S>,
        config: ShareConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: LifecycleEngine::new(store.clone(), clock.clone(), config.clone()),
            resolver: PermissionResolver::new(store.clone()),
            store,
            notifier,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Invite `recipient_email` to `resource` with `permission` ("view" or
    /// "edit"), and notify the recipient.
    pub async fn create_share_request(
        &self,
        requester: UserId,
        resource: ResourceRef,
        recipient_email: &str,
        permission: &str,
    ) -> Result<CreateResult> {
        let permission = Permission::parse_input(permission)?;

        let request = match self
            .engine
            .ledger()
            .create(requester, resource.into(), recipient_email, permission)
            .await?
        {
            CreateOutcome::Created(request) => request,
            CreateOutcome::Duplicate { existing } => {
                return Ok(CreateResult::AlreadyRequested { id: existing });
            }
        };

        let requester_email = self
            .store
            .get_user(requester)
            .await?
            .map(|u| u.email)
            .unwrap_or_default();
        let notice = ShareNotice::Requested {
            request_id: request.id,
            requester_email,
            scope: request.scope,
            permission: request.permission,
            token: request.token.clone(),
        };
        let notified = self.send_to_email(&request.recipient_email, &notice).await;

        Ok(CreateResult::Created {
            id: request.id,
            token: request.token,
            notified,
        })
    }

    /// Approve the request behind `token` as `acting`.
    ///
    /// An [`ApproveOutcome::ApprovedWithoutGrant`] is a partial success:
    /// the request is approved but access was not granted. The requester is
    /// told which of the two happened.
    pub async fn approve_share_request(
        &self,
        token: &str,
        acting: &ActingIdentity,
    ) -> Result<ApproveOutcome> {
        let outcome = self.engine.approve(token, acting).await?;

        if self.config.notify_on_response {
            let request = outcome.request();
            let notice = match &outcome {
                ApproveOutcome::Granted { .. } => ShareNotice::Approved {
                    request_id: request.id,
                    recipient_email: request.recipient_email.clone(),
                    scope: request.scope,
                    permission: request.permission,
                },
                ApproveOutcome::ApprovedWithoutGrant { reason, .. } => {
                    ShareNotice::ApprovedWithoutGrant {
                        request_id: request.id,
                        recipient_email: request.recipient_email.clone(),
                        scope: request.scope,
                        reason: reason.clone(),
                    }
                }
            };
            self.send_to_user(request.requester_id, &notice).await;
        }

        Ok(outcome)
    }

    /// Decline the request behind `token` as `acting`.
    pub async fn reject_share_request(&self, token: &str, acting: &ActingIdentity) -> Result<()> {
        let request = self.engine.reject(token, acting).await?;

        if self.config.notify_on_response {
            let notice = ShareNotice::Rejected {
                request_id: request.id,
                recipient_email: request.recipient_email.clone(),
                scope: request.scope,
            };
            self.send_to_user(request.requester_id, &notice).await;
        }

        Ok(())
    }

    /// Withdraw a pending request. Only its sender may do this.
    pub async fn cancel_share_request(&self, request_id: RequestId, actor: UserId) -> Result<()> {
        self.engine.ledger().cancel(request_id, actor).await?;
        Ok(())
    }

    /// Re-run grant creation for an approved request that never got its
    /// grant. Fails with [`ShareError::GrantRevoked`] once the owner has
    /// removed a grant the request did produce.
    pub async fn retry_grant(
        &self,
        request_id: RequestId,
        acting: &ActingIdentity,
    ) -> Result<ApproveOutcome> {
        self.engine.retry_grant(request_id, acting).await
    }

    /// Requests `user` sent and received that are still valid or were
    /// created within the recent window. Newest first.
    pub async fn list_requests(&self, user: UserId) -> Result<RequestListing> {
        let user_row = self
            .store
            .get_user(user)
            .await?
            .ok_or(ShareError::UnknownUser(user))?;
        let now = self.clock.now_millis();

        let outgoing = self.store.list_requests_by_requester(user).await?;
        let incoming = self.store.list_requests_for_recipient(&user_row.email).await?;

        Ok(RequestListing {
            outgoing: self.visible(outgoing, now),
            incoming: self.visible(incoming, now),
        })
    }

    fn visible(&self, requests: Vec<ShareRequest>, now: Timestamp) -> Vec<ListedRequest> {
        let cutoff = now.saturating_sub(self.config.recent_window_ms);
        requests
            .into_iter()
            .map(|request| ListedRequest {
                valid: request.is_valid(now),
                request,
            })
            .filter(|listed| listed.valid || listed.request.created_at >= cutoff)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Effective permission of `actor` on `resource`.
    pub async fn resolve_permission(
        &self,
        actor: UserId,
        resource: ResourceRef,
    ) -> Result<PermissionLevel> {
        Ok(self.resolver.resolve(actor, resource).await?)
    }

    /// Effective permission of `actor` on `resource` and where it came from.
    pub async fn explain_permission(
        &self,
        actor: UserId,
        resource: ResourceRef,
    ) -> Result<Resolution> {
        Ok(self.resolver.explain(actor, resource).await?)
    }

    /// Whether `actor` may delete `resource`.
    pub async fn can_delete(&self, actor: UserId, resource: ResourceRef) -> Result<bool> {
        Ok(self.resolver.can_delete(actor, resource).await?)
    }

    /// Remove `grantee`'s grant on `resource`. Works for category grants and
    /// legacy per-task grants.
    pub async fn unshare(
        &self,
        resource: ResourceRef,
        grantee: UserId,
        acting_owner: UserId,
    ) -> Result<()> {
        self.require_owner(resource, acting_owner).await?;

        if !self
            .store
            .delete_grant(&GrantTarget::from(resource), grantee)
            .await?
        {
            return Err(ShareError::GrantNotFound);
        }

        info!(resource = %resource, grantee = %grantee, owner = %acting_owner, "unshared");
        Ok(())
    }

    /// Remove a legacy "all my tasks" grant from `acting_owner` to `grantee`.
    pub async fn unshare_all_tasks(&self, grantee: UserId, acting_owner: UserId) -> Result<()> {
        if !self
            .store
            .delete_global_grant(acting_owner, grantee)
            .await?
        {
            return Err(ShareError::GrantNotFound);
        }

        info!(grantee = %grantee, owner = %acting_owner, "global share removed");
        Ok(())
    }

    /// Grants on `resource`, oldest first. Owner only.
    pub async fn list_grantees(
        &self,
        resource: ResourceRef,
        acting_owner: UserId,
    ) -> Result<Vec<Grant>> {
        self.require_owner(resource, acting_owner).await?;
        Ok(self.store.list_grants(&GrantTarget::from(resource)).await?)
    }

    /// Legacy global grants issued by `owner`.
    pub async fn list_global_grantees(&self, owner: UserId) -> Result<Vec<GlobalGrant>> {
        Ok(self.store.list_global_grants(owner).await?)
    }

    async fn require_owner(&self, resource: ResourceRef, actor: UserId) -> Result<()> {
        if self.resolver.owner_of(resource).await? != actor {
            return Err(ShareError::NotOwner(resource));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────

    async fn send_to_email(&self, email: &str, notice: &ShareNotice) -> bool {
        match self.store.find_user_by_email(email).await {
            Ok(Some(user)) => self.send(&user, notice).await,
            Ok(None) => {
                warn!(request_id = %notice.request_id(), "notice recipient is not registered");
                false
            }
            Err(e) => {
                warn!(request_id = %notice.request_id(), error = %e, "notice recipient lookup failed");
                false
            }
        }
    }

    async fn send_to_user(&self, user: UserId, notice: &ShareNotice) -> bool {
        match self.store.get_user(user).await {
            Ok(Some(user)) => self.send(&user, notice).await,
            Ok(None) => {
                warn!(request_id = %notice.request_id(), user = %user, "notice recipient is not registered");
                false
            }
            Err(e) => {
                warn!(request_id = %notice.request_id(), error = %e, "notice recipient lookup failed");
                false
            }
        }
    }

    async fn send(&self, user: &User, notice: &ShareNotice) -> bool {
        let delivered = self.notifier.notify(user, notice).await;
        if !delivered {
            warn!(
                request_id = %notice.request_id(),
                user = %user.id,
                kind = notice.kind(),
                "share notice delivery failed"
            );
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::GrantFailure;
    use crate::testing::{Harness, RecordingNotifier, ALICE, BOB, CAROL, PLAN, START, WORK};
    use taskshare_core::{CategoryId, RequestStatus, ShareScope, ValidationError, DAY_MS};
    use taskshare_perms::{GrantSource, PermissionSource};
    use taskshare_store::MemoryStore;

    fn service(h: &Harness, notifier: Arc<RecordingNotifier>) -> ShareService<MemoryStore> {
        ShareService::with_parts(
            h.store.clone(),
            ShareConfig::default(),
            h.clock.clone(),
            notifier,
        )
        .unwrap()
    }

    fn bob() -> ActingIdentity {
        ActingIdentity::new(BOB, "b@example.com")
    }

    fn token_of(result: &CreateResult) -> String {
        match result {
            CreateResult::Created { token, .. } => token.expose().to_string(),
            other => panic!("expected a new request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_notifies_recipient() {
        let h = Harness::seeded().await;
        let notifier = Arc::new(RecordingNotifier::new());
        let service = service(&h, notifier.clone());

        let created = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "view")
            .await
            .unwrap();
        assert!(matches!(created, CreateResult::Created { notified: true, .. }));
        assert_eq!(notifier.kinds(), vec![(BOB, "requested")]);

        let again = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "view")
            .await
            .unwrap();
        assert_eq!(again, CreateResult::AlreadyRequested { id: created.id() });
        assert_eq!(notifier.kinds().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_permission_is_rejected() {
        let h = Harness::seeded().await;
        let service = service(&h, Arc::new(RecordingNotifier::new()));

        let err = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "admin")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShareError::Validation(ValidationError::InvalidPermission(_))
        ));
    }

    #[tokio::test]
    async fn test_task_shares_cannot_be_requested() {
        let h = Harness::seeded().await;
        let service = service(&h, Arc::new(RecordingNotifier::new()));

        let err = service
            .create_share_request(ALICE, ResourceRef::Task(PLAN), "b@example.com", "view")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShareError::Validation(ValidationError::LegacyScope("task"))
        ));
    }

    #[tokio::test]
    async fn test_failed_notification_keeps_state() {
        let h = Harness::seeded().await;
        let notifier = Arc::new(RecordingNotifier::failing());
        let service = service(&h, notifier.clone());

        let created = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "edit")
            .await
            .unwrap();
        assert!(matches!(created, CreateResult::Created { notified: false, .. }));

        let outcome = service
            .approve_share_request(&token_of(&created), &bob())
            .await
            .unwrap();
        assert!(outcome.is_complete());
        assert_eq!(notifier.kinds(), vec![(BOB, "requested"), (ALICE, "approved")]);

        assert_eq!(
            service
                .resolve_permission(BOB, ResourceRef::Task(PLAN))
                .await
                .unwrap(),
            PermissionLevel::Edit
        );
    }

    #[tokio::test]
    async fn test_approve_notice_matches_outcome() {
        let h = Harness::seeded().await;
        let notifier = Arc::new(RecordingNotifier::new());
        let config = ShareConfig {
            max_grantees_per_resource: 1,
            ..ShareConfig::default()
        };
        let service =
            ShareService::with_parts(h.store.clone(), config, h.clock.clone(), notifier.clone())
                .unwrap();

        let to_bob = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "edit")
            .await
            .unwrap();
        let to_carol = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "c@example.com", "view")
            .await
            .unwrap();

        // Bob takes the only slot.
        let full = service
            .approve_share_request(&token_of(&to_bob), &bob())
            .await
            .unwrap();
        assert!(full.is_complete());

        let carol = ActingIdentity::new(CAROL, "c@example.com");
        let partial = service
            .approve_share_request(&token_of(&to_carol), &carol)
            .await
            .unwrap();
        assert!(!partial.is_complete());

        assert_eq!(
            notifier.kinds(),
            vec![
                (BOB, "requested"),
                (CAROL, "requested"),
                (ALICE, "approved"),
                (ALICE, "approved_without_grant"),
            ]
        );
        let sent = notifier.sent();
        let (_, notice) = &sent[3];
        assert_eq!(
            *notice,
            ShareNotice::ApprovedWithoutGrant {
                request_id: to_carol.id(),
                recipient_email: "c@example.com".into(),
                scope: ShareScope::Category(WORK),
                reason: GrantFailure::CapExceeded { limit: 1 },
            }
        );
        assert!(!notice.body().contains("can now"));
    }

    #[tokio::test]
    async fn test_reject_notifies_requester_unless_disabled() {
        let h = Harness::seeded().await;
        let notifier = Arc::new(RecordingNotifier::new());
        let config = ShareConfig {
            notify_on_response: false,
            ..ShareConfig::default()
        };
        let quiet = ShareService::with_parts(h.store.clone(), config, h.clock.clone(), notifier.clone())
            .unwrap();

        let created = quiet
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "view")
            .await
            .unwrap();
        quiet
            .reject_share_request(&token_of(&created), &bob())
            .await
            .unwrap();

        assert_eq!(notifier.kinds(), vec![(BOB, "requested")]);
        assert_eq!(
            quiet
                .resolve_permission(BOB, ResourceRef::Category(WORK))
                .await
                .unwrap(),
            PermissionLevel::None
        );
    }

    #[tokio::test]
    async fn test_list_requests_hides_old_history() {
        let h = Harness::seeded().await;
        let service = service(&h, Arc::new(RecordingNotifier::new()));

        let old = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "view")
            .await
            .unwrap();
        service
            .reject_share_request(&token_of(&old), &bob())
            .await
            .unwrap();

        h.clock.set(START + 31 * DAY_MS);
        let fresh = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "c@example.com", "view")
            .await
            .unwrap();

        let listing = service.list_requests(ALICE).await.unwrap();
        assert_eq!(listing.outgoing.len(), 1);
        assert_eq!(listing.outgoing[0].request.id, fresh.id());
        assert!(listing.outgoing[0].valid);
        assert!(listing.incoming.is_empty());

        // Bob's rejected invite is past the window too.
        assert!(service.list_requests(BOB).await.unwrap().incoming.is_empty());

        let carol = service.list_requests(CAROL).await.unwrap();
        assert_eq!(carol.incoming.len(), 1);
        assert_eq!(carol.incoming[0].request.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_expired_requests_stay_listed_while_recent() {
        let h = Harness::seeded().await;
        let service = service(&h, Arc::new(RecordingNotifier::new()));

        service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "view")
            .await
            .unwrap();
        h.clock.advance(8 * DAY_MS);

        let listing = service.list_requests(BOB).await.unwrap();
        assert_eq!(listing.incoming.len(), 1);
        assert!(!listing.incoming[0].valid);
    }

    #[tokio::test]
    async fn test_unshare_is_owner_only() {
        let h = Harness::seeded().await;
        let service = service(&h, Arc::new(RecordingNotifier::new()));
        let created = service
            .create_share_request(ALICE, ResourceRef::Category(WORK), "b@example.com", "view")
            .await
            .unwrap();
        service
            .approve_share_request(&token_of(&created), &bob())
            .await
            .unwrap();

        let category = ResourceRef::Category(WORK);
        assert!(matches!(
            service.unshare(category, BOB, BOB).await,
            Err(ShareError::NotOwner(_))
        ));
        assert!(matches!(
            service.list_grantees(category, CAROL).await,
            Err(ShareError::NotOwner(_))
        ));
        assert_eq!(service.list_grantees(category, ALICE).await.unwrap().len(), 1);

        service.unshare(category, BOB, ALICE).await.unwrap();
        assert_eq!(
            service.resolve_permission(BOB, category).await.unwrap(),
            PermissionLevel::None
        );
        assert!(matches!(
            service.unshare(category, BOB, ALICE).await,
            Err(ShareError::GrantNotFound)
        ));
        assert!(matches!(
            service.unshare(ResourceRef::Category(CategoryId(404)), BOB, ALICE).await,
            Err(ShareError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_grants_can_be_removed() {
        let h = Harness::seeded().await;
        let service = service(&h, Arc::new(RecordingNotifier::new()));
        h.store
            .insert_global_grant(
                &GlobalGrant {
                    owner_id: ALICE,
                    grantee_id: CAROL,
                    permission: Permission::View,
                    created_at: START,
                },
                5,
            )
            .await
            .unwrap();
        h.store
            .insert_grant(&Grant::new(GrantTarget::Task(PLAN), BOB, Permission::Edit, START), 5)
            .await
            .unwrap();

        let explained = service
            .explain_permission(CAROL, ResourceRef::Task(PLAN))
            .await
            .unwrap();
        assert_eq!(explained.source, PermissionSource::Grant(GrantSource::Global));
        assert_eq!(service.list_global_grantees(ALICE).await.unwrap().len(), 1);

        service.unshare_all_tasks(CAROL, ALICE).await.unwrap();
        service.unshare(ResourceRef::Task(PLAN), BOB, ALICE).await.unwrap();

        for user in [BOB, CAROL] {
            assert_eq!(
                service
                    .resolve_permission(user, ResourceRef::Task(PLAN))
                    .await
                    .unwrap(),
                PermissionLevel::None
            );
        }
        assert!(matches!(
            service.unshare_all_tasks(CAROL, ALICE).await,
            Err(ShareError::GrantNotFound)
        ));
    }

    #[tokio::test]
    async fn test_can_delete() {
        let h = Harness::seeded().await;
        let service = service(&h, Arc::new(RecordingNotifier::new()));
        h.store
            .insert_grant(&Grant::new(GrantTarget::Category(WORK), BOB, Permission::Edit, START), 5)
            .await
            .unwrap();

        assert!(service.can_delete(ALICE, ResourceRef::Task(PLAN)).await.unwrap());
        assert!(!service.can_delete(BOB, ResourceRef::Task(PLAN)).await.unwrap());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let config = ShareConfig {
            max_grantees_per_resource: 0,
            ..ShareConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            ShareService::new(store, config),
            Err(ShareError::Config(_))
        ));
    }
}
