//! The share request ledger.
//!
//! Creates requests, finds them by token, and cancels them. Requests are
//! never deleted. Expiry is lazy: a pending request past `expires_at` simply
//! stops being valid.

use std::sync::Arc;

use tracing::{debug, info};

use taskshare_core::{
    validate_email, Clock, GrantTarget, NewShareRequest, Permission, RequestId, RequestStatus,
    ResourceRef, ShareRequest, ShareScope, ShareToken, User, UserId, ValidationError,
};
use taskshare_store::{RequestInsert, Store, Transition};

use crate::config::ShareConfig;
use crate::error::{Result, ShareError};

/// Result of [`ShareLedger::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new pending request was stored.
    Created(ShareRequest),
    /// A valid pending request for the same requester, scope, and recipient
    /// already exists. Nothing was written.
    Duplicate { existing: RequestId },
}

/// Share request ledger over a [`Store`].
pub struct ShareLedger<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ShareConfig,
}

impl<S: ?Sized> Clone for ShareLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: Store + ?Sized> ShareLedger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: ShareConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Create a pending request from `requester` to `recipient_email`.
    ///
    /// Validation runs before anything is written. Does not notify; the
    /// caller hands the created request to a notifier.
    pub async fn create(
        &self,
        requester: UserId,
        scope: ShareScope,
        recipient_email: &str,
        permission: Permission,
    ) -> Result<CreateOutcome> {
        let recipient_email = validate_email(recipient_email)?;

        let category = match scope {
            ShareScope::Category(id) => id,
            legacy => return Err(ValidationError::LegacyScope(legacy.kind()).into()),
        };

        let requester_user = self
            .store
            .get_user(requester)
            .await?
            .ok_or(ShareError::UnknownUser(requester))?;

        if requester_user.email == recipient_email {
            return Err(ShareError::SelfShareRejected);
        }

        let recipient = self
            .store
            .find_user_by_email(&recipient_email)
            .await?
            .ok_or(ShareError::RecipientUnknown)?;

        let resource = ResourceRef::Category(category);
        let category = self
            .store
            .get_category(category)
            .await?
            .ok_or(ShareError::ResourceNotFound(resource))?;
        if category.owner_id != requester {
            return Err(ShareError::NotOwner(resource));
        }

        self.check_capacity(GrantTarget::Category(category.id), &recipient)
            .await?;

        let now = self.clock.now_millis();

        for attempt in 1..=self.config.token_retry_limit {
            let request = NewShareRequest::new(
                requester,
                scope,
                &recipient_email,
                ShareToken::generate(self.config.token_bytes),
                permission,
                now,
                self.config.request_ttl_ms,
            );

            match self.store.insert_request(&request, now).await? {
                RequestInsert::Inserted(stored) => {
                    info!(
                        request_id = %stored.id,
                        requester = %requester,
                        scope = %stored.scope,
                        token = %stored.token,
                        "share request created"
                    );
                    return Ok(CreateOutcome::Created(stored));
                }
                RequestInsert::Duplicate { existing } => {
                    debug!(request_id = %existing, requester = %requester, "duplicate share request");
                    return Ok(CreateOutcome::Duplicate { existing });
                }
                RequestInsert::TokenCollision => {
                    debug!(attempt, "share token collision, regenerating");
                }
            }
        }

        Err(ShareError::TokenExhausted {
            attempts: self.config.token_retry_limit,
        })
    }

    /// The request for `token`, only if it is still pending and unexpired.
    ///
    /// A malformed token is treated the same as an unknown one.
    pub async fn find_valid_by_token(&self, token: &str) -> Result<Option<ShareRequest>> {
        let token = match ShareToken::parse(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };

        let now = self.clock.now_millis();
        Ok(self
            .store
            .find_request_by_token(&token)
            .await?
            .filter(|request| request.is_valid(now)))
    }

    /// Cancel a pending request. Only the requester may cancel.
    pub async fn cancel(&self, request_id: RequestId, actor: UserId) -> Result<ShareRequest> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(ShareError::RequestNotFound(request_id))?;

        if request.requester_id != actor {
            return Err(ShareError::Unauthorized(
                "only the person who sent a request can cancel it".into(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(ShareError::AlreadyResponded(request.status));
        }

        match self
            .store
            .transition_request(request_id, RequestStatus::Cancelled, None)
            .await?
        {
            Transition::Applied(cancelled) => {
                info!(request_id = %request_id, requester = %actor, "share request cancelled");
                Ok(cancelled)
            }
            Transition::Stale { current } => Err(ShareError::AlreadyResponded(current)),
            Transition::NotFound => Err(ShareError::RequestNotFound(request_id)),
        }
    }

    /// Fail early when `target` is full and `recipient` is not already on it.
    async fn check_capacity(&self, target: GrantTarget, recipient: &User) -> Result<()> {
        let grants = self.store.list_grants(&target).await?;
        let limit = self.config.max_grantees_per_resource;

        if grants.len() >= limit && !grants.iter().any(|g| g.grantee_id == recipient.id) {
            return Err(ShareError::GrantCapExceeded { limit });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, ALICE, BOB, CAROL, WORK};
    use taskshare_core::{CategoryId, Grant, ManualClock};

    fn ledger(fixture: &Harness) -> ShareLedger<taskshare_store::MemoryStore> {
        ShareLedger::new(
            fixture.store.clone(),
            fixture.clock.clone(),
            ShareConfig::default(),
        )
    }

    fn created(outcome: CreateOutcome) -> ShareRequest {
        match outcome {
            CreateOutcome::Created(request) => request,
            other => panic!("expected a new request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_stores_pending_request() {
        let fixture = Harness::seeded().await;
        let ledger = ledger(&fixture);

        let request = created(
            ledger
                .create(ALICE, ShareScope::Category(WORK), " B@Example.com ", Permission::View)
                .await
                .unwrap(),
        );

        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.recipient_email, "b@example.com");
        assert!(request.token.expose().len() >= 40);
        assert_eq!(
            request.expires_at,
            fixture.clock.now_millis() + ShareConfig::default().request_ttl_ms
        );
    }

    #[tokio::test]
    async fn test_create_is_idempotent_while_pending() {
        let fixture = Harness::seeded().await;
        let ledger = ledger(&fixture);
        let scope = ShareScope::Category(WORK);

        let first = created(ledger.create(ALICE, scope, "b@example.com", Permission::View).await.unwrap());
        let second = ledger
            .create(ALICE, scope, "b@example.com", Permission::Edit)
            .await
            .unwrap();

        assert_eq!(second, CreateOutcome::Duplicate { existing: first.id });
        assert_eq!(
            fixture.store.list_requests_by_requester(ALICE).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_create_validation() {
        let fixture = Harness::seeded().await;
        let ledger = ledger(&fixture);
        let scope = ShareScope::Category(WORK);

        assert!(matches!(
            ledger.create(ALICE, scope, "not-an-email", Permission::View).await,
            Err(ShareError::Validation(ValidationError::InvalidEmail(_)))
        ));
        assert!(matches!(
            ledger.create(ALICE, scope, "A@example.com", Permission::View).await,
            Err(ShareError::SelfShareRejected)
        ));
        assert!(matches!(
            ledger.create(ALICE, scope, "nobody@example.com", Permission::View).await,
            Err(ShareError::RecipientUnknown)
        ));
        assert!(matches!(
            ledger.create(BOB, scope, "c@example.com", Permission::View).await,
            Err(ShareError::NotOwner(_))
        ));
        assert!(matches!(
            ledger
                .create(ALICE, ShareScope::Category(CategoryId(999)), "b@example.com", Permission::View)
                .await,
            Err(ShareError::ResourceNotFound(_))
        ));
        assert!(matches!(
            ledger.create(ALICE, ShareScope::Global, "b@example.com", Permission::View).await,
            Err(ShareError::Validation(ValidationError::LegacyScope("global")))
        ));

        assert!(fixture
            .store
            .list_requests_by_requester(ALICE)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_create_fails_early_when_full() {
        let fixture = Harness::seeded().await;
        let config = ShareConfig {
            max_grantees_per_resource: 1,
            ..ShareConfig::default()
        };
        let ledger = ShareLedger::new(fixture.store.clone(), fixture.clock.clone(), config);
        fixture
            .store
            .insert_grant(&Grant::new(GrantTarget::Category(WORK), BOB, Permission::View, 0), 1)
            .await
            .unwrap();

        let err = ledger
            .create(ALICE, ShareScope::Category(WORK), "c@example.com", Permission::View)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::GrantCapExceeded { limit: 1 }));

        // An existing grantee may still be re-invited.
        assert!(ledger
            .create(ALICE, ShareScope::Category(WORK), "b@example.com", Permission::View)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_find_valid_by_token_respects_expiry() {
        let fixture = Harness::seeded().await;
        let ledger = ledger(&fixture);
        let request = created(
            ledger
                .create(ALICE, ShareScope::Category(WORK), "b@example.com", Permission::View)
                .await
                .unwrap(),
        );

        let found = ledger.find_valid_by_token(request.token.expose()).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(request.id));

        fixture.clock.set(request.expires_at);
        assert!(ledger
            .find_valid_by_token(request.token.expose())
            .await
            .unwrap()
            .is_none());

        assert!(ledger.find_valid_by_token("garbage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel() {
        let fixture = Harness::seeded().await;
        let ledger = ledger(&fixture);
        let request = created(
            ledger
                .create(ALICE, ShareScope::Category(WORK), "c@example.com", Permission::Edit)
                .await
                .unwrap(),
        );

        assert!(matches!(
            ledger.cancel(request.id, CAROL).await,
            Err(ShareError::Unauthorized(_))
        ));

        let cancelled = ledger.cancel(request.id, ALICE).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert_eq!(cancelled.responded_at, None);

        assert!(matches!(
            ledger.cancel(request.id, ALICE).await,
            Err(ShareError::AlreadyResponded(RequestStatus::Cancelled))
        ));
        assert!(ledger
            .find_valid_by_token(request.token.expose())
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            ledger.cancel(RequestId(999), ALICE).await,
            Err(ShareError::RequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_token_exhaustion_is_reported() {
        // A zero retry budget never gets to insert.
        let fixture = Harness::seeded().await;
        let config = ShareConfig {
            token_retry_limit: 0,
            ..ShareConfig::default()
        };
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let ledger = ShareLedger::new(fixture.store.clone(), clock, config);

        assert!(matches!(
            ledger
                .create(ALICE, ShareScope::Category(WORK), "b@example.com", Permission::View)
                .await,
            Err(ShareError::TokenExhausted { attempts: 0 })
        ));
    }
}
