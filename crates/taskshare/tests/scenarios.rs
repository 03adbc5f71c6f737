//! End-to-end sharing scenarios.
//!
//! Each test seeds the same small world: Alice (1, a@example.com) owns
//! category 10 holding task 100; Bob (2, b@example.com) and Carol
//! (3, c@example.com) are registered.

use std::sync::{Arc, Once};

use async_trait::async_trait;
use taskshare::core::{Category, GlobalGrant, Grant, GrantTarget, ManualClock, Task, User};
use taskshare::store::{MemoryStore, SqliteStore, Store};
use taskshare::{
    ActingIdentity, ApproveOutcome, CategoryId, CreateResult, GrantFailure, Notifier, Permission,
    PermissionLevel, RequestStatus, ResourceRef, ShareConfig, ShareError, ShareNotice,
    ShareService, TaskId, UserId,
};

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);
const CAROL: UserId = UserId(3);
const CATEGORY: ResourceRef = ResourceRef::Category(CategoryId(10));
const TASK: ResourceRef = ResourceRef::Task(TaskId(100));
const START: i64 = 1_700_000_000_000;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

struct Silent;

#[async_trait]
impl Notifier for Silent {
    async fn notify(&self, _recipient: &User, _notice: &ShareNotice) -> bool {
        true
    }
}

async fn seed<S: Store + ?Sized>(store: &S) {
    for (id, email) in [
        (ALICE, "a@example.com"),
        (BOB, "b@example.com"),
        (CAROL, "c@example.com"),
    ] {
        store.insert_user(&User::new(id, email)).await.unwrap();
    }
    store
        .upsert_category(&Category {
            id: CategoryId(10),
            owner_id: ALICE,
            name: "groceries".into(),
        })
        .await
        .unwrap();
    store
        .upsert_task(&Task {
            id: TaskId(100),
            owner_id: ALICE,
            category_id: Some(CategoryId(10)),
            title: "buy milk".into(),
        })
        .await
        .unwrap();
}

async fn world() -> (ShareService<MemoryStore>, Arc<ManualClock>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref()).await;
    let clock = Arc::new(ManualClock::new(START));
    let service =
        ShareService::with_parts(store, ShareConfig::default(), clock.clone(), Arc::new(Silent))
            .unwrap();
    (service, clock)
}

fn bob() -> ActingIdentity {
    ActingIdentity::new(BOB, "b@example.com")
}

async fn invite(service: &ShareService<MemoryStore>, email: &str, permission: &str) -> String {
    match service
        .create_share_request(ALICE, CATEGORY, email, permission)
        .await
        .unwrap()
    {
        CreateResult::Created { token, .. } => token.expose().to_string(),
        other => panic!("expected a new request, got {:?}", other),
    }
}

#[tokio::test]
async fn happy_path_grants_category_and_its_tasks() {
    let (service, _) = world().await;
    let token = invite(&service, "b@example.com", "view").await;

    let outcome = service.approve_share_request(&token, &bob()).await.unwrap();
    match outcome {
        ApproveOutcome::Granted { target, .. } => {
            assert_eq!(target, GrantTarget::Category(CategoryId(10)))
        }
        other => panic!("expected grant, got {:?}", other),
    }

    assert_eq!(
        service.resolve_permission(BOB, CATEGORY).await.unwrap(),
        PermissionLevel::View
    );
    assert_eq!(
        service.resolve_permission(BOB, TASK).await.unwrap(),
        PermissionLevel::View
    );
    assert_eq!(
        service.resolve_permission(CAROL, TASK).await.unwrap(),
        PermissionLevel::None
    );
    assert!(!service.can_delete(BOB, TASK).await.unwrap());
}

#[tokio::test]
async fn rejection_leaves_no_grant() {
    let (service, _) = world().await;
    let token = invite(&service, "b@example.com", "edit").await;

    service.reject_share_request(&token, &bob()).await.unwrap();

    assert_eq!(
        service.resolve_permission(BOB, CATEGORY).await.unwrap(),
        PermissionLevel::None
    );
}

#[tokio::test]
async fn expired_token_is_not_found() {
    let (service, clock) = world().await;
    let token = invite(&service, "b@example.com", "view").await;

    clock.advance(ShareConfig::default().request_ttl_ms + 1_000);

    let err = service.approve_share_request(&token, &bob()).await.unwrap_err();
    assert!(matches!(err, ShareError::NotFound));
    assert_eq!(err.to_string(), "this invitation has expired or was already used");
    assert_eq!(
        service.resolve_permission(BOB, CATEGORY).await.unwrap(),
        PermissionLevel::None
    );
}

#[tokio::test]
async fn duplicate_request_returns_first_id() {
    let (service, _) = world().await;

    let first = service
        .create_share_request(ALICE, CATEGORY, "b@example.com", "view")
        .await
        .unwrap();
    let second = service
        .create_share_request(ALICE, CATEGORY, "b@example.com", "view")
        .await
        .unwrap();

    assert_eq!(second, CreateResult::AlreadyRequested { id: first.id() });

    let outgoing = service.list_requests(ALICE).await.unwrap().outgoing;
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].request.status, RequestStatus::Pending);
}

#[tokio::test]
async fn re_request_after_expiry_creates_a_new_row() {
    let (service, clock) = world().await;
    let first = service
        .create_share_request(ALICE, CATEGORY, "b@example.com", "view")
        .await
        .unwrap();

    clock.advance(ShareConfig::default().request_ttl_ms);
    let second = service
        .create_share_request(ALICE, CATEGORY, "b@example.com", "view")
        .await
        .unwrap();

    assert!(matches!(second, CreateResult::Created { .. }));
    assert_ne!(second.id(), first.id());
}

#[tokio::test]
async fn only_one_response_counts() {
    let (service, _) = world().await;
    let token = invite(&service, "b@example.com", "view").await;

    assert!(service
        .approve_share_request(&token, &bob())
        .await
        .unwrap()
        .is_complete());
    assert!(matches!(
        service.reject_share_request(&token, &bob()).await,
        Err(ShareError::NotFound)
    ));
    assert!(matches!(
        service.approve_share_request(&token, &bob()).await,
        Err(ShareError::NotFound)
    ));

    assert_eq!(
        service.resolve_permission(BOB, CATEGORY).await.unwrap(),
        PermissionLevel::View
    );
}

#[tokio::test]
async fn self_share_is_rejected_without_a_row() {
    let (service, _) = world().await;

    let err = service
        .create_share_request(ALICE, CATEGORY, "a@example.com", "edit")
        .await
        .unwrap_err();
    assert!(matches!(err, ShareError::SelfShareRejected));
    assert!(service.list_requests(ALICE).await.unwrap().outgoing.is_empty());
}

#[tokio::test]
async fn cap_is_a_hard_limit() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref()).await;
    // Fill the category with five other grantees.
    for grantee in 10..15 {
        store
            .insert_grant(
                &Grant::new(GrantTarget::Category(CategoryId(10)), UserId(grantee), Permission::View, START),
                5,
            )
            .await
            .unwrap();
    }
    let service = ShareService::with_parts(
        store.clone(),
        ShareConfig::default(),
        Arc::new(ManualClock::new(START)),
        Arc::new(Silent),
    )
    .unwrap();

    let err = service
        .create_share_request(ALICE, CATEGORY, "b@example.com", "view")
        .await
        .unwrap_err();
    assert!(matches!(err, ShareError::GrantCapExceeded { limit: 5 }));
    assert_eq!(service.list_grantees(CATEGORY, ALICE).await.unwrap().len(), 5);
}

#[tokio::test]
async fn cap_race_surfaces_partial_success() {
    let (service, _) = world().await;
    let token = invite(&service, "b@example.com", "view").await;

    // Five grants land between invitation and approval.
    for grantee in 10..15 {
        service
            .store()
            .insert_grant(
                &Grant::new(GrantTarget::Category(CategoryId(10)), UserId(grantee), Permission::View, START),
                5,
            )
            .await
            .unwrap();
    }

    let outcome = service.approve_share_request(&token, &bob()).await.unwrap();
    assert!(matches!(
        outcome,
        ApproveOutcome::ApprovedWithoutGrant {
            reason: GrantFailure::CapExceeded { limit: 5 },
            ..
        }
    ));
    assert_eq!(outcome.request().status, RequestStatus::Approved);

    service.unshare(CATEGORY, UserId(10), ALICE).await.unwrap();
    let retried = service.retry_grant(outcome.request().id, &bob()).await.unwrap();
    assert!(retried.is_complete());
    assert_eq!(
        service.resolve_permission(BOB, TASK).await.unwrap(),
        PermissionLevel::View
    );
}

#[tokio::test]
async fn unshare_is_not_undone_by_retry() {
    let (service, _) = world().await;
    let token = invite(&service, "b@example.com", "edit").await;

    let outcome = service.approve_share_request(&token, &bob()).await.unwrap();
    assert!(outcome.is_complete());
    let id = outcome.request().id;
    assert_eq!(
        service.resolve_permission(BOB, CATEGORY).await.unwrap(),
        PermissionLevel::Edit
    );

    service.unshare(CATEGORY, BOB, ALICE).await.unwrap();

    let err = service.retry_grant(id, &bob()).await.unwrap_err();
    assert!(matches!(err, ShareError::GrantRevoked(revoked) if revoked == id));
    assert_eq!(
        service.resolve_permission(BOB, CATEGORY).await.unwrap(),
        PermissionLevel::None
    );
    assert_eq!(
        service.resolve_permission(BOB, TASK).await.unwrap(),
        PermissionLevel::None
    );

    // A fresh invitation still works.
    let token = invite(&service, "b@example.com", "view").await;
    assert!(service
        .approve_share_request(&token, &bob())
        .await
        .unwrap()
        .is_complete());
    assert_eq!(
        service.resolve_permission(BOB, CATEGORY).await.unwrap(),
        PermissionLevel::View
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_respect_the_cap() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("share.db")).unwrap());
    seed(store.as_ref()).await;
    let service = Arc::new(
        ShareService::with_parts(
            store,
            ShareConfig::default(),
            Arc::new(ManualClock::new(START)),
            Arc::new(Silent),
        )
        .unwrap(),
    );

    let mut invited = Vec::new();
    for n in 20..26 {
        let email = format!("u{}@example.com", n);
        service
            .store()
            .insert_user(&User::new(UserId(n), &email))
            .await
            .unwrap();
        let token = match service
            .create_share_request(ALICE, CATEGORY, &email, "view")
            .await
            .unwrap()
        {
            CreateResult::Created { token, .. } => token.expose().to_string(),
            other => panic!("expected a new request, got {:?}", other),
        };
        invited.push((ActingIdentity::new(UserId(n), &email), token));
    }

    let handles: Vec<_> = invited
        .into_iter()
        .map(|(acting, token)| {
            let service = service.clone();
            tokio::spawn(async move { service.approve_share_request(&token, &acting).await })
        })
        .collect();

    let mut complete = 0;
    let mut capped = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ApproveOutcome::Granted { .. } => complete += 1,
            ApproveOutcome::ApprovedWithoutGrant {
                reason: GrantFailure::CapExceeded { limit: 5 },
                ..
            } => capped += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!((complete, capped), (5, 1));
    assert_eq!(service.list_grantees(CATEGORY, ALICE).await.unwrap().len(), 5);
}

#[tokio::test]
async fn owner_keeps_edit_despite_stale_grant() {
    let (service, _) = world().await;
    service
        .store()
        .insert_grant(
            &Grant::new(GrantTarget::Category(CategoryId(10)), ALICE, Permission::View, START),
            5,
        )
        .await
        .unwrap();

    assert_eq!(
        service.resolve_permission(ALICE, TASK).await.unwrap(),
        PermissionLevel::Edit
    );
    assert!(service.can_delete(ALICE, TASK).await.unwrap());
}

#[tokio::test]
async fn legacy_global_grant_still_resolves() {
    let (service, _) = world().await;
    service
        .store()
        .insert_global_grant(
            &GlobalGrant {
                owner_id: ALICE,
                grantee_id: CAROL,
                permission: Permission::Edit,
                created_at: START,
            },
            5,
        )
        .await
        .unwrap();

    assert_eq!(
        service.resolve_permission(CAROL, TASK).await.unwrap(),
        PermissionLevel::Edit
    );
    assert!(!service.can_delete(CAROL, TASK).await.unwrap());

    // New requests can only target categories.
    let err = service
        .create_share_request(ALICE, TASK, "c@example.com", "view")
        .await
        .unwrap_err();
    assert!(matches!(err, ShareError::Validation(_)));
}

#[tokio::test]
async fn sqlite_backed_happy_path() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("share.db")).unwrap());
    seed(store.as_ref()).await;
    let service = ShareService::with_parts(
        store,
        ShareConfig::default(),
        Arc::new(ManualClock::new(START)),
        Arc::new(Silent),
    )
    .unwrap();

    let created = service
        .create_share_request(ALICE, CATEGORY, "B@example.com", "edit")
        .await
        .unwrap();
    let token = match &created {
        CreateResult::Created { token, .. } => token.expose().to_string(),
        other => panic!("expected a new request, got {:?}", other),
    };

    let again = service
        .create_share_request(ALICE, CATEGORY, "b@example.com", "edit")
        .await
        .unwrap();
    assert_eq!(again, CreateResult::AlreadyRequested { id: created.id() });

    assert!(service
        .approve_share_request(&token, &bob())
        .await
        .unwrap()
        .is_complete());
    assert_eq!(
        service.resolve_permission(BOB, TASK).await.unwrap(),
        PermissionLevel::Edit
    );

    let incoming = service.list_requests(BOB).await.unwrap().incoming;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].request.status, RequestStatus::Approved);
    assert!(!incoming[0].valid);
}
