//! Test fixtures and helpers.
//!
//! Common setup code for integration and property tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskshare::{
    ActingIdentity, CreateResult, Notifier, ShareConfig, ShareError, ShareNotice, ShareService,
};
use taskshare_core::{
    Category, CategoryId, ManualClock, ResourceRef, Task, TaskId, User, UserId,
};
use taskshare_store::{MemoryStore, Store};

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);
pub const CAROL: UserId = UserId(3);

pub const ALICE_EMAIL: &str = "a@example.com";
pub const BOB_EMAIL: &str = "b@example.com";
pub const CAROL_EMAIL: &str = "c@example.com";

/// Alice's category.
pub const WORK: CategoryId = CategoryId(10);
/// A task in [`WORK`].
pub const PLAN: TaskId = TaskId(100);
/// An uncategorized task of Alice's.
pub const ERRAND: TaskId = TaskId(101);

/// Fixed start time for the manual clock.
pub const START: i64 = 1_700_000_000_000;

/// A seeded memory store, a manual clock, a recording notifier, and a
/// service wired to all three.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: ShareService<MemoryStore>,
}

impl TestFixture {
    /// Seeded fixture with the default config.
    pub async fn seeded() -> Result<Self, ShareError> {
        Self::with_config(ShareConfig::default()).await
    }

    /// Seeded fixture with a custom config.
    ///
    /// Alice owns [`WORK`] holding [`PLAN`], plus the uncategorized
    /// [`ERRAND`]. Bob and Carol are registered with no access.
    pub async fn with_config(config: ShareConfig) -> Result<Self, ShareError> {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref()).await?;

        let clock = Arc::new(ManualClock::new(START));
        let notifier = Arc::new(RecordingNotifier::new());
        let service =
            ShareService::with_parts(store.clone(), config, clock.clone(), notifier.clone())?;

        Ok(Self {
            store,
            clock,
            notifier,
            service,
        })
    }

    /// Register another user.
    pub async fn add_user(&self, id: UserId, email: &str) -> Result<User, ShareError> {
        let user = User::new(id, email);
        self.store.insert_user(&user).await?;
        Ok(user)
    }

    /// Alice invites `email` to [`WORK`] and returns the token, reusing the
    /// pending request if there is one.
    pub async fn invite(&self, email: &str, permission: &str) -> Result<String, ShareError> {
        match self
            .service
            .create_share_request(ALICE, ResourceRef::Category(WORK), email, permission)
            .await?
        {
            CreateResult::Created { token, .. } => Ok(token.expose().to_string()),
            CreateResult::AlreadyRequested { id } => {
                let request = self
                    .store
                    .get_request(id)
                    .await?
                    .ok_or(ShareError::RequestNotFound(id))?;
                Ok(request.token.expose().to_string())
            }
        }
    }
}

/// Identity for one of the seeded users.
pub fn acting(user: UserId) -> ActingIdentity {
    let email = match user {
        ALICE => ALICE_EMAIL,
        BOB => BOB_EMAIL,
        CAROL => CAROL_EMAIL,
        _ => "unknown@example.com",
    };
    ActingIdentity::new(user, email)
}

/// Write the standard users, category, and tasks into `store`.
pub async fn seed<S: Store + ?Sized>(store: &S) -> taskshare_store::Result<()> {
    for (id, email) in [(ALICE, ALICE_EMAIL), (BOB, BOB_EMAIL), (CAROL, CAROL_EMAIL)] {
        store.insert_user(&User::new(id, email)).await?;
    }
    store
        .upsert_category(&Category {
            id: WORK,
            owner_id: ALICE,
            name: "work".into(),
        })
        .await?;
    store
        .upsert_task(&Task {
            id: PLAN,
            owner_id: ALICE,
            category_id: Some(WORK),
            title: "quarterly plan".into(),
        })
        .await?;
    store
        .upsert_task(&Task {
            id: ERRAND,
            owner_id: ALICE,
            category_id: None,
            title: "pick up parcel".into(),
        })
        .await?;
    Ok(())
}

/// A notifier that records every notice.
///
/// Delivery succeeds unless [`RecordingNotifier::failing`] was used.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<(UserId, ShareNotice)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<(UserId, ShareNotice)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// `(recipient, kind)` pairs, in order.
    pub fn kinds(&self) -> Vec<(UserId, &'static str)> {
        self.sent()
            .iter()
            .map(|(user, notice)| (*user, notice.kind()))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &User, notice: &ShareNotice) -> bool {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient.id, notice.clone()));
        }
        !self.fail
    }
}
