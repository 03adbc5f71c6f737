//! Shared setup for unit tests in this crate.
//!
//! A trimmed copy of `taskshare_testkit::fixtures`: the same ids, emails and
//! start time, so unit and integration tests describe the same world. Change
//! both together.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskshare_core::{Category, CategoryId, ManualClock, Task, TaskId, User, UserId};
use taskshare_store::{MemoryStore, Store};

use crate::notify::{Notifier, ShareNotice};

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);
pub const CAROL: UserId = UserId(3);
pub const WORK: CategoryId = CategoryId(10);
pub const PLAN: TaskId = TaskId(100);

pub const START: i64 = 1_700_000_000_000;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Alice owns category WORK holding task PLAN; Bob and Carol are
    /// registered users.
    pub async fn seeded() -> Self {
        let store = Arc::new(MemoryStore::new());
        for (id, email) in [
            (ALICE, "a@example.com"),
            (BOB, "b@example.com"),
            (CAROL, "c@example.com"),
        ] {
            store.insert_user(&User::new(id, email)).await.unwrap();
        }
        store
            .upsert_category(&Category {
                id: WORK,
                owner_id: ALICE,
                name: "work".into(),
            })
            .await
            .unwrap();
        store
            .upsert_task(&Task {
                id: PLAN,
                owner_id: ALICE,
                category_id: Some(WORK),
                title: "quarterly plan".into(),
            })
            .await
            .unwrap();

        Self {
            store,
            clock: Arc::new(ManualClock::new(START)),
        }
    }
}

/// Records every notice.
///
/// Same surface as `taskshare_testkit::fixtures::RecordingNotifier`, which
/// this crate's unit tests cannot depend on.
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

    pub fn sent(&self) -> Vec<(UserId, ShareNotice)> {
        self.sent.lock().unwrap().clone()
    }

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
        self.sent.lock().unwrap().push((recipient.id, notice.clone()));
        !self.fail
    }
}
