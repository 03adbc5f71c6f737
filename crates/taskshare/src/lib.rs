//! # Taskshare
//!
//! Sharing and permission resolution for a personal task manager.
//!
//! ## Overview
//!
//! An owner invites another user to a category by email. The invitation is
//! a time-boxed, single-use share request identified by an unguessable
//! token. When the recipient approves, a grant is written; from then on the
//! permission resolver lets them view or edit the category and its tasks.
//!
//! - **Ledger**: creates, finds, and cancels share requests
//! - **Lifecycle**: approve/reject, grant materialization, grant retry
//! - **Resolver**: ownership, then category, global, and legacy task grants
//! - **Notifier**: best-effort delivery of invitations and responses
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskshare::{ActingIdentity, CreateResult, ShareConfig, ShareService};
//! use taskshare::core::{CategoryId, ResourceRef, UserId};
//! use taskshare::store::SqliteStore;
//!
//! async fn example() {
//!     let store = Arc::new(SqliteStore::open("taskshare.db").unwrap());
//!     let service = ShareService::new(store, ShareConfig::default()).unwrap();
//!
//!     // Alice (1) invites Bob to her category 10.
//!     let created = service
//!         .create_share_request(UserId(1), ResourceRef::Category(CategoryId(10)), "b@example.com", "view")
//!         .await
//!         .unwrap();
//!
//!     // Bob responds with the token from his invitation.
//!     if let CreateResult::Created { token, .. } = created {
//!         let bob = ActingIdentity::new(UserId(2), "b@example.com");
//!         let outcome = service.approve_share_request(token.expose(), &bob).await.unwrap();
//!         assert!(outcome.is_complete());
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `taskshare::core` - Ids, requests, grants, tokens, validation
//! - `taskshare::store` - Storage abstraction and SQLite
//! - `taskshare::perms` - Permission resolver

pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod service;

#[cfg(test)]
mod testing;

// Re-export component crates
pub use taskshare_core as core;
pub use taskshare_perms as perms;
pub use taskshare_store as store;

// Re-export main types for convenience
pub use config::ShareConfig;
pub use error::{Result, ShareError};
pub use ledger::{CreateOutcome, ShareLedger};
pub use lifecycle::{ActingIdentity, ApproveOutcome, GrantFailure, LifecycleEngine};
pub use notify::{Notifier, ShareNotice, TracingNotifier};
pub use service::{CreateResult, ListedRequest, RequestListing, ShareService};

// Re-export commonly used core types
pub use taskshare_core::{
    CategoryId, Permission, PermissionLevel, RequestId, RequestStatus, ResourceRef, ShareRequest,
    ShareScope, ShareToken, TaskId, UserId,
};
pub use taskshare_perms::{GrantSource, PermissionSource, Resolution};
