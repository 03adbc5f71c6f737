//! # Taskshare Store
//!
//! Storage abstraction for task sharing. Provides a trait-based interface
//! for the share request ledger, the grant store, and the slice of the
//! user/category/task directory that sharing reads.
//!
//! ## Overview
//!
//! The [`Store`] trait keeps the ledger and the resolver storage-agnostic.
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! testing. Both enforce the same uniqueness rules and the grantee cap.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`RequestInsert`] - Result of inserting a share request
//! - [`Transition`] - Result of a compare-and-set status change
//! - [`GrantInsert`] - Result of inserting a grant
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskshare_store::{SqliteStore, Store};
//! use taskshare_core::{User, UserId};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("taskshare.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     store.insert_user(&User::new(UserId(1), "a@example.com")).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **One pending request per tuple**: a second request for the same
//!   requester, scope, and recipient returns `Duplicate`
//! - **Idempotent grants**: granting twice returns `AlreadyExists`
//! - **Atomic cap**: the grantee count is checked inside the insert transaction
//! - **Append-only ledger**: request rows change status but are never deleted

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{GrantInsert, RequestInsert, ResourceFacts, Store, StoreExt, Transition};
