//! # Taskshare Permissions
//!
//! Effective-permission resolution for shared tasks and categories.
//!
//! ## Overview
//!
//! Access to another user's data can come from three grant mechanisms that
//! were added at different times: category grants, deprecated global
//! ("all my tasks") grants, and deprecated per-task grants. The resolver
//! checks ownership first and then each [`GrantSource`] in a fixed order.
//!
//! ## Key Types
//!
//! - [`PermissionResolver`] - Read-only resolver over a store
//! - [`GrantSource`] - One lookup strategy per grant mechanism
//! - [`Resolution`] - A level plus the [`PermissionSource`] that produced it
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskshare_core::{CategoryId, ResourceRef, UserId};
//! use taskshare_perms::PermissionResolver;
//! use taskshare_store::MemoryStore;
//!
//! async fn example() {
//!     let resolver = PermissionResolver::new(Arc::new(MemoryStore::new()));
//!     let level = resolver
//!         .resolve(UserId(2), ResourceRef::Category(CategoryId(10)))
//!         .await;
//! }
//! ```

pub mod error;
pub mod resolver;
pub mod source;

pub use error::{PermsError, Result};
pub use resolver::{PermissionResolver, PermissionSource, Resolution};
pub use source::GrantSource;
