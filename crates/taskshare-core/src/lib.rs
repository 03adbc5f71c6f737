//! # Taskshare Core
//!
//! Pure primitives for the taskshare sharing subsystem: identities, resources,
//! share requests, grants, and tokens.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! plain data plus the rules that can be checked without a store.
//!
//! ## Key Types
//!
//! - [`ShareRequest`] - A time-boxed, tokenized proposal to create a grant
//! - [`Grant`] / [`GlobalGrant`] - Persisted sharing relationships
//! - [`ResourceRef`] - A task or category an actor wants to access
//! - [`ShareScope`] - What a share request targets (category, or a legacy scope)
//! - [`PermissionLevel`] - The resolved access level (`none`, `view`, `edit`)
//! - [`ShareToken`] - Opaque bearer credential carried by a request
//! - [`Clock`] - Time source, swappable in tests
//!
//! ## Time
//!
//! All timestamps are Unix milliseconds ([`Timestamp`]).

pub mod clock;
pub mod error;
pub mod grant;
pub mod permission;
pub mod request;
pub mod resource;
pub mod token;
pub mod types;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, ValidationError};
pub use grant::{GlobalGrant, Grant, GrantTarget};
pub use permission::{Permission, PermissionLevel};
pub use request::{NewShareRequest, RequestStatus, ShareRequest};
pub use resource::{Category, ResourceRef, ShareScope, Task, User};
pub use token::ShareToken;
pub use types::{CategoryId, RequestId, TaskId, Timestamp, UserId};
pub use validation::{normalize_email, validate_email};

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Default lifetime of a share request: seven days.
pub const DEFAULT_REQUEST_TTL_MS: i64 = 7 * DAY_MS;

/// Default maximum number of simultaneous grantees per resource.
pub const DEFAULT_MAX_GRANTEES: usize = 5;
