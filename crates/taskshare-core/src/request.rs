//! Share requests.
//!
//! A [`ShareRequest`] is a time-boxed, single-use proposal to create a grant.
//! Rows are never deleted: responded and expired requests stay behind for
//! audit and duplicate-suppression history.
//!
//! ## State machine
//!
//! ```text
//!            approve
//!   pending ─────────► approved
//!      │  \  reject
//!      │   ──────────► rejected
//!      │ cancel
//!      ├─────────────► cancelled
//!      │ re-requested after expiry
//!      └─────────────► expired
//! ```
//!
//! Every transition starts from `pending` and is irreversible. `expired` is
//! only written by the store, when a new request for the same tuple replaces
//! a pending row whose time ran out.
//!
//! An approved request also records `granted_at` once its grant exists, so
//! a grant the owner later removes is never recreated from the same request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::permission::Permission;
use crate::resource::ShareScope;
use crate::token::ShareToken;
use crate::types::{RequestId, Timestamp, UserId};

/// Lifecycle status of a share request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    /// Terminal states accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        self == RequestStatus::Pending && next.is_terminal()
    }
}

impl FromStr for RequestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "expired" => Ok(RequestStatus::Expired),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted share request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRequest {
    pub id: RequestId,
    pub requester_id: UserId,
    pub scope: ShareScope,
    /// Normalized recipient email.
    pub recipient_email: String,
    pub token: ShareToken,
    pub permission: Permission,
    pub status: RequestStatus,
    pub expires_at: Timestamp,
    pub responded_at: Option<Timestamp>,
    pub created_at: Timestamp,
    /// When the grant for this request was first in place.
    pub granted_at: Option<Timestamp>,
}

impl ShareRequest {
    /// A request is actionable iff it is pending and not yet expired.
    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.status == RequestStatus::Pending && now < self.expires_at
    }

    /// Pending on paper but past its expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.status == RequestStatus::Pending && now >= self.expires_at
    }

    /// Whether this request was addressed to `email` (compared normalized).
    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.recipient_email == crate::validation::normalize_email(email)
    }
}

/// A request about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShareRequest {
    pub requester_id: UserId,
    pub scope: ShareScope,
    pub recipient_email: String,
    pub token: ShareToken,
    pub permission: Permission,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl NewShareRequest {
    /// Build a pending request expiring `ttl_ms` after `created_at`.
    pub fn new(
        requester_id: UserId,
        scope: ShareScope,
        recipient_email: &str,
        token: ShareToken,
        permission: Permission,
        created_at: Timestamp,
        ttl_ms: i64,
    ) -> Self {
        Self {
            requester_id,
            scope,
            recipient_email: crate::validation::normalize_email(recipient_email),
            token,
            permission,
            created_at,
            expires_at: created_at.saturating_add(ttl_ms),
        }
    }

    /// Materialize as a stored row with the given id.
    pub fn into_request(self, id: RequestId) -> ShareRequest {
        ShareRequest {
            id,
            requester_id: self.requester_id,
            scope: self.scope,
            recipient_email: self.recipient_email,
            token: self.token,
            permission: self.permission,
            status: RequestStatus::Pending,
            expires_at: self.expires_at,
            responded_at: None,
            created_at: self.created_at,
            granted_at: None,
        }
    }
}
