//! Error types for the sharing service.
//!
//! Display strings are shown to end users, so each one says what happened
//! in words a user can act on.

use taskshare_core::{RequestId, RequestStatus, ResourceRef, UserId, ValidationError};
use taskshare_perms::PermsError;
use taskshare_store::StoreError;
use thiserror::Error;

/// Errors that can occur during sharing operations.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Input failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// No registered user has the recipient email.
    #[error("no user is registered with that email address")]
    RecipientUnknown,

    /// The recipient email is the requester's own.
    #[error("you cannot share with yourself")]
    SelfShareRejected,

    /// The acting user id is not in the directory.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// Token missing, malformed, expired, or already responded to. The
    /// cases are deliberately indistinguishable.
    #[error("this invitation has expired or was already used")]
    NotFound,

    /// The caller is identified but not allowed to do this.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The request already left `pending`.
    #[error("this request was already {0}")]
    AlreadyResponded(RequestStatus),

    /// The request has not been approved, so there is no grant to retry.
    #[error("this request is {0}, not approved")]
    NotApproved(RequestStatus),

    /// No request with that id.
    #[error("share request {0} not found")]
    RequestNotFound(RequestId),

    /// The resource does not exist.
    #[error("{0} not found")]
    ResourceNotFound(ResourceRef),

    /// Only the owner may share, unshare, or list grantees.
    #[error("only the owner of {0} can manage its sharing")]
    NotOwner(ResourceRef),

    /// The grant from this request existed once and was removed by the
    /// owner. Access needs a new invitation.
    #[error("access from share request {0} was removed by the owner; ask for a new invitation")]
    GrantRevoked(RequestId),

    /// Nothing to unshare.
    #[error("that user does not have access to share from you")]
    GrantNotFound,

    /// The resource already has the maximum number of grantees.
    #[error("this is already shared with {limit} people, the maximum allowed")]
    GrantCapExceeded { limit: usize },

    /// Every generated token collided with an existing one.
    #[error("could not generate a unique invitation token after {attempts} attempts")]
    TokenExhausted { attempts: u32 },

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ShareError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ShareError::Store(e) if e.is_transient())
    }
}

impl From<PermsError> for ShareError {
    fn from(e: PermsError) -> Self {
        match e {
            PermsError::ResourceNotFound(resource) => ShareError::ResourceNotFound(resource),
            PermsError::Store(e) => ShareError::Store(e),
        }
    }
}

/// Result type for sharing operations.
pub type Result<T> = std::result::Result<T, ShareError>;
