//! Error types for taskshare core.

use thiserror::Error;

/// Errors decoding core values from their stored or wire form.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("unknown request status: {0}")]
    UnknownStatus(String),

    #[error("unknown share scope: {0}")]
    UnknownScope(String),

    #[error("share scope {scope} requires a resource id")]
    MissingResourceId { scope: &'static str },

    #[error("malformed share token")]
    MalformedToken,
}

/// Validation errors for user-supplied share input.
///
/// These are rejected synchronously and never persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("email address is empty")]
    EmptyEmail,

    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("'{0}' is not a valid permission (expected 'view' or 'edit')")]
    InvalidPermission(String),

    #[error("{0} shares can no longer be requested; share a category instead")]
    LegacyScope(&'static str),
}
