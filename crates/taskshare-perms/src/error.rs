//! Error types for the permissions module.

use taskshare_core::ResourceRef;
use thiserror::Error;

/// Errors that can occur during permission resolution.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The resource does not exist, so there is no owner to resolve against.
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceRef),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] taskshare_store::StoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
