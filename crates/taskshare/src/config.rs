//! Sharing configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use taskshare_core::token::{DEFAULT_TOKEN_BYTES, MIN_TOKEN_BYTES};
use taskshare_core::{DAY_MS, DEFAULT_MAX_GRANTEES, DEFAULT_REQUEST_TTL_MS};

use crate::error::{Result, ShareError};

/// Configuration for the sharing service.
///
/// Every field has a default, so a partial JSON document is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// How long a request stays actionable after creation.
    pub request_ttl_ms: i64,
    /// Maximum simultaneous grantees per resource.
    pub max_grantees_per_resource: usize,
    /// Random bytes per token. Tokens are hex, so twice this many chars.
    pub token_bytes: usize,
    /// How many fresh tokens to try before giving up on a create.
    pub token_retry_limit: u32,
    /// How long responded or expired requests keep showing up in listings.
    pub recent_window_ms: i64,
    /// Whether the requester hears back after approve/reject.
    pub notify_on_response: bool,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            request_ttl_ms: DEFAULT_REQUEST_TTL_MS,
            max_grantees_per_resource: DEFAULT_MAX_GRANTEES,
            token_bytes: DEFAULT_TOKEN_BYTES,
            token_retry_limit: 5,
            recent_window_ms: 30 * DAY_MS,
            notify_on_response: true,
        }
    }
}

impl ShareConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ShareConfig =
            serde_json::from_str(json).map_err(|e| ShareError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ShareError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.request_ttl_ms <= 0 {
            return Err(ShareError::Config("request_ttl_ms must be positive".into()));
        }
        if self.max_grantees_per_resource == 0 {
            return Err(ShareError::Config(
                "max_grantees_per_resource must be at least 1".into(),
            ));
        }
        if self.token_bytes < MIN_TOKEN_BYTES {
            return Err(ShareError::Config(format!(
                "token_bytes must be at least {}",
                MIN_TOKEN_BYTES
            )));
        }
        if self.token_retry_limit == 0 {
            return Err(ShareError::Config("token_retry_limit must be at least 1".into()));
        }
        if self.recent_window_ms < 0 {
            return Err(ShareError::Config("recent_window_ms must not be negative".into()));
        }
        Ok(())
    }
}
