//! Share tokens.
//!
//! A token is an opaque, URL-safe bearer credential: lowercase hex of random
//! bytes from the OS-seeded thread RNG. Tokens are never printed in full;
//! `Debug` and `Display` show a blake3 fingerprint instead.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Minimum number of random bytes in a token (40 hex chars).
pub const MIN_TOKEN_BYTES: usize = 20;

/// Default number of random bytes in a token (64 hex chars).
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Opaque share request token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken(String);

impl ShareToken {
    /// Generate a fresh token from `bytes` random bytes.
    ///
    /// `bytes` is clamped to at least [`MIN_TOKEN_BYTES`].
    pub fn generate(bytes: usize) -> Self {
        let mut buf = vec![0u8; bytes.max(MIN_TOKEN_BYTES)];
        rand::thread_rng().fill_bytes(&mut buf);
        Self(hex::encode(buf))
    }

    /// Wrap a token received from a caller (e.g. a link parameter).
    ///
    /// Rejects anything that could not have been produced by [`generate`],
    /// so garbage never reaches the store.
    ///
    /// [`generate`]: ShareToken::generate
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        let well_formed = raw.len() >= MIN_TOKEN_BYTES * 2
            && raw.len() % 2 == 0
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::MalformedToken)
        }
    }

    /// Wrap a value read back from storage without re-validating it.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// The full secret. Only hand this to the notifier or the store.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short, non-reversible identifier safe to log.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(self.0.as_bytes());
        hash.to_hex()[..12].to_string()
    }
}

impl fmt::Debug for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShareToken(#{})", self.fingerprint())
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.fingerprint())
    }
}
