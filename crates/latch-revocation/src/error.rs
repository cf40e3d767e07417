//! Revocation error types.

use thiserror::Error;

use latch_provider::ConfigStoreError;

/// Errors from the revocation list.
#[derive(Error, Debug)]
pub enum RevocationError {
    /// Entry would expire immediately and can never block anything
    #[error("Revocation entry is already expired")]
    AlreadyExpired,

    /// The settings store rejected the persistence write
    #[error("Persisting revocation list failed: {0}")]
    Persistence(#[from] ConfigStoreError),
}

impl RevocationError {
    /// Stable identifier string for this error.
    pub fn code(&self) -> &'static str {
        match self {
            RevocationError::AlreadyExpired => "already_expired",
            RevocationError::Persistence(_) => "persistence_failed",
        }
    }
}
