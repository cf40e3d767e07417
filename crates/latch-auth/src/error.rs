//! Auth error types.

use thiserror::Error;

/// Errors from the auth authority.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Caller's scope is below what the operation requires
    #[error("Access denied: {requested:?} requires {required:?}")]
    AccessDenied {
        /// Scope the caller holds.
        requested: crate::AuthScope,
        /// Scope the operation requires.
        required: crate::AuthScope,
    },
}

impl AuthError {
    /// Stable identifier string for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AccessDenied { .. } => "access_denied",
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
