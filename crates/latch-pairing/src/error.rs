//! Pairing error types.

use thiserror::Error;

/// Errors from the pairing engine.
#[derive(Error, Debug)]
pub enum PairingError {
    /// Request names a mode or crypto the device is not configured for
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Pairing throttle is armed; retry after the block expires
    #[error("Too many pairing attempts")]
    DeviceBusy,

    /// Session id matches no live session
    #[error("Unknown session id: '{0}'")]
    UnknownSession(String),

    /// Client commitment was not valid Base64; the session has been closed
    #[error("Invalid commitment string: '{0}'")]
    InvalidFormat(String),

    /// Key exchange rejected the peer message; the session has been closed
    #[error("Pairing code or crypto implementation mismatch")]
    CommitmentMismatch {
        /// The exchanger's rejection.
        #[source]
        source: Box<PairingError>,
    },

    /// Peer message could not be processed by the key exchanger
    #[error("Invalid client commitment: {0}")]
    InvalidClientCommitment(String),
}

impl PairingError {
    /// Stable identifier string for this error.
    pub fn code(&self) -> &'static str {
        match self {
            PairingError::InvalidParams(_) => "invalidParams",
            PairingError::DeviceBusy => "deviceBusy",
            PairingError::UnknownSession(_) => "unknownSession",
            PairingError::InvalidFormat(_) => "invalidFormat",
            PairingError::CommitmentMismatch { .. } => "commitmentMismatch",
            PairingError::InvalidClientCommitment(_) => "invalidClientCommitment",
        }
    }
}

/// Result type alias using PairingError.
pub type PairingResult<T> = Result<T, PairingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PairingError::DeviceBusy.code(), "deviceBusy");
        assert_eq!(
            PairingError::UnknownSession("s".into()).code(),
            "unknownSession"
        );
        assert_eq!(
            PairingError::InvalidFormat("x".into()).code(),
            "invalidFormat"
        );
    }

    #[test]
    fn mismatch_carries_the_exchanger_rejection() {
        let err = PairingError::CommitmentMismatch {
            source: Box::new(PairingError::InvalidClientCommitment("bad point".into())),
        };
        assert_eq!(err.code(), "commitmentMismatch");
        let source = err.source().expect("source attached");
        assert!(source.to_string().contains("bad point"));
    }
}
