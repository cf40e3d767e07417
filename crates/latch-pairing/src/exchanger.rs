//! Key-exchanger variants for pairing sessions.
//!
//! One uniform contract over two implementations: the real SPAKE2 exchange
//! and a plaintext echo used only when security is disabled.

use spake2::{Ed25519Group, Identity, Password, Spake2};

use crate::{PairingError, PairingResult};

/// Identity string for the client (initiator) side of the exchange. Client
/// implementations must pass the same identities in the same order.
pub const CLIENT_IDENTITY: &[u8] = b"latch-pairing-client";
/// Identity string for the device (responder) side of the exchange.
pub const DEVICE_IDENTITY: &[u8] = b"latch-pairing-device";

/// Cryptographic state of one pairing session.
///
/// Owned by exactly one session table entry and destroyed with it.
pub enum KeyExchanger {
    /// SPAKE2 over the pairing code; the device is the responder.
    Spake(SpakeExchanger),
    /// Plaintext echo of the pairing code. Security-disabled builds only.
    Insecure(InsecureExchanger),
}

impl KeyExchanger {
    /// SPAKE2 exchanger seeded with the pairing code.
    pub fn spake(code: &str) -> Self {
        KeyExchanger::Spake(SpakeExchanger::new(code))
    }

    /// Plaintext exchanger echoing the pairing code.
    pub fn insecure(code: &str) -> Self {
        KeyExchanger::Insecure(InsecureExchanger {
            code: code.as_bytes().to_vec(),
        })
    }

    /// The device's first (and only) protocol message.
    pub fn first_message(&self) -> &[u8] {
        match self {
            KeyExchanger::Spake(spake) => &spake.message,
            KeyExchanger::Insecure(insecure) => &insecure.code,
        }
    }

    /// Consume the peer's message and derive the shared key.
    ///
    /// Single-round: a second call is an error. A wrong pairing code does not
    /// fail here; it yields a different key on each side, caught later at
    /// the pairing-code MAC check.
    pub fn process_peer(&mut self, message: &[u8]) -> PairingResult<&[u8]> {
        match self {
            KeyExchanger::Spake(spake) => spake.process_peer(message),
            KeyExchanger::Insecure(insecure) => Ok(&insecure.code),
        }
    }

    /// Shared key, once [`Self::process_peer`] has succeeded.
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            KeyExchanger::Spake(spake) => spake.key.as_deref(),
            KeyExchanger::Insecure(insecure) => Some(&insecure.code),
        }
    }
}

/// Device side of a single-round SPAKE2 exchange.
pub struct SpakeExchanger {
    state: Option<Spake2<Ed25519Group>>,
    message: Vec<u8>,
    key: Option<Vec<u8>>,
}

impl SpakeExchanger {
    fn new(code: &str) -> Self {
        let (state, message) = Spake2::<Ed25519Group>::start_b(
            &Password::new(code.as_bytes()),
            &Identity::new(CLIENT_IDENTITY),
            &Identity::new(DEVICE_IDENTITY),
        );
        Self {
            state: Some(state),
            message,
            key: None,
        }
    }

    fn process_peer(&mut self, message: &[u8]) -> PairingResult<&[u8]> {
        let state = self.state.take().ok_or_else(|| {
            PairingError::InvalidClientCommitment("commitment already processed".to_string())
        })?;
        let key = state
            .finish(message)
            .map_err(|err| PairingError::InvalidClientCommitment(err.to_string()))?;
        let key = self.key.insert(key);
        Ok(&key[..])
    }
}

/// Plaintext stand-in: the code is the message and the key.
pub struct InsecureExchanger {
    code: Vec<u8>,
}
