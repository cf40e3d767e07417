//! Pairing configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{PairingError, PairingResult};

/// How a client proves physical access to the device during pairing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum PairingMode {
    /// Device displays or emits a fresh 4-digit pin.
    PinCode,
    /// Factory-burned secret printed on the device.
    EmbeddedCode,
    /// Ultrasonic code broadcast. Advertised for capability discovery only;
    /// no transport for it ships in this crate.
    Ultrasound32,
    /// Audible code broadcast. Advertised only, as above.
    Audible32,
}

/// Key-exchange algorithm negotiated for a pairing session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum CryptoType {
    /// Plaintext exchange. Only valid while security is disabled.
    None,
    /// Single-round SPAKE2, device on the responder side.
    Spake2,
}

/// Pairing policy for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Pairing modes clients may request.
    pub pairing_modes: BTreeSet<PairingMode>,
    /// Factory-burned pairing secret; empty iff embedded-code mode is off.
    #[serde(default)]
    pub embedded_code: String,
    /// Development backdoor: skip the throttle and allow plaintext crypto.
    /// Token MAC verification still runs.
    #[serde(default)]
    pub security_disabled: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            pairing_modes: BTreeSet::from([PairingMode::PinCode]),
            embedded_code: String::new(),
            security_disabled: false,
        }
    }
}

impl PairingConfig {
    /// Check internal consistency: the embedded code must be present exactly
    /// when embedded-code pairing is enabled.
    pub fn validate(&self) -> PairingResult<()> {
        let embedded_enabled = self.pairing_modes.contains(&PairingMode::EmbeddedCode);
        if embedded_enabled && self.embedded_code.is_empty() {
            return Err(PairingError::InvalidParams(
                "embedded-code pairing enabled without an embedded code".to_string(),
            ));
        }
        if !embedded_enabled && !self.embedded_code.is_empty() {
            return Err(PairingError::InvalidParams(
                "embedded code configured but embedded-code pairing disabled".to_string(),
            ));
        }
        Ok(())
    }
}
