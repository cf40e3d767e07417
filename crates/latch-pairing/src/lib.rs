//! Pairing engine for the latch security core.
//!
//! Runs the password-authenticated key exchange with local clients, owns the
//! pending/confirmed session tables and their expiry timers, throttles
//! brute-force pairing attempts, and fronts token mint/parse for paired
//! callers.

mod config;
mod error;
mod exchanger;
mod manager;
mod throttle;

pub use config::{CryptoType, PairingConfig, PairingMode};
pub use error::{PairingError, PairingResult};
pub use exchanger::{
    InsecureExchanger, KeyExchanger, SpakeExchanger, CLIENT_IDENTITY, DEVICE_IDENTITY,
};
pub use manager::{
    ConfirmPairingResponse, PairingManager, SessionEndedCallback, SessionStartedCallback,
    StartPairingResponse,
};
pub use throttle::PairingThrottle;
