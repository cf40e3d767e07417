//! Local-auth authority for the latch security core.
//!
//! This crate provides:
//! - The privilege scope ladder and user identity value types
//! - Self-contained HMAC-SHA256 access tokens (mint and verify, stateless)
//! - Custody of the device auth secrets and the TLS certificate fingerprint
//! - The scope gate used by command dispatch

mod error;
mod manager;
mod scope;
mod token;

pub use error::{AuthError, AuthResult};
pub use manager::AuthManager;
pub use scope::{ensure_access, AuthScope, UserInfo};
pub use token::TokenPayload;
