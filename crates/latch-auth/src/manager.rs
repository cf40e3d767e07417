//! HMAC authority: key custody, token mint/verify, certificate fingerprint.

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use latch_provider::Clock;

use crate::token::{decode_claims, encode_claims};
use crate::{TokenPayload, UserInfo};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 output length; also the MAC prefix length of a raw token.
const MAC_LEN: usize = 32;

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Authority over the device's symmetric auth secrets.
///
/// Tokens are self-contained: the MAC plus the claims travel together, so
/// verification is stateless and survives restarts with no session table.
pub struct AuthManager {
    auth_key: [u8; 32],
    certificate_key: [u8; 32],
    certificate_fingerprint: Vec<u8>,
    delegation_certificate: Mutex<Option<Vec<u8>>>,
    clock: Arc<dyn Clock>,
}

impl AuthManager {
    /// Take custody of the two device secrets and fingerprint the TLS
    /// certificate the transport layer serves.
    pub fn new(
        auth_secret: [u8; 32],
        certificate_secret: [u8; 32],
        certificate: &[u8],
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auth_key: auth_secret,
            certificate_key: certificate_secret,
            certificate_fingerprint: Sha256::digest(certificate).to_vec(),
            delegation_certificate: Mutex::new(None),
            clock,
        }
    }

    /// Mint the raw (unencoded) access token for `user` at `issued_at`.
    ///
    /// `issued_at` is caller-supplied so callers driving a fake clock get
    /// byte-identical tokens.
    pub fn create_access_token(&self, user: &UserInfo, issued_at: DateTime<Utc>) -> Vec<u8> {
        let claims = encode_claims(user, issued_at);
        let mac = hmac_sha256(&self.auth_key, claims.as_bytes());
        let mut token = Vec::with_capacity(MAC_LEN + claims.len());
        token.extend_from_slice(&mac);
        token.extend_from_slice(claims.as_bytes());
        token
    }

    /// Mint the wire-form (Base64) access token for `user` at `issued_at`.
    pub fn create_access_token_b64(&self, user: &UserInfo, issued_at: DateTime<Utc>) -> String {
        BASE64.encode(self.create_access_token(user, issued_at))
    }

    /// Mint a raw access token stamped with the injected clock's now.
    pub fn create_access_token_now(&self, user: &UserInfo) -> Vec<u8> {
        self.create_access_token(user, self.clock.now())
    }

    /// Verify and decode a raw access token.
    ///
    /// Total: every failure (short input, MAC mismatch, non-UTF-8 claims,
    /// wrong field count, out-of-range numbers) collapses to the anonymous
    /// sentinel payload, so callers cannot distinguish why a token died.
    pub fn parse_access_token(&self, token: &[u8]) -> TokenPayload {
        if token.len() <= MAC_LEN {
            return TokenPayload::anonymous();
        }
        let (mac, claims) = token.split_at(MAC_LEN);
        let expected = hmac_sha256(&self.auth_key, claims);
        if !bool::from(mac.ct_eq(&expected)) {
            debug!("access token rejected: MAC mismatch");
            return TokenPayload::anonymous();
        }
        let claims = match std::str::from_utf8(claims) {
            Ok(claims) => claims,
            Err(_) => return TokenPayload::anonymous(),
        };
        match decode_claims(claims) {
            Some(payload) => payload,
            None => {
                debug!("access token rejected: malformed claims");
                TokenPayload::anonymous()
            }
        }
    }

    /// Verify and decode a wire-form (Base64) access token.
    pub fn parse_access_token_b64(&self, token: &str) -> TokenPayload {
        match BASE64.decode(token) {
            Ok(raw) => self.parse_access_token(&raw),
            Err(_) => TokenPayload::anonymous(),
        }
    }

    /// SHA-256 fingerprint of the device TLS certificate.
    ///
    /// This is the value the device signs with the pairing key so clients can
    /// pin the transport they reached to the pairing they completed.
    pub fn certificate_fingerprint(&self) -> &[u8] {
        &self.certificate_fingerprint
    }

    /// MAC over a delegation blob with the certificate secret.
    pub fn sign_delegation(&self, blob: &[u8]) -> Vec<u8> {
        hmac_sha256(&self.certificate_key, blob).to_vec()
    }

    /// Constant-time check that `mac` signs `blob` under the certificate
    /// secret.
    pub fn is_valid_delegation(&self, blob: &[u8], mac: &[u8]) -> bool {
        let expected = hmac_sha256(&self.certificate_key, blob);
        bool::from(mac.ct_eq(&expected))
    }

    /// Replace the opaque delegation certificate, if any.
    pub fn set_delegation_certificate(&self, certificate: Option<Vec<u8>>) {
        *self.delegation_certificate.lock().unwrap() = certificate;
    }

    /// Current delegation certificate, if one has been installed.
    pub fn delegation_certificate(&self) -> Option<Vec<u8>> {
        self.delegation_certificate.lock().unwrap().clone()
    }
}
