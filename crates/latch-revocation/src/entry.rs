//! Revocation entries and their persisted form.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One revoked delegation.
///
/// Identifier fields are raw byte strings; empty means wildcard. Every token
/// whose issue time is before `revoked_at` is rejected for matching ids,
/// until the entry itself lapses at `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationEntry {
    /// User the revocation applies to; empty matches any user.
    pub user_id: Vec<u8>,
    /// App the revocation applies to; empty matches any app.
    pub app_id: Vec<u8>,
    /// Tokens issued before this instant are dead.
    pub revoked_at: DateTime<Utc>,
    /// When the entry itself stops mattering and may be purged.
    pub expires_at: DateTime<Utc>,
}

impl RevocationEntry {
    /// Entry revoking every delegation issued before `revoked_at`.
    pub fn wildcard(revoked_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id: Vec::new(),
            app_id: Vec::new(),
            revoked_at,
            expires_at,
        }
    }

    /// True when both id fields are wildcards.
    pub fn is_wildcard(&self) -> bool {
        self.user_id.is_empty() && self.app_id.is_empty()
    }

    /// True when this entry applies to `(user_id, app_id)`.
    pub fn matches(&self, user_id: &[u8], app_id: &[u8]) -> bool {
        (self.user_id.is_empty() || self.user_id == user_id)
            && (self.app_id.is_empty() || self.app_id == app_id)
    }
}

/// Wire shape of one entry inside the persisted `"black_list"` array.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    user: String,
    app: String,
    revocation: i64,
    expiration: i64,
}

impl From<&RevocationEntry> for StoredEntry {
    fn from(entry: &RevocationEntry) -> Self {
        Self {
            user: BASE64.encode(&entry.user_id),
            app: BASE64.encode(&entry.app_id),
            revocation: entry.revoked_at.timestamp(),
            expiration: entry.expires_at.timestamp(),
        }
    }
}

impl StoredEntry {
    /// Decode to the in-memory form; `None` for undecodable fields.
    pub(crate) fn decode(&self) -> Option<RevocationEntry> {
        Some(RevocationEntry {
            user_id: BASE64.decode(&self.user).ok()?,
            app_id: BASE64.decode(&self.app).ok()?,
            revoked_at: Utc.timestamp_opt(self.revocation, 0).single()?,
            expires_at: Utc.timestamp_opt(self.expiration, 0).single()?,
        })
    }
}
