//! Access-token claims encoding.
//!
//! The signed payload is deliberately plain ASCII, `scope:user_id:issued_at`,
//! so a token can be audited with nothing but a Base64 decoder.

use chrono::{DateTime, TimeZone, Utc};

use crate::{AuthScope, UserInfo};

const FIELD_DELIMITER: char = ':';

/// Claims recovered from an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPayload {
    /// Identity the token was minted for.
    pub user: UserInfo,
    /// When the token was minted; the delegation time for revocation checks.
    pub issued_at: DateTime<Utc>,
}

impl TokenPayload {
    /// The uniform "no identity" result of a failed parse: anonymous user at
    /// the Unix epoch.
    pub fn anonymous() -> Self {
        Self {
            user: UserInfo::anonymous(),
            issued_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    /// True when this payload is the failed-parse sentinel shape.
    pub fn is_anonymous(&self) -> bool {
        self.user == UserInfo::anonymous()
    }
}

/// Render the signed claims string.
pub(crate) fn encode_claims(user: &UserInfo, issued_at: DateTime<Utc>) -> String {
    format!(
        "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
        user.scope() as i64,
        user.user_id(),
        issued_at.timestamp()
    )
}

/// Split and validate a claims string. Any malformation yields `None`.
pub(crate) fn decode_claims(payload: &str) -> Option<TokenPayload> {
    let mut parts = payload.split(FIELD_DELIMITER);
    let scope = parts.next()?;
    let user_id = parts.next()?;
    let issued_at = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let scope = AuthScope::from_wire(scope.parse::<i64>().ok()?)?;
    let user_id = user_id.parse::<u64>().ok()?;
    let issued_at = Utc
        .timestamp_opt(issued_at.parse::<i64>().ok()?, 0)
        .single()?;

    Some(TokenPayload {
        user: UserInfo::new(scope, user_id),
        issued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_encode_as_three_colon_fields() {
        let user = UserInfo::new(AuthScope::Manager, 7);
        let issued_at = Utc.timestamp_opt(1_450_000_000, 0).unwrap();
        assert_eq!(encode_claims(&user, issued_at), "3:7:1450000000");
    }

    #[test]
    fn claims_decode_round_trips() {
        let decoded = decode_claims("3:7:1450000000").unwrap();
        assert_eq!(decoded.user, UserInfo::new(AuthScope::Manager, 7));
        assert_eq!(decoded.issued_at.timestamp(), 1_450_000_000);
    }

    #[test]
    fn malformed_claims_are_rejected() {
        for payload in [
            "",
            "3:7",
            "3:7:1450000000:extra",
            "9:7:1450000000",
            "-1:7:1450000000",
            "3:-7:1450000000",
            "3:seven:1450000000",
            "3:7:later",
        ] {
            assert!(decode_claims(payload).is_none(), "accepted {payload:?}");
        }
    }

    #[test]
    fn anonymous_sentinel_shape() {
        let sentinel = TokenPayload::anonymous();
        assert!(sentinel.is_anonymous());
        assert_eq!(sentinel.user.user_id(), 0);
        assert_eq!(sentinel.issued_at.timestamp(), 0);
    }
}
