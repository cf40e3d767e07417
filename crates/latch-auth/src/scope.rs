//! Privilege scopes and user identity.

use serde::{Deserialize, Serialize};

use crate::{AuthError, AuthResult};

/// Privilege level of a local caller, ordered from none to full control.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum AuthScope {
    /// No identity; carries no rights.
    #[default]
    None = 0,
    /// Read-only visibility.
    Viewer = 1,
    /// Ordinary command access.
    User = 2,
    /// Device management.
    Manager = 3,
    /// Full control, including security settings.
    Owner = 4,
}

impl AuthScope {
    /// All scopes, lowest privilege first.
    pub const ALL: [AuthScope; 5] = [
        AuthScope::None,
        AuthScope::Viewer,
        AuthScope::User,
        AuthScope::Manager,
        AuthScope::Owner,
    ];

    /// Decode the wire integer used inside access tokens.
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(AuthScope::None),
            1 => Some(AuthScope::Viewer),
            2 => Some(AuthScope::User),
            3 => Some(AuthScope::Manager),
            4 => Some(AuthScope::Owner),
            _ => None,
        }
    }
}

/// Identity of a local caller: a privilege scope plus an opaque user id.
///
/// `user_id` 0 means anonymous. Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UserInfo {
    scope: AuthScope,
    user_id: u64,
}

impl UserInfo {
    /// Identity with the given scope and user id.
    pub fn new(scope: AuthScope, user_id: u64) -> Self {
        Self { scope, user_id }
    }

    /// The "no identity" sentinel: scope `None`, user id 0.
    ///
    /// Every failed token parse collapses to this value.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Privilege scope.
    pub fn scope(&self) -> AuthScope {
        self.scope
    }

    /// Opaque 64-bit user identifier; 0 is anonymous.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }
}

/// Gate an operation on the caller's scope.
///
/// Command dispatch calls this before honoring any request tied to a role.
pub fn ensure_access(user: &UserInfo, required: AuthScope) -> AuthResult<()> {
    if user.scope() < required {
        return Err(AuthError::AccessDenied {
            requested: user.scope(),
            required,
        });
    }
    Ok(())
}
