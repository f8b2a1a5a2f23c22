//! Bearer token returned by every credential

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds before `expires_at` at which a token is already treated as expired
pub const EXPIRY_SKEW_SECS: u64 = 60;

/// Upper bound on a server-supplied `expires_in`
pub const MAX_EXPIRES_IN_SECS: u64 = 24 * 60 * 60;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Access token with its expiry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Unix timestamp when the token expires
    pub expires_at: u64,

    /// Refresh token, present for user flows that requested offline access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Token {
    /// Create a token with an absolute expiry
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_at: u64,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_at,
            refresh_token,
        }
    }

    /// Create a token from a relative `expires_in` as returned by token endpoints
    ///
    /// Lifetimes above [`MAX_EXPIRES_IN_SECS`] are clamped.
    pub fn expiring_in(
        access_token: impl Into<String>,
        token_type: Option<String>,
        expires_in: u64,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.unwrap_or_else(default_token_type),
            expires_at: now_secs().saturating_add(expires_in.min(MAX_EXPIRES_IN_SECS)),
            refresh_token,
        }
    }

    /// Check if the token is expired (with a 60 second buffer)
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_secs() + EXPIRY_SKEW_SECS >= self.expires_at
    }

    /// Value for the `Authorization` header
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Remaining validity, or `None` once the expiry has passed
    #[must_use]
    pub fn remaining_validity(&self) -> Option<Duration> {
        let now = now_secs();
        (self.expires_at > now).then(|| Duration::from_secs(self.expires_at - now))
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}
