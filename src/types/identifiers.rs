//! Validated newtypes for tenants and scopes

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

use crate::error::{AuthError, Result};

// ============================================================================
// Tenant
// ============================================================================

/// Directory (tenant) identifier
///
/// Accepts a GUID, a domain name such as `contoso.onmicrosoft.com`, or one of
/// the well-known aliases (`common`, `organizations`, `consumers`). Only ASCII
/// alphanumerics, `.` and `-` are allowed, so the value can be spliced into an
/// authority URL path without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a validated tenant ID
    ///
    /// # Errors
    /// Returns `AuthError::Validation` for empty input or characters outside
    /// `[A-Za-z0-9.-]`.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::check(&id)?;
        Ok(Self(id))
    }

    fn check(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(AuthError::validation("tenant_id must not be empty"));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-'))
        {
            return Err(AuthError::validation(format!(
                "tenant_id '{id}' contains invalid character {bad:?}; only alphanumerics, '.' and '-' are allowed"
            )));
        }
        Ok(())
    }

    /// Get the tenant ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for TenantId {
    type Error = AuthError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for TenantId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for TenantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Scope requested for offline access (refresh tokens)
pub const OFFLINE_ACCESS: &str = "offline_access";

/// A single OAuth 2.0 scope token, e.g. `https://management.azure.com/.default`
///
/// Follows the RFC 6749 `scope-token` grammar: one or more printable ASCII
/// characters excluding space, `"` and `\`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);

impl Scope {
    /// Create a validated scope
    ///
    /// # Errors
    /// Returns `AuthError::Validation` for empty input, whitespace, or
    /// characters outside the scope-token grammar.
    pub fn new(scope: impl Into<String>) -> Result<Self> {
        let scope = scope.into();
        Self::check(&scope)?;
        Ok(Self(scope))
    }

    fn check(scope: &str) -> Result<()> {
        if scope.is_empty() {
            return Err(AuthError::validation("scope must not be empty"));
        }
        if scope.chars().any(char::is_whitespace) {
            return Err(AuthError::validation(format!(
                "scope '{scope}' must not contain whitespace"
            )));
        }
        if let Some(bad) = scope
            .chars()
            .find(|c| !c.is_ascii_graphic() || *c == '"' || *c == '\\')
        {
            return Err(AuthError::validation(format!(
                "scope '{scope}' contains invalid character {bad:?}"
            )));
        }
        Ok(())
    }

    /// Get the scope as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Space-delimited scope parameter for a token request
    ///
    /// Appends `offline_access` when a refresh token is wanted.
    #[must_use]
    pub fn request_string(&self, offline: bool) -> String {
        if offline && self.0 != OFFLINE_ACCESS {
            format!("{} {OFFLINE_ACCESS}", self.0)
        } else {
            self.0.clone()
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Scope {
    type Error = AuthError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Scope {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for Scope {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
