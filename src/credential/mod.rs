//! Credentials: polymorphic sources of bearer tokens
//!
//! Every credential implements [`Credential`]. The two user-facing flows,
//! [`DeviceCodeCredential`] and [`AuthCodeCredential`], also implement
//! [`InteractiveCredential`] and refuse to be built outside an interactive
//! session.
//!
//! | Name | Type | Interactive |
//! |------|------|-------------|
//! | `client_secret` | [`ClientSecretCredential`] | no |
//! | `azure_cli` | [`AzureCliCredential`] | no |
//! | `auth_code` | [`AuthCodeCredential`] | yes |
//! | `device_code` | [`DeviceCodeCredential`] | yes |
//! | `default` | [`DefaultCredential`] | no |

mod auth_code;
mod azure_cli;
mod client_secret;
mod default;
mod device_code;
mod params;

pub use auth_code::{AuthCodeCredential, CALLBACK_TIMEOUT, UrlOpener};
pub use azure_cli::{AzureCliCredential, parse_cli_token, parse_expires_on};
pub use client_secret::ClientSecretCredential;
pub use default::DefaultCredential;
pub use device_code::DeviceCodeCredential;
pub use params::{CredentialParams, ResolvedParams};

use async_trait::async_trait;
use reqwest::RequestBuilder;
use reqwest::header::AUTHORIZATION;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheKey, TokenCache};
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::oauth::{Endpoints, OAuthClient};
use crate::types::{Scope, TenantId, Token};

/// The credential variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// OAuth client credentials grant with a client secret
    ClientSecret,
    /// Token from the Azure CLI
    AzureCli,
    /// Authorization code flow through the browser
    AuthCode,
    /// Device code flow
    DeviceCode,
    /// Lazily resolved default chain
    Default,
}

impl CredentialKind {
    /// Name used in credential chains and error messages
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ClientSecret => "client_secret",
            Self::AzureCli => "azure_cli",
            Self::AuthCode => "auth_code",
            Self::DeviceCode => "device_code",
            Self::Default => "default",
        }
    }

    /// Whether credentials of this kind prompt the user
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        matches!(self, Self::AuthCode | Self::DeviceCode)
    }

    /// Construct a credential of this kind
    ///
    /// # Errors
    ///
    /// Returns whatever the variant's constructor rejects: `Validation` for
    /// malformed parameters, `CliNotFound`, or `NonInteractiveSession`.
    pub fn build(self, params: &CredentialParams, config: &Config) -> Result<Arc<dyn Credential>> {
        Ok(match self {
            Self::ClientSecret => Arc::new(ClientSecretCredential::new(params, config)?),
            Self::AzureCli => Arc::new(AzureCliCredential::new(params, config)?),
            Self::AuthCode => Arc::new(AuthCodeCredential::new(params, config)?),
            Self::DeviceCode => Arc::new(DeviceCodeCredential::new(params, config)?),
            Self::Default => Arc::new(DefaultCredential::new(params, config)?),
        })
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CredentialKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "client_secret" => Ok(Self::ClientSecret),
            "azure_cli" => Ok(Self::AzureCli),
            "auth_code" => Ok(Self::AuthCode),
            "device_code" => Ok(Self::DeviceCode),
            "default" => Ok(Self::Default),
            other => Err(AuthError::validation(format!(
                "unknown credential '{other}', expected one of client_secret, azure_cli, auth_code, device_code, default"
            ))),
        }
    }
}

/// A source of bearer tokens
///
/// Implementations are constructed already validated; `validate` re-checks
/// the invariants a constructor enforces.
#[async_trait]
pub trait Credential: Send + Sync + fmt::Debug {
    /// Variant of this credential
    fn kind(&self) -> CredentialKind;

    /// Scope requested by [`get_token`](Self::get_token)
    fn scope(&self) -> &Scope;

    /// Whether acquiring a token may prompt the user
    fn is_interactive(&self) -> bool {
        self.kind().is_interactive()
    }

    /// Check construction invariants
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if a required value is missing or malformed.
    fn validate(&self) -> Result<()>;

    /// Acquire a token for an arbitrary scope
    async fn token_for(&self, scope: &Scope) -> Result<Token>;

    /// Acquire a token for this credential's scope
    async fn get_token(&self) -> Result<Token> {
        self.token_for(self.scope()).await
    }

    /// Attach `Authorization: <type> <token>` to a request
    async fn req_auth(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.get_token().await?;
        Ok(request.header(AUTHORIZATION, token.authorization_header()))
    }
}

/// A credential that signs the user in through an interactive flow
#[async_trait]
pub trait InteractiveCredential: Credential {
    /// Acquire a token, bypassing any cached token when `reauth` is set
    async fn get_token_with(&self, reauth: bool) -> Result<Token>;

    /// Token that aborts a running flow with [`AuthError::Interrupted`]
    fn cancellation_token(&self) -> &CancellationToken;
}

/// Tenant, client, cache and endpoint client shared by the OAuth credentials
#[derive(Debug, Clone)]
pub(crate) struct OAuthContext {
    pub(crate) tenant_id: TenantId,
    pub(crate) scope: Scope,
    pub(crate) offline: bool,
    pub(crate) cache: TokenCache,
    pub(crate) client: OAuthClient,
}

impl OAuthContext {
    pub(crate) fn new(params: &ResolvedParams) -> Result<Self> {
        let endpoints = Endpoints::new(&params.authority, &params.tenant_id);
        Ok(Self {
            tenant_id: params.tenant_id.clone(),
            scope: params.scope.clone(),
            offline: params.offline,
            cache: TokenCache::new(params.cache_mode, &params.config_dir),
            client: OAuthClient::new(endpoints, params.client_id.clone())?,
        })
    }

    pub(crate) fn client_id(&self) -> &str {
        self.client.client_id()
    }

    /// Scope parameter for user flows
    pub(crate) fn request_scope(&self, scope: &Scope) -> String {
        scope.request_string(self.offline)
    }

    pub(crate) fn cache_key(&self, scope: &str) -> CacheKey {
        CacheKey::new(self.client_id(), self.tenant_id.as_str(), scope)
    }

    pub(crate) fn cached(&self, scope: &str) -> Option<Token> {
        let token = self.cache.load_valid(&self.cache_key(scope));
        if token.is_some() {
            tracing::debug!(scope, "Using cached token");
        }
        token
    }

    pub(crate) fn store(&self, scope: &str, token: &Token) {
        if let Err(e) = self.cache.save(&self.cache_key(scope), token) {
            tracing::warn!("Failed to cache token: {e}");
        }
    }

    /// Refresh an expired cached token that carries a refresh token
    pub(crate) async fn renew(&self, scope: &str) -> Option<Token> {
        let key = self.cache_key(scope);
        let refresh_token = match self.cache.load(&key) {
            Ok(Some(token)) => token.refresh_token?,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache entry: {e}");
                return None;
            }
        };

        match self.client.refresh(&refresh_token, scope).await {
            Ok(token) => {
                self.store(scope, &token);
                Some(token)
            }
            Err(e) => {
                tracing::debug!("Refresh failed, falling back to sign-in: {e}");
                if let Err(e) = self.cache.delete(&key) {
                    tracing::warn!("Failed to drop stale cache entry: {e}");
                }
                None
            }
        }
    }
}
