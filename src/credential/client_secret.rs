//! Application identity via the client credentials grant

use async_trait::async_trait;

use super::{Credential, CredentialKind, CredentialParams, OAuthContext};
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::types::{Scope, TenantId, Token};

/// Authenticates an application with a client ID and secret
///
/// Tokens are cached per `(client_id, tenant, scope)`; a rejected secret is
/// reported as [`AuthError::Authentication`] and not retried.
#[derive(Clone)]
pub struct ClientSecretCredential {
    ctx: OAuthContext,
    client_secret: String,
}

impl ClientSecretCredential {
    /// Create the credential
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if no client secret is given or
    /// configured, or if the tenant or scope is malformed.
    pub fn new(params: &CredentialParams, config: &Config) -> Result<Self> {
        let resolved = params.resolve(config)?;
        let credential = Self {
            ctx: OAuthContext::new(&resolved)?,
            client_secret: resolved.client_secret.unwrap_or_default(),
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Tenant the secret belongs to
    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        &self.ctx.tenant_id
    }

    /// Client (application) ID
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.ctx.client_id()
    }

    /// Client secret
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

#[async_trait]
impl Credential for ClientSecretCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::ClientSecret
    }

    fn scope(&self) -> &Scope {
        &self.ctx.scope
    }

    fn validate(&self) -> Result<()> {
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::validation(
                "client_secret is required; pass it explicitly or set AZURE_CLIENT_SECRET",
            ));
        }
        Ok(())
    }

    async fn token_for(&self, scope: &Scope) -> Result<Token> {
        // Client credentials never return refresh tokens
        let scope = scope.as_str();
        if let Some(token) = self.ctx.cached(scope) {
            return Ok(token);
        }

        let token = self
            .ctx
            .client
            .client_credentials(&self.client_secret, scope)
            .await?;
        self.ctx.store(scope, &token);
        Ok(token)
    }
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.ctx.tenant_id)
            .field("client_id", &self.client_id())
            .field("scope", &self.ctx.scope)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}
