//! User sign-in with the device code flow

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Credential, CredentialKind, CredentialParams, InteractiveCredential, OAuthContext};
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::types::{Scope, Token};
use crate::utils::interruptible;

/// Signs the user in by showing a code to enter on another device
///
/// Lookup order for a token: valid cached token, refresh of an expired
/// cached token, then the device code flow.
#[derive(Debug, Clone)]
pub struct DeviceCodeCredential {
    ctx: OAuthContext,
    interactive_session: bool,
    handle_ctrl_c: bool,
    cancel: CancellationToken,
}

impl DeviceCodeCredential {
    /// Create the credential
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NonInteractiveSession` outside an interactive
    /// session, or `AuthError::Validation` for a malformed tenant, scope or
    /// authority.
    pub fn new(params: &CredentialParams, config: &Config) -> Result<Self> {
        let resolved = params.resolve(config)?;
        let credential = Self {
            ctx: OAuthContext::new(&resolved)?,
            interactive_session: resolved.interactive_session,
            handle_ctrl_c: resolved.handle_ctrl_c,
            cancel: CancellationToken::new(),
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Use a caller-owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn acquire(&self, scope: &Scope, reauth: bool) -> Result<Token> {
        let scope = self.ctx.request_scope(scope);
        if !reauth {
            if let Some(token) = self.ctx.cached(&scope) {
                return Ok(token);
            }
            if let Some(token) = self.ctx.renew(&scope).await {
                return Ok(token);
            }
        }

        let flow = async {
            let device = self.ctx.client.request_device_code(&scope).await?;
            eprintln!("{}", device.instructions());
            self.ctx.client.poll_device_code(&device).await
        };
        let token = interruptible(&self.cancel, self.handle_ctrl_c, flow).await?;
        self.ctx.store(&scope, &token);
        Ok(token)
    }
}

#[async_trait]
impl Credential for DeviceCodeCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::DeviceCode
    }

    fn scope(&self) -> &Scope {
        &self.ctx.scope
    }

    fn validate(&self) -> Result<()> {
        if !self.interactive_session {
            return Err(AuthError::non_interactive("device code authentication"));
        }
        Ok(())
    }

    async fn token_for(&self, scope: &Scope) -> Result<Token> {
        self.acquire(scope, false).await
    }
}

#[async_trait]
impl InteractiveCredential for DeviceCodeCredential {
    async fn get_token_with(&self, reauth: bool) -> Result<Token> {
        self.acquire(&self.ctx.scope, reauth).await
    }

    fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_in_batch_session() {
        let config = Config::builder().interactive(false).build();
        let err = DeviceCodeCredential::new(&CredentialParams::default(), &config).unwrap_err();
        assert!(matches!(err, AuthError::NonInteractiveSession(_)));
    }

    #[test]
    fn test_interactive_session() {
        let config = Config::builder().interactive(true).build();
        let credential = DeviceCodeCredential::new(&CredentialParams::default(), &config).unwrap();
        assert!(credential.is_interactive());
        assert_eq!(credential.kind().name(), "device_code");
    }
}
