//! User sign-in with the authorization code flow and PKCE

use async_trait::async_trait;
use oauth2::PkceCodeChallenge;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Credential, CredentialKind, CredentialParams, InteractiveCredential, OAuthContext};
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::oauth::{CallbackListener, check_redirect_uri, resolve_redirect_uri};
use crate::types::{Scope, Token};
use crate::utils::{interruptible, open_in_browser};

/// How long to wait for the browser to come back to the redirect listener
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Callback that presents the authorization URL to the user
pub type UrlOpener = Arc<dyn Fn(&Url) + Send + Sync>;

/// Signs the user in through the system browser
///
/// A one-shot listener on the loopback redirect URI receives the code. When
/// the URI has no port, the first free port in
/// [`REDIRECT_PORT_RANGE`](crate::oauth::REDIRECT_PORT_RANGE) is used.
#[derive(Clone)]
pub struct AuthCodeCredential {
    ctx: OAuthContext,
    redirect_uri: String,
    interactive_session: bool,
    open_browser: bool,
    handle_ctrl_c: bool,
    url_opener: Option<UrlOpener>,
    cancel: CancellationToken,
}

impl fmt::Debug for AuthCodeCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCodeCredential")
            .field("ctx", &self.ctx)
            .field("redirect_uri", &self.redirect_uri)
            .field("interactive_session", &self.interactive_session)
            .field("open_browser", &self.open_browser)
            .field("handle_ctrl_c", &self.handle_ctrl_c)
            .field("custom_url_opener", &self.url_opener.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthCodeCredential {
    /// Create the credential
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NonInteractiveSession` outside an interactive
    /// session, or `AuthError::Validation` for a malformed tenant, scope or
    /// redirect URI.
    pub fn new(params: &CredentialParams, config: &Config) -> Result<Self> {
        let resolved = params.resolve(config)?;
        let credential = Self {
            ctx: OAuthContext::new(&resolved)?,
            redirect_uri: resolved.redirect_uri,
            interactive_session: resolved.interactive_session,
            open_browser: resolved.open_browser,
            handle_ctrl_c: resolved.handle_ctrl_c,
            url_opener: None,
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

    /// Present the authorization URL through `opener` instead of the system browser
    ///
    /// The opener is called once per sign-in, whether or not browser
    /// launching is enabled in [`Config`].
    #[must_use]
    pub fn with_url_opener<F>(mut self, opener: F) -> Self
    where
        F: Fn(&Url) + Send + Sync + 'static,
    {
        self.url_opener = Some(Arc::new(opener));
        self
    }

    /// Configured redirect URI, before any port is filled in
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    async fn sign_in(&self, scope: &str) -> Result<Token> {
        let mut redirect = resolve_redirect_uri(&self.redirect_uri).await?;
        let listener = CallbackListener::bind(&redirect).await?;
        if redirect.port() == Some(0) {
            // Ephemeral port, advertise the one the OS picked
            redirect
                .set_port(Some(listener.local_port()?))
                .map_err(|()| AuthError::validation("cannot set port on redirect URI"))?;
        }

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state) = self.ctx.client.authorize_url(scope, &redirect, challenge);

        eprintln!("Sign in with your browser. If it does not open, visit:\n{url}");
        match &self.url_opener {
            Some(opener) => opener(&url),
            None if self.open_browser => open_in_browser(url.as_str()),
            None => {}
        }

        let code = tokio::time::timeout(CALLBACK_TIMEOUT, listener.wait_for_code(state.secret()))
            .await
            .map_err(|_| {
                AuthError::authentication(format!(
                    "no redirect received within {} seconds",
                    CALLBACK_TIMEOUT.as_secs()
                ))
            })??;

        self.ctx
            .client
            .exchange_code(code, &redirect, verifier, scope)
            .await
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

        let token = interruptible(&self.cancel, self.handle_ctrl_c, self.sign_in(&scope)).await?;
        self.ctx.store(&scope, &token);
        Ok(token)
    }
}

#[async_trait]
impl Credential for AuthCodeCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::AuthCode
    }

    fn scope(&self) -> &Scope {
        &self.ctx.scope
    }

    fn validate(&self) -> Result<()> {
        if !self.interactive_session {
            return Err(AuthError::non_interactive("authorization code authentication"));
        }
        check_redirect_uri(&self.redirect_uri)?;
        Ok(())
    }

    async fn token_for(&self, scope: &Scope) -> Result<Token> {
        self.acquire(scope, false).await
    }
}

#[async_trait]
impl InteractiveCredential for AuthCodeCredential {
    async fn get_token_with(&self, reauth: bool) -> Result<Token> {
        self.acquire(&self.ctx.scope, reauth).await
    }

    fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
