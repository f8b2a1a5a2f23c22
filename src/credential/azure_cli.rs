//! Tokens from the Azure CLI

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Credential, CredentialKind, CredentialParams};
use crate::cache::{CacheKey, TokenCache};
use crate::config::{Config, DEFAULT_TENANT};
use crate::error::{AuthError, Result};
use crate::process::CliProcess;
use crate::types::{Scope, TenantId, Token};

const REQUIRED_FIELDS: [&str; 3] = ["accessToken", "tokenType", "expiresOn"];

/// Delegates token acquisition to `az account get-access-token`
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    cli: CliProcess,
    scope: Scope,
    tenant_id: TenantId,
    explicit_tenant: bool,
    login_on_missing: bool,
    interactive_session: bool,
    open_browser: bool,
    handle_ctrl_c: bool,
    cache: TokenCache,
    cancel: CancellationToken,
}

impl AzureCliCredential {
    /// Create the credential
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CliNotFound` if the executable is not installed,
    /// or `AuthError::Validation` for a malformed tenant or scope.
    pub fn new(params: &CredentialParams, config: &Config) -> Result<Self> {
        let resolved = params.resolve(config)?;
        let cli = CliProcess::find(&resolved.cli_executable)?.with_timeout(resolved.process_timeout);

        Ok(Self {
            cli,
            scope: resolved.scope,
            tenant_id: resolved.tenant_id,
            explicit_tenant: resolved.explicit_tenant,
            login_on_missing: resolved.login_on_missing,
            interactive_session: resolved.interactive_session,
            open_browser: resolved.open_browser,
            handle_ctrl_c: resolved.handle_ctrl_c,
            cache: TokenCache::memory(),
            cancel: CancellationToken::new(),
        })
    }

    /// Use a caller-owned token to cancel [`login`](Self::login)
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The underlying CLI process
    #[must_use]
    pub fn cli(&self) -> &CliProcess {
        &self.cli
    }

    fn tenant_arg(&self) -> Option<&str> {
        (self.explicit_tenant && self.tenant_id.as_str() != DEFAULT_TENANT)
            .then(|| self.tenant_id.as_str())
    }

    /// Whether the CLI has a signed-in account
    ///
    /// # Errors
    ///
    /// Returns CLI errors other than a failing `account show`, such as a timeout.
    pub async fn is_login(&self) -> Result<bool> {
        match self.cli.run_json(&["account", "show", "--output", "json"]).await {
            Ok(_) => Ok(true),
            Err(AuthError::CliExecution { .. } | AuthError::CliEmptyOutput(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sign in through `login --use-device-code`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NonInteractiveSession` in a batch session, or
    /// any error from the login process.
    pub async fn login(&self) -> Result<()> {
        if !self.interactive_session {
            return Err(AuthError::non_interactive("Azure CLI login"));
        }
        self.cli
            .login(
                self.tenant_arg(),
                self.open_browser,
                self.handle_ctrl_c,
                &self.cancel,
            )
            .await
    }

    /// Sign out; failures are logged, not returned
    ///
    /// Tokens cached for this CLI are dropped either way, so the next
    /// request goes back to the CLI.
    pub async fn logout(&self) {
        self.cli.logout().await;
        match self.cache.forget_client(&self.cache_client_id()) {
            Ok(dropped) => tracing::debug!(dropped, "Cleared cached CLI tokens"),
            Err(e) => tracing::warn!("Failed to clear cached CLI tokens: {e}"),
        }
    }

    /// Cache identity of tokens issued through this executable
    fn cache_client_id(&self) -> String {
        self.cli.path().to_string_lossy().into_owned()
    }
}

#[async_trait]
impl Credential for AzureCliCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::AzureCli
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn validate(&self) -> Result<()> {
        if !self.cli.path().is_file() {
            return Err(AuthError::cli_not_found(self.cli.path().display().to_string()));
        }
        Ok(())
    }

    async fn token_for(&self, scope: &Scope) -> Result<Token> {
        let key = CacheKey::new(self.cache_client_id(), self.tenant_id.as_str(), scope.as_str());
        if let Some(token) = self.cache.load_valid(&key) {
            return Ok(token);
        }

        if !self.is_login().await? {
            if self.login_on_missing && self.interactive_session {
                self.login().await?;
            } else {
                return Err(AuthError::NotLoggedIn(self.cli.program().to_string()));
            }
        }

        let mut args = vec!["account", "get-access-token", "--scope", scope.as_str()];
        if let Some(tenant) = self.tenant_arg() {
            args.extend(["--tenant", tenant]);
        }
        args.extend(["--output", "json"]);

        let response = self.cli.run_json(&args).await?;
        let token = parse_cli_token(&response)?;
        if let Err(e) = self.cache.save(&key, &token) {
            tracing::warn!("Failed to cache CLI token: {e}");
        }
        Ok(token)
    }
}

/// Build a token from `get-access-token` output
///
/// # Errors
///
/// Returns `AuthError::CliInvalidResponse` listing absent required fields,
/// or describing an unparseable expiry.
pub fn parse_cli_token(response: &Value) -> Result<Token> {
    let field = |name: &str| response.get(name).and_then(Value::as_str);

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|&&name| field(name).is_none_or(str::is_empty))
        .map(|name| (*name).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AuthError::cli_missing_fields(missing));
    }

    let (Some(access_token), Some(token_type), Some(expires_on)) =
        (field("accessToken"), field("tokenType"), field("expiresOn"))
    else {
        return Err(AuthError::cli_invalid_response("token fields disappeared"));
    };

    // Newer CLI versions also emit a POSIX timestamp
    let epoch = response.get("expires_on").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });
    let expires_at = match epoch {
        Some(epoch) => epoch,
        None => parse_expires_on(expires_on)?,
    };

    Ok(Token::new(access_token, token_type, expires_at, None))
}

/// Parse the CLI's `expiresOn` into a Unix timestamp
///
/// Accepts the local-time `YYYY-MM-DD HH:MM:SS[.ffffff]` form and RFC 3339.
///
/// # Errors
///
/// Returns `AuthError::CliInvalidResponse` for any other format.
pub fn parse_expires_on(value: &str) -> Result<u64> {
    let value = value.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        if let Some(local) = Local.from_local_datetime(&naive).earliest() {
            return Ok(u64::try_from(local.timestamp()).unwrap_or(0));
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(u64::try_from(parsed.timestamp()).unwrap_or(0));
    }

    Err(AuthError::cli_invalid_response(format!(
        "unrecognized expiresOn value '{value}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cli_token() {
        let token = parse_cli_token(&json!({
            "accessToken": "eyJ0eXAi",
            "tokenType": "Bearer",
            "expiresOn": "2030-01-01 12:00:00.000000",
            "expires_on": 1_893_499_200u64,
            "subscription": "sub",
            "tenant": "tenant"
        }))
        .unwrap();

        assert_eq!(token.access_token, "eyJ0eXAi");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_at, 1_893_499_200);
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let err = parse_cli_token(&json!({"tokenType": "Bearer"})).unwrap_err();
        match err {
            AuthError::CliInvalidResponse { missing, .. } => {
                assert_eq!(missing, vec!["accessToken", "expiresOn"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_expires_on_formats() {
        let rfc = parse_expires_on("2030-01-01T00:00:00Z").unwrap();
        assert_eq!(rfc, 1_893_456_000);

        let local = parse_expires_on("2030-01-01 00:00:00.123456").unwrap();
        let expected = Local
            .from_local_datetime(
                &NaiveDateTime::parse_from_str("2030-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            )
            .earliest()
            .unwrap()
            .timestamp();
        assert_eq!(local, u64::try_from(expected).unwrap());

        assert!(parse_expires_on("tomorrow").is_err());
    }

    #[test]
    fn test_missing_executable() {
        let config = Config::builder()
            .cli_executable("/nonexistent/azauth-test/az")
            .build();
        let err = AzureCliCredential::new(&CredentialParams::default(), &config).unwrap_err();
        assert!(matches!(err, AuthError::CliNotFound(_)));
    }
}
