//! Per-credential construction parameters and their resolution against [`Config`]

use std::path::PathBuf;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::cache::CacheMode;
use crate::config::{
    Config, DEFAULT_CLIENT_ID, DEFAULT_PROCESS_TIMEOUT, DEFAULT_REDIRECT_URI, DEFAULT_SCOPE,
    DEFAULT_TENANT,
};
use crate::error::Result;
use crate::types::{Scope, TenantId};

/// Optional overrides for credential construction
///
/// Every field left unset falls back to [`Config`], then to the library
/// default.
#[derive(Clone, Default, TypedBuilder)]
pub struct CredentialParams {
    /// Scope to request
    #[builder(default, setter(strip_option, into))]
    pub scope: Option<String>,

    /// Tenant to authenticate against
    #[builder(default, setter(strip_option, into))]
    pub tenant_id: Option<String>,

    /// Client (application) ID
    #[builder(default, setter(strip_option, into))]
    pub client_id: Option<String>,

    /// Client secret, used by the client secret credential only
    #[builder(default, setter(strip_option, into))]
    pub client_secret: Option<String>,

    /// Token cache storage
    #[builder(default, setter(strip_option))]
    pub cache_mode: Option<CacheMode>,

    /// Request a refresh token (`offline_access`) in user flows
    #[builder(default, setter(strip_option))]
    pub offline: Option<bool>,

    /// Redirect URI for the authorization code flow
    #[builder(default, setter(strip_option, into))]
    pub redirect_uri: Option<String>,

    /// Wall-clock limit for each CLI invocation
    #[builder(default, setter(strip_option))]
    pub process_timeout: Option<Duration>,

    /// Run `login` when the CLI has no signed-in account
    #[builder(default, setter(strip_option))]
    pub login_on_missing: Option<bool>,
}

impl CredentialParams {
    /// Fill unset fields from `fallback`
    #[must_use]
    pub fn merge(&self, fallback: &Self) -> Self {
        Self {
            scope: self.scope.clone().or_else(|| fallback.scope.clone()),
            tenant_id: self.tenant_id.clone().or_else(|| fallback.tenant_id.clone()),
            client_id: self.client_id.clone().or_else(|| fallback.client_id.clone()),
            client_secret: self
                .client_secret
                .clone()
                .or_else(|| fallback.client_secret.clone()),
            cache_mode: self.cache_mode.or(fallback.cache_mode),
            offline: self.offline.or(fallback.offline),
            redirect_uri: self
                .redirect_uri
                .clone()
                .or_else(|| fallback.redirect_uri.clone()),
            process_timeout: self.process_timeout.or(fallback.process_timeout),
            login_on_missing: self.login_on_missing.or(fallback.login_on_missing),
        }
    }

    /// Resolve every parameter and validate tenant and scope
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a malformed tenant or scope.
    pub fn resolve(&self, config: &Config) -> Result<ResolvedParams> {
        let scope = Scope::new(self.scope.as_deref().unwrap_or(DEFAULT_SCOPE))?;
        let tenant_id = TenantId::new(
            self.tenant_id
                .as_deref()
                .or(config.tenant_id.as_deref())
                .unwrap_or(DEFAULT_TENANT),
        )?;
        let client_id = self
            .client_id
            .as_deref()
            .or(config.client_id.as_deref())
            .unwrap_or(DEFAULT_CLIENT_ID)
            .to_string();
        let client_secret = self
            .client_secret
            .clone()
            .or_else(|| config.client_secret.clone());

        Ok(ResolvedParams {
            scope,
            tenant_id,
            explicit_tenant: self.tenant_id.is_some() || config.tenant_id.is_some(),
            client_id,
            client_secret,
            cache_mode: self.cache_mode.unwrap_or_default(),
            offline: self.offline.unwrap_or(true),
            redirect_uri: self
                .redirect_uri
                .clone()
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            process_timeout: self.process_timeout.unwrap_or(DEFAULT_PROCESS_TIMEOUT),
            login_on_missing: self.login_on_missing.unwrap_or(false),
            authority: config.authority_url(),
            config_dir: config.config_dir.clone(),
            cli_executable: config.cli_executable.clone(),
            interactive_session: config.is_interactive_session(),
            open_browser: config.open_browser,
            handle_ctrl_c: config.handle_ctrl_c,
        })
    }
}

impl std::fmt::Debug for CredentialParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialParams")
            .field("scope", &self.scope)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret_set", &self.client_secret.is_some())
            .field("cache_mode", &self.cache_mode)
            .field("offline", &self.offline)
            .field("redirect_uri", &self.redirect_uri)
            .field("process_timeout", &self.process_timeout)
            .field("login_on_missing", &self.login_on_missing)
            .finish()
    }
}

/// Fully resolved construction parameters
#[derive(Clone)]
pub struct ResolvedParams {
    /// Scope to request
    pub scope: Scope,
    /// Tenant to authenticate against
    pub tenant_id: TenantId,
    /// Whether the tenant came from a parameter or the environment
    pub explicit_tenant: bool,
    /// Client (application) ID
    pub client_id: String,
    /// Client secret, if any was given
    pub client_secret: Option<String>,
    /// Token cache storage
    pub cache_mode: CacheMode,
    /// Request a refresh token in user flows
    pub offline: bool,
    /// Redirect URI for the authorization code flow
    pub redirect_uri: String,
    /// Wall-clock limit for each CLI invocation
    pub process_timeout: Duration,
    /// Run `login` when the CLI has no signed-in account
    pub login_on_missing: bool,
    /// Authority base URL with scheme
    pub authority: String,
    /// Token cache directory
    pub config_dir: PathBuf,
    /// CLI executable name or path
    pub cli_executable: String,
    /// Whether the session can prompt the user
    pub interactive_session: bool,
    /// Open the system browser during interactive flows
    pub open_browser: bool,
    /// Let Ctrl-C interrupt interactive flows
    pub handle_ctrl_c: bool,
}

impl std::fmt::Debug for ResolvedParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedParams")
            .field("scope", &self.scope)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret_set", &self.client_secret.is_some())
            .field("cache_mode", &self.cache_mode)
            .field("offline", &self.offline)
            .field("redirect_uri", &self.redirect_uri)
            .field("process_timeout", &self.process_timeout)
            .field("login_on_missing", &self.login_on_missing)
            .field("authority", &self.authority)
            .field("interactive_session", &self.interactive_session)
            .field("handle_ctrl_c", &self.handle_ctrl_c)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT_ID};

    fn env_config() -> Config {
        Config::from_lookup(|key| match key {
            ENV_TENANT_ID => Some("env-tenant".to_string()),
            ENV_CLIENT_ID => Some("env-client".to_string()),
            ENV_CLIENT_SECRET => Some("env-secret".to_string()),
            _ => None,
        })
    }

    #[test]
    fn test_explicit_values_win_over_environment() {
        let params = CredentialParams::builder()
            .tenant_id("t1")
            .client_id("c1")
            .client_secret("s1")
            .build();
        let resolved = params.resolve(&env_config()).unwrap();

        assert_eq!(resolved.tenant_id.as_str(), "t1");
        assert_eq!(resolved.client_id, "c1");
        assert_eq!(resolved.client_secret.as_deref(), Some("s1"));
    }

    #[test]
    fn test_environment_wins_over_defaults() {
        let resolved = CredentialParams::default().resolve(&env_config()).unwrap();
        assert_eq!(resolved.tenant_id.as_str(), "env-tenant");
        assert_eq!(resolved.client_id, "env-client");
        assert!(resolved.explicit_tenant);
    }

    #[test]
    fn test_library_defaults() {
        let resolved = CredentialParams::default()
            .resolve(&Config::from_lookup(|_| None))
            .unwrap();
        assert_eq!(resolved.tenant_id.as_str(), DEFAULT_TENANT);
        assert_eq!(resolved.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(resolved.scope.as_str(), DEFAULT_SCOPE);
        assert_eq!(resolved.process_timeout, DEFAULT_PROCESS_TIMEOUT);
        assert_eq!(resolved.cache_mode, CacheMode::Disk);
        assert!(resolved.client_secret.is_none());
        assert!(!resolved.explicit_tenant);
        assert!(!resolved.login_on_missing);
    }

    #[test]
    fn test_invalid_tenant_and_scope() {
        let config = Config::from_lookup(|_| None);
        for tenant in ["my tenant", "a/b", "user@contoso.com"] {
            let params = CredentialParams::builder().tenant_id(tenant).build();
            assert!(params.resolve(&config).is_err(), "{tenant} should be rejected");
        }
        let params = CredentialParams::builder().scope("two scopes").build();
        assert!(params.resolve(&config).is_err());
    }

    #[test]
    fn test_merge_prefers_self() {
        let overrides = CredentialParams::builder().scope("a").offline(false).build();
        let ambient = CredentialParams::builder()
            .scope("b")
            .tenant_id("t")
            .offline(true)
            .build();
        let merged = overrides.merge(&ambient);

        assert_eq!(merged.scope.as_deref(), Some("a"));
        assert_eq!(merged.tenant_id.as_deref(), Some("t"));
        assert_eq!(merged.offline, Some(false));
    }

    #[test]
    fn test_debug_hides_secret() {
        let params = CredentialParams::builder().client_secret("hunter2").build();
        assert!(!format!("{params:?}").contains("hunter2"));
    }
}
