//! Ambient configuration shared by every credential
//!
//! [`Config`] is populated once, usually from the process environment, and
//! passed explicitly to credential constructors and the resolver. Explicit
//! credential parameters always win over values found here, and values here
//! win over the library defaults.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `AZURE_TENANT_ID` | `tenant_id` | `common` |
//! | `AZURE_CLIENT_ID` | `client_id` | public Azure CLI client |
//! | `AZURE_CLIENT_SECRET` | `client_secret` | none |
//! | `AZURE_AUTHORITY_HOST` | `authority_host` | `https://login.microsoftonline.com` |
//! | `AZAUTH_CONFIG_DIR` | `config_dir` | `<config dir>/azauth` |
//! | `AZAUTH_CLI` | `cli_executable` | `az` |
//! | `AZAUTH_INTERACTIVE` | `interactive` | terminal detection |
//! | `AZAUTH_HANDLE_CTRL_C` | `handle_ctrl_c` | `false` |

use std::path::PathBuf;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::utils::{is_terminal_session, parse_bool};

/// Tenant used when none is configured
pub const DEFAULT_TENANT: &str = "common";
/// Public client ID of the Azure CLI, used when no client ID is configured
pub const DEFAULT_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
/// Microsoft Entra authority host
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
/// Azure Resource Manager scope
pub const DEFAULT_SCOPE: &str = "https://management.azure.com/.default";
/// Azure CLI executable name
pub const DEFAULT_CLI_EXECUTABLE: &str = "az";
/// Wall-clock limit for a single CLI invocation
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(10);
/// Redirect URI for the authorization code flow; the port is picked at runtime
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Environment variable for the tenant ID
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable for the client ID
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable for the client secret
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Environment variable for the authority host
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
/// Environment variable for the token cache directory
pub const ENV_CONFIG_DIR: &str = "AZAUTH_CONFIG_DIR";
/// Environment variable for the Azure CLI executable
pub const ENV_CLI: &str = "AZAUTH_CLI";
/// Environment variable forcing session interactivity
pub const ENV_INTERACTIVE: &str = "AZAUTH_INTERACTIVE";
/// Environment variable letting interactive flows listen for Ctrl-C
pub const ENV_HANDLE_CTRL_C: &str = "AZAUTH_HANDLE_CTRL_C";

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("azauth")
}

/// Ambient defaults for credential construction
#[derive(Clone, TypedBuilder)]
pub struct Config {
    /// Tenant ID from the environment
    #[builder(default, setter(strip_option, into))]
    pub tenant_id: Option<String>,

    /// Client (application) ID from the environment
    #[builder(default, setter(strip_option, into))]
    pub client_id: Option<String>,

    /// Client secret from the environment
    #[builder(default, setter(strip_option, into))]
    pub client_secret: Option<String>,

    /// Authority host, with or without scheme
    #[builder(default = DEFAULT_AUTHORITY_HOST.to_string(), setter(into))]
    pub authority_host: String,

    /// Directory holding the on-disk token cache
    #[builder(default = default_config_dir(), setter(into))]
    pub config_dir: PathBuf,

    /// Azure CLI executable name or path
    #[builder(default = DEFAULT_CLI_EXECUTABLE.to_string(), setter(into))]
    pub cli_executable: String,

    /// Force the session to be treated as interactive or batch
    #[builder(default, setter(strip_option))]
    pub interactive: Option<bool>,

    /// Open the system browser during interactive flows
    #[builder(default = true)]
    pub open_browser: bool,

    /// Abort interactive flows on Ctrl-C
    ///
    /// Off by default: listening for Ctrl-C installs a process-wide SIGINT
    /// handler that stays in place for the life of the process, replacing
    /// the default terminate-on-interrupt behavior. Binaries that own the
    /// process can turn it on; libraries embedding `azauth` should cancel
    /// flows through a `CancellationToken` instead.
    #[builder(default)]
    pub handle_ctrl_c: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Read configuration from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();
        config.tenant_id = get(ENV_TENANT_ID);
        config.client_id = get(ENV_CLIENT_ID);
        config.client_secret = get(ENV_CLIENT_SECRET);
        if let Some(host) = get(ENV_AUTHORITY_HOST) {
            config.authority_host = host;
        }
        if let Some(dir) = get(ENV_CONFIG_DIR) {
            config.config_dir = PathBuf::from(dir);
        }
        if let Some(cli) = get(ENV_CLI) {
            config.cli_executable = cli;
        }
        config.interactive = get(ENV_INTERACTIVE).and_then(|v| parse_bool(&v));
        config.handle_ctrl_c = get(ENV_HANDLE_CTRL_C)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);
        config
    }

    /// Authority base URL with scheme and without a trailing slash
    #[must_use]
    pub fn authority_url(&self) -> String {
        let host = self.authority_host.trim().trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    /// Whether the current session can prompt the user
    #[must_use]
    pub fn is_interactive_session(&self) -> bool {
        self.interactive.unwrap_or_else(is_terminal_session)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret_set", &self.client_secret.is_some())
            .field("authority_host", &self.authority_host)
            .field("config_dir", &self.config_dir)
            .field("cli_executable", &self.cli_executable)
            .field("interactive", &self.interactive)
            .field("open_browser", &self.open_browser)
            .field("handle_ctrl_c", &self.handle_ctrl_c)
            .finish()
    }
}
