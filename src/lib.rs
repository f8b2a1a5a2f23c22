//! # azauth
//!
//! OAuth 2.0 credential resolution for Azure REST APIs.
//! Async, tokio-based, strongly typed.
//!
//! Given a scope, `azauth` walks an ordered chain of authentication methods,
//! returns the first one that yields a bearer token, and uses it to authorize
//! outgoing requests.
//!
//! ## Quick Start
//!
//! Resolve the default chain and fetch a token with [`get_token()`]:
//!
//! ```no_run
//! use azauth::{Config, get_token};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let token = get_token(Some("https://management.azure.com/.default"), &config).await?;
//!     println!("expires at {}", token.expires_at);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Credentials
//!
//! Every authentication method implements [`Credential`]:
//!
//! - [`ClientSecretCredential`]: application identity (client credentials grant)
//! - [`AzureCliCredential`]: token from `az account get-access-token`
//! - [`AuthCodeCredential`]: browser sign-in with PKCE (interactive)
//! - [`DeviceCodeCredential`]: code entered on another device (interactive)
//! - [`DefaultCredential`]: resolves the default chain on first use
//!
//! ```no_run
//! # use azauth::{ClientSecretCredential, Config, Credential, CredentialParams};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let params = CredentialParams::builder()
//!     .tenant_id("contoso.onmicrosoft.com")
//!     .client_id("00000000-0000-0000-0000-000000000000")
//!     .client_secret("...")
//!     .build();
//! let credential = ClientSecretCredential::new(&params, &Config::from_env())?;
//! let token = credential.get_token().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Credential Chains
//!
//! [`default_credential_chain()`] tries `client_secret`, `azure_cli`,
//! `auth_code` and `device_code`, in that order. Interactive methods are
//! skipped when the session cannot prompt. Custom chains are built with
//! [`credential_chain()`]:
//!
//! ```no_run
//! # use azauth::{Config, CredentialKind, CredentialParams, Resolver, credential_chain};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = credential_chain([CredentialKind::AzureCli, CredentialKind::DeviceCode])?;
//! let resolution = Resolver::new(chain, Config::from_env())
//!     .with_params(CredentialParams::builder().scope("https://graph.microsoft.com/.default").build())
//!     .verbose(true)
//!     .resolve_traced()
//!     .await?;
//! println!("using {}", resolution.name);
//! # Ok(())
//! # }
//! ```
//!
//! When every entry fails, [`AuthError::AllCredentialsFailed`] lists each
//! entry's failure in chain order.
//!
//! ### 3. Authorized Requests
//!
//! ```no_run
//! # use azauth::{ApiClient, Config, get_credential_provider};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = get_credential_provider(None, &Config::from_env()).await?;
//! let client = ApiClient::new("https://management.azure.com", provider);
//! let subscriptions: serde_json::Value = client
//!     .get_json("/subscriptions?api-version=2022-12-01")
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`Config::from_env()`] reads `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`,
//! `AZURE_CLIENT_SECRET`, `AZURE_AUTHORITY_HOST`, `AZAUTH_CONFIG_DIR`,
//! `AZAUTH_CLI`, `AZAUTH_INTERACTIVE` and `AZAUTH_HANDLE_CTRL_C`. Explicit
//! [`CredentialParams`] always win over the environment.
//!
//! Interactive flows stop when their `CancellationToken` fires. Ctrl-C only
//! interrupts them when [`Config::handle_ctrl_c`] is set, because listening
//! for it takes over the process's SIGINT handling.
//!
//! ## Logging
//!
//! Events are emitted through `tracing`; install a subscriber to see them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod chain;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod oauth;
pub mod process;
pub mod resolver;
pub mod types;
pub mod utils;

pub use cache::{CacheKey, CacheMode, TokenCache};
pub use chain::{
    CredentialChain, CredentialSource, CredentialSpec, credential_chain, default_credential_chain,
};
pub use config::Config;
pub use credential::{
    AuthCodeCredential, AzureCliCredential, ClientSecretCredential, Credential, CredentialKind,
    CredentialParams, DefaultCredential, DeviceCodeCredential, InteractiveCredential,
};
pub use error::{AuthError, ResolutionError, Result};
pub use http::{ApiClient, RetryPolicy};
pub use resolver::{Resolution, Resolver, find_credential, get_credential_provider, get_token};
pub use types::{Scope, TenantId, Token};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
