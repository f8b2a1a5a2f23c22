//! Walks a credential chain until one entry produces a token
//!
//! For each entry, in order:
//!
//! 1. materialize the entry against the ambient parameters
//! 2. skip interactive credentials when the session cannot prompt
//! 3. request a token
//!
//! Every failure along the way, including [`AuthError::Interrupted`], is
//! recorded against the entry's name and the walk moves on. The first entry
//! that returns a token wins and no later entry is touched. When none does,
//! the recorded failures are returned in chain order as
//! [`AuthError::AllCredentialsFailed`].

use std::sync::Arc;

use crate::chain::{CredentialChain, default_credential_chain};
use crate::config::Config;
use crate::credential::{Credential, CredentialParams};
use crate::error::{AuthError, ResolutionError, Result};
use crate::types::Token;

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Name of the winning chain entry
    pub name: String,
    /// The credential that produced a token
    pub credential: Arc<dyn Credential>,
    /// Failures of the entries tried before it
    pub failures: Vec<ResolutionError>,
}

/// Resolves a [`CredentialChain`] to a working credential
#[derive(Debug, Clone)]
pub struct Resolver {
    chain: CredentialChain,
    params: CredentialParams,
    config: Config,
    verbose: bool,
}

impl Resolver {
    /// Create a resolver for `chain`
    #[must_use]
    pub fn new(chain: CredentialChain, config: Config) -> Self {
        Self {
            chain,
            params: CredentialParams::default(),
            config,
            verbose: false,
        }
    }

    /// Ambient parameters used for every entry not overriding them
    #[must_use]
    pub fn with_params(mut self, params: CredentialParams) -> Self {
        self.params = params;
        self
    }

    /// Print per-entry progress to stderr
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The chain being resolved
    #[must_use]
    pub fn chain(&self) -> &CredentialChain {
        &self.chain
    }

    /// Return the first credential that produces a token
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AllCredentialsFailed` when every entry fails.
    pub async fn resolve(&self) -> Result<Arc<dyn Credential>> {
        Ok(self.resolve_traced().await?.credential)
    }

    /// Like [`resolve`](Self::resolve), also reporting the entries that failed first
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AllCredentialsFailed` when every entry fails.
    pub async fn resolve_traced(&self) -> Result<Resolution> {
        let interactive = self.config.is_interactive_session();
        let mut failures = Vec::new();

        for spec in &self.chain {
            let name = spec.name();
            tracing::debug!(credential = name, "Trying credential");
            if self.verbose {
                eprintln!("Trying credential '{name}'...");
            }

            let credential = match spec.materialize(&self.params, &self.config) {
                Ok(credential) => credential,
                Err(e) => {
                    self.record(&mut failures, name, &e);
                    continue;
                }
            };

            if credential.is_interactive() && !interactive {
                let e = AuthError::non_interactive(format!("credential '{name}' prompts the user"));
                self.record(&mut failures, name, &e);
                continue;
            }

            match credential.get_token().await {
                Ok(token) if token.access_token.is_empty() => {
                    let e = AuthError::authentication("credential returned an empty access token");
                    self.record(&mut failures, name, &e);
                }
                Ok(_) => {
                    tracing::info!(credential = name, "Resolved credential");
                    if self.verbose {
                        eprintln!("Using credential '{name}'");
                    }
                    return Ok(Resolution {
                        name: name.to_string(),
                        credential,
                        failures,
                    });
                }
                Err(e) => self.record(&mut failures, name, &e),
            }
        }

        tracing::warn!(attempted = failures.len(), "No credential in the chain succeeded");
        Err(AuthError::AllCredentialsFailed { failures })
    }

    fn record(&self, failures: &mut Vec<ResolutionError>, name: &str, error: &AuthError) {
        if error.is_interrupted() {
            tracing::info!(credential = name, "Credential interrupted by user");
        } else {
            tracing::debug!(credential = name, error = %error, "Credential failed");
        }
        if self.verbose {
            eprintln!("  {name}: {error}");
        }
        failures.push(ResolutionError::new(name, error.to_string()));
    }
}

/// Resolve the default chain for `scope`
///
/// # Errors
///
/// Returns `AuthError::AllCredentialsFailed` when nothing works. A malformed
/// scope is not raised on its own: every entry fails to build with a
/// validation error, and each of those is recorded as that entry's failure.
pub async fn get_credential_provider(
    scope: Option<&str>,
    config: &Config,
) -> Result<Arc<dyn Credential>> {
    let mut params = CredentialParams::default();
    params.scope = scope.map(str::to_string);
    find_credential(&default_credential_chain(), &params, config).await
}

/// Resolve `chain` with ambient `params`
///
/// # Errors
///
/// Returns `AuthError::AllCredentialsFailed` when every entry fails.
pub async fn find_credential(
    chain: &CredentialChain,
    params: &CredentialParams,
    config: &Config,
) -> Result<Arc<dyn Credential>> {
    Resolver::new(chain.clone(), config.clone())
        .with_params(params.clone())
        .resolve()
        .await
}

/// Resolve the default chain and return a token for `scope`
///
/// # Errors
///
/// As [`get_credential_provider`].
pub async fn get_token(scope: Option<&str>, config: &Config) -> Result<Token> {
    get_credential_provider(scope, config).await?.get_token().await
}
