//! Lazily resolved default credential

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{Credential, CredentialKind, CredentialParams};
use crate::chain::{CredentialChain, default_credential_chain};
use crate::config::Config;
use crate::error::Result;
use crate::resolver::Resolver;
use crate::types::{Scope, Token};

/// Resolves a chain on first use and delegates to the winner afterwards
///
/// Resolution runs once per `DefaultCredential`; a failed resolution is not
/// remembered and is retried on the next call.
#[derive(Debug)]
pub struct DefaultCredential {
    scope: Scope,
    resolver: Resolver,
    provider: OnceCell<Arc<dyn Credential>>,
}

impl DefaultCredential {
    /// Wrap the default chain
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a malformed tenant or scope.
    pub fn new(params: &CredentialParams, config: &Config) -> Result<Self> {
        Self::with_chain(default_credential_chain(), params, config)
    }

    /// Wrap a custom chain
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a malformed tenant or scope.
    pub fn with_chain(
        chain: CredentialChain,
        params: &CredentialParams,
        config: &Config,
    ) -> Result<Self> {
        let resolved = params.resolve(config)?;
        Ok(Self {
            scope: resolved.scope,
            resolver: Resolver::new(chain, config.clone()).with_params(params.clone()),
            provider: OnceCell::new(),
        })
    }

    /// The resolved credential, resolving the chain if needed
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AllCredentialsFailed` when no entry works.
    pub async fn provider(&self) -> Result<&Arc<dyn Credential>> {
        self.provider
            .get_or_try_init(|| self.resolver.resolve())
            .await
    }

    /// Whether the chain has been resolved
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.provider.initialized()
    }
}

#[async_trait]
impl Credential for DefaultCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Default
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn is_interactive(&self) -> bool {
        self.provider
            .get()
            .is_some_and(|provider| provider.is_interactive())
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn token_for(&self, scope: &Scope) -> Result<Token> {
        self.provider().await?.token_for(scope).await
    }
}
