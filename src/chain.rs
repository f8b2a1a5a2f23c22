//! Ordered, named credential chains
//!
//! A chain holds deferred specifications, not credentials: each entry is
//! either a [`CredentialKind`] with parameter overrides, materialized by the
//! [`Resolver`](crate::Resolver) against its ambient parameters, or an
//! already-built credential.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::credential::{Credential, CredentialKind, CredentialParams};
use crate::error::{AuthError, Result};

/// How a chain entry produces its credential
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Construct a credential of `kind` when the chain is resolved
    Kind {
        /// Variant to construct
        kind: CredentialKind,
        /// Parameters that take precedence over the resolver's
        overrides: CredentialParams,
    },
    /// Use an existing credential as-is
    Instance(Arc<dyn Credential>),
}

/// One named entry of a [`CredentialChain`]
#[derive(Debug, Clone)]
pub struct CredentialSpec {
    name: String,
    source: CredentialSource,
}

impl CredentialSpec {
    /// Entry for `kind`, named after it
    #[must_use]
    pub fn kind(kind: CredentialKind) -> Self {
        Self::named(kind.name(), kind)
    }

    /// Entry for `kind` under a custom name
    pub fn named(name: impl Into<String>, kind: CredentialKind) -> Self {
        Self {
            name: name.into(),
            source: CredentialSource::Kind {
                kind,
                overrides: CredentialParams::default(),
            },
        }
    }

    /// Entry wrapping a constructed credential
    pub fn instance(name: impl Into<String>, credential: Arc<dyn Credential>) -> Self {
        Self {
            name: name.into(),
            source: CredentialSource::Instance(credential),
        }
    }

    /// Set parameter overrides; ignored for instances
    #[must_use]
    pub fn with_overrides(mut self, params: CredentialParams) -> Self {
        if let CredentialSource::Kind { overrides, .. } = &mut self.source {
            *overrides = params;
        }
        self
    }

    /// Entry name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry source
    #[must_use]
    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    fn is_default(&self) -> bool {
        match &self.source {
            CredentialSource::Kind { kind, .. } => *kind == CredentialKind::Default,
            CredentialSource::Instance(credential) => credential.kind() == CredentialKind::Default,
        }
    }

    /// Produce the credential, letting overrides win over `ambient`
    ///
    /// # Errors
    ///
    /// Returns the constructor's error for [`CredentialSource::Kind`].
    pub fn materialize(
        &self,
        ambient: &CredentialParams,
        config: &Config,
    ) -> Result<Arc<dyn Credential>> {
        match &self.source {
            CredentialSource::Kind { kind, overrides } => {
                kind.build(&overrides.merge(ambient), config)
            }
            CredentialSource::Instance(credential) => Ok(Arc::clone(credential)),
        }
    }
}

impl From<CredentialKind> for CredentialSpec {
    fn from(kind: CredentialKind) -> Self {
        Self::kind(kind)
    }
}

/// Non-empty ordered sequence of uniquely named credential specifications
#[derive(Debug, Clone)]
pub struct CredentialChain {
    entries: Vec<CredentialSpec>,
}

impl CredentialChain {
    /// Build a chain
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CredentialChainEmpty` for no entries, and
    /// `AuthError::Validation` for duplicate names or a nested default
    /// credential.
    pub fn new(entries: Vec<CredentialSpec>) -> Result<Self> {
        if entries.is_empty() {
            return Err(AuthError::CredentialChainEmpty);
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name()) {
                return Err(AuthError::validation(format!(
                    "duplicate credential name '{}' in chain",
                    entry.name()
                )));
            }
            if entry.is_default() {
                return Err(AuthError::validation(format!(
                    "credential '{}' is the default chain itself and cannot be nested",
                    entry.name()
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Entries in resolution order
    pub fn iter(&self) -> impl Iterator<Item = &CredentialSpec> {
        self.entries.iter()
    }

    /// Entry names in resolution order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(CredentialSpec::name).collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; chains cannot be empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a CredentialChain {
    type Item = &'a CredentialSpec;
    type IntoIter = std::slice::Iter<'a, CredentialSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// The default chain: `client_secret`, `azure_cli`, `auth_code`, `device_code`
///
/// Non-interactive methods come first so no prompt is shown while a batch
/// credential is available.
#[must_use]
pub fn default_credential_chain() -> CredentialChain {
    CredentialChain {
        entries: vec![
            CredentialSpec::kind(CredentialKind::ClientSecret),
            CredentialSpec::kind(CredentialKind::AzureCli),
            CredentialSpec::kind(CredentialKind::AuthCode),
            CredentialSpec::kind(CredentialKind::DeviceCode),
        ],
    }
}

/// Build a chain from kinds or specs
///
/// ```
/// use azauth::{CredentialKind, credential_chain};
///
/// let chain = credential_chain([CredentialKind::AzureCli, CredentialKind::DeviceCode]).unwrap();
/// assert_eq!(chain.names(), ["azure_cli", "device_code"]);
/// ```
///
/// # Errors
///
/// As [`CredentialChain::new`].
pub fn credential_chain<I, S>(entries: I) -> Result<CredentialChain>
where
    I: IntoIterator<Item = S>,
    S: Into<CredentialSpec>,
{
    CredentialChain::new(entries.into_iter().map(Into::into).collect())
}
