//! Error types for credential resolution and token acquisition

use std::fmt;
use thiserror::Error;

/// Failure recorded for a single candidate while walking a credential chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    /// Name of the chain entry
    pub name: String,
    /// Why the entry could not produce a token
    pub message: String,
}

impl ResolutionError {
    /// Create a new resolution error
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

fn render_failures(failures: &[ResolutionError]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n  - {failure}"))
        .collect()
}

fn render_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed tenant, scope, redirect URI or a missing required secret
    #[error("Validation error: {0}")]
    Validation(String),

    /// The identity provider rejected the request
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// CLI executable could not be located on the search path
    #[error("CLI executable not found: {0}")]
    CliNotFound(String),

    /// CLI exited with a non-zero status
    #[error("CLI command `{command}` failed (exit code {}): {output}", render_exit_code(.exit_code))]
    CliExecution {
        /// Command line that was run, without the executable path
        command: String,
        /// Process exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Combined stdout and stderr
        output: String,
    },

    /// CLI did not finish within the process timeout
    #[error("CLI command `{command}` timed out after {timeout_secs} seconds")]
    CliTimeout {
        /// Command line that was run
        command: String,
        /// Configured timeout in seconds
        timeout_secs: u64,
    },

    /// CLI succeeded but wrote nothing to stdout
    #[error("CLI command `{0}` produced no output")]
    CliEmptyOutput(String),

    /// CLI output was not the expected JSON document
    #[error("Invalid CLI response: {message}")]
    CliInvalidResponse {
        /// Description of the problem
        message: String,
        /// Required fields that were absent
        missing: Vec<String>,
    },

    /// The CLI has no signed-in account
    #[error("Not logged in to {0}. Run `{0} login` or enable login_on_missing")]
    NotLoggedIn(String),

    /// An interactive credential was used outside an interactive session
    #[error("Interactive session required: {0}")]
    NonInteractiveSession(String),

    /// The user cancelled an interactive flow
    #[error("Authentication interrupted by user")]
    Interrupted,

    /// A credential chain was built without entries
    #[error("Credential chain must contain at least one credential")]
    CredentialChainEmpty,

    /// Every candidate in the chain failed
    #[error("All credentials in the chain failed:{}", render_failures(.failures))]
    AllCredentialsFailed {
        /// Per-candidate failures in chain order
        failures: Vec<ResolutionError>,
    },

    /// An authorized API request returned a non-success status
    #[error("Request failed with status {status}: {body}")]
    RequestFailed {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Token cache could not be read or written
    #[error("Token cache error: {0}")]
    Cache(String),

    /// HTTP transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a CLI not found error
    pub fn cli_not_found(executable: impl Into<String>) -> Self {
        Self::CliNotFound(executable.into())
    }

    /// Create a CLI execution error
    pub fn cli_execution(
        command: impl Into<String>,
        exit_code: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        Self::CliExecution {
            command: command.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Create a CLI timeout error
    pub fn cli_timeout(command: impl Into<String>, timeout_secs: u64) -> Self {
        Self::CliTimeout {
            command: command.into(),
            timeout_secs,
        }
    }

    /// Create an invalid CLI response error naming the absent fields
    pub fn cli_missing_fields(missing: Vec<String>) -> Self {
        Self::CliInvalidResponse {
            message: format!("missing required field(s): {}", missing.join(", ")),
            missing,
        }
    }

    /// Create an invalid CLI response error with a free-form message
    pub fn cli_invalid_response(msg: impl Into<String>) -> Self {
        Self::CliInvalidResponse {
            message: msg.into(),
            missing: Vec::new(),
        }
    }

    /// Create a non-interactive session error
    pub fn non_interactive(what: impl Into<String>) -> Self {
        Self::NonInteractiveSession(what.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Whether the user cancelled an interactive flow
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Whether this error came from the CLI process backend
    #[must_use]
    pub fn is_cli_error(&self) -> bool {
        matches!(
            self,
            Self::CliNotFound(_)
                | Self::CliExecution { .. }
                | Self::CliTimeout { .. }
                | Self::CliEmptyOutput(_)
                | Self::CliInvalidResponse { .. }
                | Self::NotLoggedIn(_)
        )
    }

    /// Per-candidate failures when every chain entry failed
    #[must_use]
    pub fn failures(&self) -> Option<&[ResolutionError]> {
        match self {
            Self::AllCredentialsFailed { failures } => Some(failures),
            _ => None,
        }
    }
}
