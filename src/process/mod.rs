//! Azure CLI process backend
//!
//! Locates the CLI executable and runs it as a child process with piped
//! stdio and a hard wall-clock limit. Every failure is normalized into the
//! `Cli*` error variants:
//!
//! - the executable cannot be found: [`AuthError::CliNotFound`]
//! - exit code 124, SIGKILL/SIGTERM, or the timeout elapsing: [`AuthError::CliTimeout`]
//! - any other non-zero exit: [`AuthError::CliExecution`] with stdout and stderr
//! - a successful run with blank stdout: [`AuthError::CliEmptyOutput`]

mod login;

pub use login::{DevicePrompt, LOGIN_TIMEOUT, parse_device_prompt};

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::config::DEFAULT_PROCESS_TIMEOUT;
use crate::error::{AuthError, Result};
use crate::utils::truncate_for_display;

/// Exit code used by `timeout(1)` and the CLI for timed-out commands
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const MAX_DIAGNOSTIC_OUTPUT: usize = 4000;

/// A located CLI executable
#[derive(Debug, Clone)]
pub struct CliProcess {
    path: PathBuf,
    program: String,
    timeout: Duration,
}

impl CliProcess {
    /// Locate `executable` on the search path or in common install locations
    ///
    /// A value containing a path separator is used as-is.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CliNotFound` if no matching file exists.
    pub fn find(executable: &str) -> Result<Self> {
        let path = Self::locate(executable).ok_or_else(|| AuthError::cli_not_found(executable))?;
        tracing::debug!(path = %path.display(), "Located CLI executable");

        let program = Path::new(executable)
            .file_name()
            .map_or_else(|| executable.to_string(), |n| n.to_string_lossy().into_owned());

        Ok(Self {
            path,
            program,
            timeout: DEFAULT_PROCESS_TIMEOUT,
        })
    }

    fn locate(executable: &str) -> Option<PathBuf> {
        let candidate = Path::new(executable);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }

        if let Ok(path) = which::which(executable) {
            return Some(path);
        }

        let mut locations = vec![
            PathBuf::from("/usr/bin").join(executable),
            PathBuf::from("/usr/local/bin").join(executable),
            PathBuf::from("/opt/homebrew/bin").join(executable),
        ];
        if let Some(home) = dirs::home_dir() {
            locations.push(home.join(".local/bin").join(executable));
            locations.push(home.join("bin").join(executable));
        }

        locations.into_iter().find(|path| path.is_file())
    }

    /// Set the wall-clock limit for each invocation
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full path of the executable
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Executable name used in messages, e.g. `az`
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wall-clock limit for each invocation
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command_line(&self, args: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run the CLI and return its trimmed stdout
    ///
    /// The child is killed if it outlives the timeout.
    ///
    /// # Errors
    ///
    /// Returns one of the `Cli*` variants described in the module docs.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let command_line = self.command_line(args);
        tracing::debug!(command = %command_line, timeout_secs = self.timeout.as_secs(), "Running CLI");

        let child = self.command(args).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuthError::cli_not_found(self.path.display().to_string())
            } else {
                AuthError::Io(e)
            }
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(command = %command_line, "CLI timed out, killing process");
                return Err(AuthError::cli_timeout(command_line, self.timeout.as_secs()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            if is_timeout_status(&output.status) {
                return Err(AuthError::cli_timeout(command_line, self.timeout.as_secs()));
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
            return Err(AuthError::cli_execution(
                command_line,
                output.status.code(),
                truncate_for_display(combined.trim(), MAX_DIAGNOSTIC_OUTPUT),
            ));
        }

        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Err(AuthError::CliEmptyOutput(command_line));
        }
        Ok(stdout.to_string())
    }

    /// Run the CLI and parse its stdout as JSON
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run), plus `AuthError::CliInvalidResponse` for
    /// output that is not JSON.
    pub async fn run_json(&self, args: &[&str]) -> Result<serde_json::Value> {
        let stdout = self.run(args).await?;
        serde_json::from_str(&stdout).map_err(|e| {
            AuthError::cli_invalid_response(format!(
                "output of `{}` is not JSON: {e}",
                self.command_line(args)
            ))
        })
    }
}

/// Exit code 124, or death by SIGKILL/SIGTERM
fn is_timeout_status(status: &ExitStatus) -> bool {
    if status.code() == Some(TIMEOUT_EXIT_CODE) {
        return true;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        const SIGKILL: i32 = 9;
        const SIGTERM: i32 = 15;
        if matches!(status.signal(), Some(SIGKILL | SIGTERM)) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable() {
        let err = CliProcess::find("definitely-not-a-real-cli-7f3a").unwrap_err();
        assert!(matches!(err, AuthError::CliNotFound(_)));

        let err = CliProcess::find("/nonexistent/dir/az").unwrap_err();
        assert!(matches!(err, AuthError::CliNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_line_uses_program_name() {
        let cli = CliProcess::find("/bin/sh").unwrap();
        assert_eq!(cli.program(), "sh");
        assert_eq!(cli.command_line(&["account", "show"]), "sh account show");
        assert_eq!(cli.timeout(), DEFAULT_PROCESS_TIMEOUT);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_statuses() {
        use std::os::unix::process::ExitStatusExt;

        assert!(is_timeout_status(&ExitStatus::from_raw(124 << 8)));
        assert!(is_timeout_status(&ExitStatus::from_raw(9)));
        assert!(is_timeout_status(&ExitStatus::from_raw(15)));
        assert!(!is_timeout_status(&ExitStatus::from_raw(1 << 8)));
        assert!(!is_timeout_status(&ExitStatus::from_raw(0)));
    }
}
