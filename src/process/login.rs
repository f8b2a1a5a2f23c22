//! Interactive `login` and `logout` through the CLI

use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::CliProcess;
use crate::error::{AuthError, Result};
use crate::utils::{interruptible, open_in_browser, truncate_for_display};

/// Upper bound on an interactive CLI login
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(15 * 60);

static DEVICE_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)open the page\s+(\S+)\s+and enter the code\s+([A-Z0-9-]+)")
        .expect("device prompt pattern is valid")
});

/// Verification page and user code scraped from the CLI's login prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePrompt {
    /// Page the user opens
    pub url: String,
    /// Code the user enters
    pub code: String,
}

/// Match the CLI's device-code prompt in one line of stderr
#[must_use]
pub fn parse_device_prompt(line: &str) -> Option<DevicePrompt> {
    let captures = DEVICE_PROMPT.captures(line)?;
    Some(DevicePrompt {
        url: captures[1].to_string(),
        code: captures[2].to_string(),
    })
}

impl CliProcess {
    /// Sign in with `login --use-device-code`
    ///
    /// CLI prompts are relayed to stderr. When the device-code prompt is
    /// seen, the verification page is opened if `open_browser` is set;
    /// failing to open it only logs a warning.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Interrupted` on cancellation (or Ctrl-C when
    /// `handle_ctrl_c` is set),
    /// `AuthError::CliTimeout` after [`LOGIN_TIMEOUT`], and
    /// `AuthError::CliExecution` if the CLI exits with an error.
    pub async fn login(
        &self,
        tenant: Option<&str>,
        open_browser: bool,
        handle_ctrl_c: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut args = vec!["login", "--use-device-code", "--output", "json"];
        if let Some(tenant) = tenant {
            args.extend(["--tenant", tenant]);
        }
        let command_line = self.command_line(&args);
        tracing::info!(command = %command_line, "Starting CLI login");

        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::inherit());
        let mut child = cmd.spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AuthError::cli_invalid_response("login stderr was not captured"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AuthError::cli_invalid_response("login stdout was not captured"))?;

        let session = async {
            let drain_stdout = async {
                let mut buf = String::new();
                stdout.read_to_string(&mut buf).await.map(|_| buf)
            };

            let relay_stderr = async {
                let mut lines = BufReader::new(stderr).lines();
                let mut captured = String::new();
                let mut prompted = false;
                while let Some(line) = lines.next_line().await? {
                    eprintln!("{line}");
                    if let Some(prompt) = parse_device_prompt(&line).filter(|_| !prompted) {
                        prompted = true;
                        tracing::debug!(url = %prompt.url, "Device code prompt detected");
                        if open_browser {
                            open_in_browser(&prompt.url);
                        }
                    }
                    captured.push_str(&line);
                    captured.push('\n');
                }
                Ok::<_, std::io::Error>(captured)
            };

            let (out, err) = tokio::try_join!(drain_stdout, relay_stderr)?;
            let status = child.wait().await?;
            Ok::<_, AuthError>((status, out, err))
        };

        let bounded = async {
            tokio::time::timeout(LOGIN_TIMEOUT, session)
                .await
                .map_err(|_| AuthError::cli_timeout(command_line.clone(), LOGIN_TIMEOUT.as_secs()))?
        };

        let (status, out, err) = interruptible(cancel, handle_ctrl_c, bounded).await?;
        if !status.success() {
            let combined = format!("{}\n{}", out.trim(), err.trim());
            return Err(AuthError::cli_execution(
                command_line,
                status.code(),
                truncate_for_display(combined.trim(), 4000),
            ));
        }

        tracing::info!("CLI login completed");
        Ok(())
    }

    /// Sign out with `logout`
    ///
    /// A failing logout is logged as a warning and not returned.
    pub async fn logout(&self) {
        let args = ["logout"];
        let output = match tokio::time::timeout(self.timeout, self.command(&args).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Could not run `{}`: {e}", self.command_line(&args));
                return;
            }
            Err(_) => {
                tracing::warn!("`{}` timed out", self.command_line(&args));
                return;
            }
        };

        if output.status.success() {
            tracing::info!("Logged out of {}", self.program);
        } else {
            tracing::warn!(
                exit_code = ?output.status.code(),
                "`{}` failed: {}",
                self.command_line(&args),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_prompt() {
        let line = "To sign in, use a web browser to open the page https://microsoft.com/devicelogin \
                    and enter the code ABCD1234E to authenticate.";
        let prompt = parse_device_prompt(line).unwrap();
        assert_eq!(prompt.url, "https://microsoft.com/devicelogin");
        assert_eq!(prompt.code, "ABCD1234E");
    }

    #[test]
    fn test_unrelated_lines_do_not_match() {
        assert!(parse_device_prompt("WARNING: A web browser has been opened").is_none());
        assert!(parse_device_prompt("").is_none());
    }
}
