//! Small helpers shared across modules

use std::future::Future;
use std::io::IsTerminal;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, Result};

/// Safely truncate a string at a UTF-8 character boundary.
///
/// Returns a slice of at most `max_bytes` bytes.
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    &s[..boundary]
}

/// Truncate a string for display, appending "..." if anything was cut.
///
/// Used to keep CLI output and response bodies in error messages readable.
///
/// # Example
/// ```
/// use azauth::utils::truncate_for_display;
///
/// assert_eq!(truncate_for_display("This is a long message", 10), "This is a ...");
/// ```
#[must_use]
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    let truncated = safe_truncate(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

/// Parse a boolean flag as written in environment variables
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether both stdin and stderr are attached to a terminal
///
/// Prompts are written to stderr and answers (if any) read from stdin, so
/// both need a user on the other end.
#[must_use]
pub fn is_terminal_session() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

/// Open a URL in the system browser, logging a warning on failure
pub fn open_in_browser(url: &str) {
    if let Err(e) = webbrowser::open(url) {
        tracing::warn!("Could not open browser for {url}: {e}");
    }
}

/// Run an interactive step until it finishes or `cancel` fires
///
/// With `handle_ctrl_c` set, Ctrl-C also interrupts the step. The first
/// `ctrl_c()` listener replaces the process's default SIGINT handling for
/// good, so this is only done when the caller opted in.
///
/// Interruptions yield [`AuthError::Interrupted`]; the step's future is
/// dropped, which kills any child process spawned with `kill_on_drop`.
pub async fn interruptible<F, T>(cancel: &CancellationToken, handle_ctrl_c: bool, step: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let ctrl_c = async {
        if handle_ctrl_c {
            tokio::signal::ctrl_c().await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        result = step => result,
        Ok(()) = ctrl_c => {
            tracing::debug!("Interactive authentication interrupted by Ctrl-C");
            Err(AuthError::Interrupted)
        }
        () = cancel.cancelled() => {
            tracing::debug!("Interactive authentication cancelled");
            Err(AuthError::Interrupted)
        }
    }
}
