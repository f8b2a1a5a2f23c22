//! Loopback listener for the authorization code redirect

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::error::{AuthError, Result};

/// Ports tried when the redirect URI does not name one
pub const REDIRECT_PORT_RANGE: RangeInclusive<u16> = 1410..=1450;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const MAX_REQUEST_BYTES: u64 = 16 * 1024;

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>Signed in</title></head>\
<body><h1>Authentication complete</h1><p>You can close this window and return to the terminal.</p></body></html>";

/// Check whether something is already listening on a local port
pub async fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// First free port in `range`
///
/// # Errors
///
/// Returns `AuthError::Validation` if every port in the range is taken.
pub async fn find_available_port(range: RangeInclusive<u16>) -> Result<u16> {
    let (start, end) = (*range.start(), *range.end());
    for port in range {
        if !is_port_in_use(port).await {
            return Ok(port);
        }
    }
    Err(AuthError::validation(format!(
        "no free port for the redirect listener in {start}-{end}"
    )))
}

/// Check that a redirect URI is an `http` loopback URL
///
/// # Errors
///
/// Returns `AuthError::Validation` otherwise.
pub fn check_redirect_uri(redirect_uri: &str) -> Result<Url> {
    let url = Url::parse(redirect_uri).map_err(|e| {
        AuthError::validation(format!("invalid redirect URI '{redirect_uri}': {e}"))
    })?;

    if url.scheme() != "http" {
        return Err(AuthError::validation(format!(
            "redirect URI '{redirect_uri}' must use http"
        )));
    }
    if !matches!(url.host_str(), Some("localhost" | "127.0.0.1")) {
        return Err(AuthError::validation(format!(
            "redirect URI '{redirect_uri}' must point to localhost"
        )));
    }
    Ok(url)
}

/// Validate a loopback redirect URI, filling in a free port when it has none
///
/// # Errors
///
/// Returns `AuthError::Validation` if the URI is not an `http` loopback URL
/// or no port in [`REDIRECT_PORT_RANGE`] is free.
pub async fn resolve_redirect_uri(redirect_uri: &str) -> Result<Url> {
    let mut url = check_redirect_uri(redirect_uri)?;
    if url.port().is_none() {
        let port = find_available_port(REDIRECT_PORT_RANGE).await?;
        url.set_port(Some(port)).map_err(|()| {
            AuthError::validation(format!("cannot set port on redirect URI '{redirect_uri}'"))
        })?;
    }
    Ok(url)
}

/// One-shot HTTP listener that captures the authorization code
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Bind to the port named by a resolved redirect URI
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Io` if the port cannot be bound.
    pub async fn bind(redirect: &Url) -> Result<Self> {
        let port = redirect.port_or_known_default().unwrap_or(80);
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
        tracing::debug!(port, "Redirect listener bound");
        Ok(Self {
            listener,
            path: redirect.path().to_string(),
        })
    }

    /// Port the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Io` if the socket address cannot be read.
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept redirects until one arrives on the callback path
    ///
    /// Requests for other paths (a browser fetching its favicon, for instance)
    /// get a 404 and are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` if the provider reports an error,
    /// the `state` does not match, or no code is present.
    pub async fn wait_for_code(&self, expected_state: &str) -> Result<String> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            let (reader, mut writer) = stream.split();

            let mut reader = BufReader::new(reader.take(MAX_REQUEST_BYTES));
            let mut request_line = String::new();
            reader.read_line(&mut request_line).await?;
            drain_headers(&mut reader).await;

            let Some(target) = request_target(&request_line) else {
                tracing::debug!(%peer, "Malformed request on redirect listener");
                respond(&mut writer, "400 Bad Request", "Bad request").await;
                continue;
            };

            let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
                respond(&mut writer, "400 Bad Request", "Bad request").await;
                continue;
            };
            if url.path() != self.path {
                respond(&mut writer, "404 Not Found", "Not found").await;
                continue;
            }

            let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

            if let Some(error) = params.get("error") {
                respond(&mut writer, "400 Bad Request", "Authentication failed").await;
                let message = match params.get("error_description") {
                    Some(description) => format!("{error}: {description}"),
                    None => error.clone(),
                };
                return Err(AuthError::authentication(message));
            }

            if params.get("state").map(String::as_str) != Some(expected_state) {
                respond(&mut writer, "400 Bad Request", "State mismatch").await;
                return Err(AuthError::authentication(
                    "redirect state does not match the request",
                ));
            }

            let Some(code) = params.get("code") else {
                respond(&mut writer, "400 Bad Request", "Missing code").await;
                return Err(AuthError::authentication("redirect carried no authorization code"));
            };

            respond(&mut writer, "200 OK", SUCCESS_PAGE).await;
            return Ok(code.clone());
        }
    }
}

/// Extract the target from `GET <target> HTTP/1.1`
fn request_target(line: &str) -> Option<&str> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) if target.starts_with('/') => Some(target),
        _ => None,
    }
}

/// Consume header lines up to the blank line ending the request head
async fn drain_headers<R>(reader: &mut R)
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) if line.trim().is_empty() => break,
            Ok(_) => {}
        }
    }
}

async fn respond<W>(writer: &mut W, status: &str, body: &str)
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = writer.write_all(response.as_bytes()).await {
        tracing::debug!("Failed to answer redirect request: {e}");
    }
    let _ = writer.shutdown().await;
}
