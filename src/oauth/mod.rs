//! OAuth 2.0 client for Microsoft Entra token endpoints
//!
//! Wraps an [`oauth2`] client configured for the tenant-specific v2.0
//! endpoints and implements the grants the credentials need:
//!
//! - client credentials (application identity)
//! - refresh token
//! - authorization code with PKCE, redeemed through a local redirect listener
//! - device authorization (RFC 8628) with polling
//!
//! Endpoint errors are surfaced as [`AuthError::Authentication`] carrying the
//! provider's `error` and `error_description`; transport failures surface as
//! [`AuthError::Network`].

mod callback;
mod device;

pub use callback::{
    CallbackListener, REDIRECT_PORT_RANGE, check_redirect_uri, find_available_port,
    is_port_in_use, resolve_redirect_uri,
};
pub use device::{
    AzureDeviceFields, DeviceAuthorization, MAX_DEVICE_CODE_LIFETIME, MIN_POLL_INTERVAL,
};

use oauth2::basic::{BasicClient, BasicTokenResponse, BasicTokenType};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    DeviceAuthorizationUrl, EndpointNotSet, EndpointSet, ErrorResponseType, HttpClientError,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
    StandardErrorResponse, TokenResponse, TokenUrl,
};
use std::borrow::Cow;
use std::fmt;
use url::Url;

use crate::error::{AuthError, Result};
use crate::types::{TenantId, Token};
use crate::utils::truncate_for_display;

/// Lifetime assumed when a token response omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Client with authorize, device authorization and token endpoints set
type EntraClient = BasicClient<EndpointSet, EndpointSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Error type of every request made through the reqwest-backed client
pub(crate) type RequestError<T> = RequestTokenError<HttpClientError<reqwest::Error>, T>;

/// Tenant-specific OAuth endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Authorization endpoint (browser redirect)
    pub authorize: String,
    /// Token endpoint
    pub token: String,
    /// Device authorization endpoint
    pub device_code: String,
}

impl Endpoints {
    /// Build endpoints for `https://<authority>/<tenant>/oauth2/v2.0/...`
    ///
    /// `authority` must already carry its scheme, see
    /// [`Config::authority_url`](crate::Config::authority_url).
    #[must_use]
    pub fn new(authority: &str, tenant: &TenantId) -> Self {
        let base = format!("{}/{tenant}/oauth2/v2.0", authority.trim_end_matches('/'));
        Self {
            authorize: format!("{base}/authorize"),
            token: format!("{base}/token"),
            device_code: format!("{base}/devicecode"),
        }
    }
}

fn invalid_endpoint(which: &str, value: &str, e: impl fmt::Display) -> AuthError {
    AuthError::validation(format!("invalid {which} endpoint '{value}': {e}"))
}

/// Split a space-separated scope string into OAuth scopes
fn scopes(scope: &str) -> impl Iterator<Item = oauth2::Scope> + '_ {
    scope.split_whitespace().map(|s| oauth2::Scope::new(s.to_string()))
}

/// Convert a token endpoint response into a [`Token`]
pub(crate) fn token_from_response(response: &BasicTokenResponse) -> Token {
    let token_type = match response.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(name) => name.clone(),
    };
    Token::expiring_in(
        response.access_token().secret().clone(),
        Some(token_type),
        response
            .expires_in()
            .map_or(DEFAULT_EXPIRES_IN, |lifetime| lifetime.as_secs()),
        response.refresh_token().map(|t| t.secret().clone()),
    )
}

/// Map a failed token request into an [`AuthError`]
pub(crate) fn token_error<T>(err: RequestError<StandardErrorResponse<T>>) -> AuthError
where
    T: ErrorResponseType + fmt::Display + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            AuthError::authentication(match response.error_description() {
                Some(description) => format!("{}: {}", response.error(), description.trim()),
                None => response.error().to_string(),
            })
        }
        RequestTokenError::Request(HttpClientError::Reqwest(e)) => AuthError::Network(*e),
        RequestTokenError::Request(e) => {
            AuthError::authentication(format!("token request failed: {e}"))
        }
        RequestTokenError::Parse(e, body) => AuthError::authentication(format!(
            "failed to parse token response: {e} - response: {}",
            truncate_for_display(&String::from_utf8_lossy(&body), 200)
        )),
        other => AuthError::authentication(format!("token endpoint error: {other}")),
    }
}

/// OAuth client bound to one tenant's endpoints and one client ID
#[derive(Debug, Clone)]
pub struct OAuthClient {
    endpoints: Endpoints,
    client_id: String,
    inner: EntraClient,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Create a client for the given endpoints
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` if an endpoint is not a valid URL.
    pub fn new(endpoints: Endpoints, client_id: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        let inner = BasicClient::new(ClientId::new(client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(endpoints.authorize.clone())
                    .map_err(|e| invalid_endpoint("authorize", &endpoints.authorize, e))?,
            )
            .set_token_uri(
                TokenUrl::new(endpoints.token.clone())
                    .map_err(|e| invalid_endpoint("token", &endpoints.token, e))?,
            )
            .set_device_authorization_url(
                DeviceAuthorizationUrl::new(endpoints.device_code.clone())
                    .map_err(|e| invalid_endpoint("device code", &endpoints.device_code, e))?,
            )
            .set_auth_type(AuthType::RequestBody);

        // Token endpoints must never be followed across redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            endpoints,
            client_id,
            inner,
            http,
        })
    }

    /// Endpoints this client talks to
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Client ID sent with every grant
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client credentials grant
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` if the endpoint rejects the secret.
    pub async fn client_credentials(&self, client_secret: &str, scope: &str) -> Result<Token> {
        tracing::debug!(client_id = %self.client_id, scope, "Requesting client credentials token");
        let response = self
            .inner
            .clone()
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .exchange_client_credentials()
            .add_scopes(scopes(scope))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;
        Ok(token_from_response(&response))
    }

    /// Refresh token grant
    ///
    /// The old refresh token is kept when the response does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` if the refresh token is rejected.
    pub async fn refresh(&self, refresh_token: &str, scope: &str) -> Result<Token> {
        tracing::debug!(client_id = %self.client_id, scope, "Refreshing token");
        let refresh = RefreshToken::new(refresh_token.to_string());
        let response = self
            .inner
            .exchange_refresh_token(&refresh)
            .add_scopes(scopes(scope))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;

        let mut token = token_from_response(&response);
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    /// Redeem an authorization code
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` if the code or verifier is rejected.
    pub async fn exchange_code(
        &self,
        code: String,
        redirect_uri: &Url,
        code_verifier: PkceCodeVerifier,
        scope: &str,
    ) -> Result<Token> {
        tracing::debug!(client_id = %self.client_id, "Exchanging authorization code");
        let response = self
            .inner
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(code_verifier)
            .set_redirect_uri(Cow::Owned(RedirectUrl::from_url(redirect_uri.clone())))
            .add_extra_param("scope", scope)
            .request_async(&self.http)
            .await
            .map_err(token_error)?;
        Ok(token_from_response(&response))
    }

    /// Build the browser URL for the authorization code flow
    ///
    /// Returns the URL together with the `state` value the redirect must echo.
    #[must_use]
    pub fn authorize_url(
        &self,
        scope: &str,
        redirect_uri: &Url,
        code_challenge: PkceCodeChallenge,
    ) -> (Url, CsrfToken) {
        self.inner
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes(scope))
            .set_pkce_challenge(code_challenge)
            .set_redirect_uri(Cow::Owned(RedirectUrl::from_url(redirect_uri.clone())))
            .add_extra_param("response_mode", "query")
            .url()
    }
}
