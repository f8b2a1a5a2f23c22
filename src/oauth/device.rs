//! Device authorization grant (RFC 8628)

use oauth2::basic::BasicErrorResponseType;
use oauth2::{
    DeviceAuthorizationResponse, DeviceCodeErrorResponse, DeviceCodeErrorResponseType,
    ExtraDeviceAuthorizationFields, RequestTokenError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{OAuthClient, RequestError, scopes, token_error, token_from_response};
use crate::error::{AuthError, Result};
use crate::types::Token;

/// Shortest wait between two polls, whatever interval the server asks for
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest time a device code is polled for
pub const MAX_DEVICE_CODE_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Entra-specific fields of the device authorization response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureDeviceFields {
    /// Human-readable instructions from the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExtraDeviceAuthorizationFields for AzureDeviceFields {}

/// Response from the device authorization endpoint
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    details: DeviceAuthorizationResponse<AzureDeviceFields>,
}

impl From<DeviceAuthorizationResponse<AzureDeviceFields>> for DeviceAuthorization {
    fn from(details: DeviceAuthorizationResponse<AzureDeviceFields>) -> Self {
        Self { details }
    }
}

impl DeviceAuthorization {
    /// Code the user types on the verification page
    #[must_use]
    pub fn user_code(&self) -> &str {
        self.details.user_code().secret()
    }

    /// Page where the user enters the code
    #[must_use]
    pub fn verification_uri(&self) -> &str {
        self.details.verification_uri().as_str()
    }

    /// Text to show the user
    #[must_use]
    pub fn instructions(&self) -> String {
        self.details.extra_fields().message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                self.verification_uri(),
                self.user_code()
            )
        })
    }

    /// Polling interval requested by the server, at least [`MIN_POLL_INTERVAL`]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        poll_delay(self.details.interval())
    }

    /// Lifetime of the device code, at most [`MAX_DEVICE_CODE_LIFETIME`]
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.details.expires_in().min(MAX_DEVICE_CODE_LIFETIME)
    }
}

fn poll_delay(interval: Duration) -> Duration {
    interval.max(MIN_POLL_INTERVAL)
}

fn device_error(err: RequestError<DeviceCodeErrorResponse>) -> AuthError {
    if let RequestTokenError::ServerResponse(response) = &err {
        match response.error() {
            DeviceCodeErrorResponseType::ExpiredToken => {
                return AuthError::authentication("device code expired before sign-in completed");
            }
            DeviceCodeErrorResponseType::AccessDenied => {
                return AuthError::authentication("sign-in was declined by the user");
            }
            DeviceCodeErrorResponseType::Basic(BasicErrorResponseType::Extension(code)) => {
                match code.as_str() {
                    "code_expired" => {
                        return AuthError::authentication(
                            "device code expired before sign-in completed",
                        );
                    }
                    "authorization_declined" => {
                        return AuthError::authentication("sign-in was declined by the user");
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    token_error(err)
}

impl OAuthClient {
    /// Start a device authorization
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` if the endpoint rejects the request.
    pub async fn request_device_code(&self, scope: &str) -> Result<DeviceAuthorization> {
        tracing::debug!(client_id = %self.client_id, scope, "Requesting device code");
        let details: DeviceAuthorizationResponse<AzureDeviceFields> = self
            .inner
            .exchange_device_code()
            .add_scopes(scopes(scope))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;
        Ok(details.into())
    }

    /// Poll the token endpoint until the user completes sign-in
    ///
    /// Polls at the server's interval (never faster than
    /// [`MIN_POLL_INTERVAL`]), backs off on `slow_down`, and gives up once the
    /// device code's lifetime passes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Authentication` if the code expires, the user
    /// declines, or the server reports any other error.
    pub async fn poll_device_code(&self, device: &DeviceAuthorization) -> Result<Token> {
        let response = self
            .inner
            .exchange_device_access_token(&device.details)
            .request_async(
                &self.http,
                |interval| {
                    tracing::trace!(interval_secs = interval.as_secs(), "Device authorization pending");
                    tokio::time::sleep(poll_delay(interval))
                },
                Some(device.lifetime()),
            )
            .await
            .map_err(device_error)?;
        Ok(token_from_response(&response))
    }
}
