//! Code-for-token exchange against the backend token endpoint
//!
//! The backend endpoint is an opaque HTTP contract: the broker POSTs the
//! authorization code with query parameters and either gets a session
//! (possibly cookie-based, with an empty body) or a token payload back.

use ab_config::ProviderDescriptor;
use ab_types::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Token payload returned by the backend on a successful exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokenPayload {
    pub access_token: String,

    #[serde(default)]
    pub token_type: String,

    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

/// Performs the single code-for-token HTTP call of an attempt
pub struct TokenExchanger {
    client: Client,
}

impl TokenExchanger {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Exchange an authorization code at the descriptor's exchange endpoint.
    ///
    /// Returns `Ok(None)` when the backend established a cookie session and
    /// sent no token body. Any non-2xx response is an error carrying the
    /// backend's status; never a silent success.
    pub async fn exchange_code(
        &self,
        descriptor: &ProviderDescriptor,
        code: &str,
        state: &str,
    ) -> AppResult<Option<AuthTokenPayload>> {
        let Some(exchange_url) = descriptor.exchange_url.as_deref() else {
            return Err(AppError::OAuth(
                "No token exchange endpoint configured".to_string(),
            ));
        };

        info!(
            "Exchanging authorization code for provider {}",
            descriptor.provider
        );

        let response = self
            .client
            .post(exchange_url)
            .query(&[
                ("client_id", descriptor.client_id.as_str()),
                ("provider", descriptor.provider.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", descriptor.redirect_uri.as_str()),
                ("state", state),
            ])
            .send()
            .await
            .map_err(|e| AppError::OAuth(format!("Failed to send token request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token exchange failed with status {}: {}", status, body);
            return Err(AppError::OAuth(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let body = response.text().await.unwrap_or_default();
        if body.trim().is_empty() {
            debug!("Exchange response has no body; cookie session assumed");
            return Ok(None);
        }

        match serde_json::from_str::<AuthTokenPayload>(&body) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                debug!("Exchange response body is not a token payload: {}", e);
                Ok(None)
            }
        }
    }
}

impl Default for TokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}
