//! Direct-credentials login client
//!
//! Thin client for the backend token endpoint's two non-OAuth shapes: the
//! form-encoded password grant and the JSON local-credentials variant. The
//! form rendering itself belongs to the host; this only owns the HTTP
//! contract and the outcome the UI renders.

use ab_config::LoginProvider;
use ab_types::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

/// Where the host navigates once a session is established
pub const AUTHENTICATED_ENTRY: &str = "/app";

const INCORRECT_CREDENTIALS: &str = "Incorrect username or password";

/// Outcome of one login call, ready for the UI to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Session established; navigate here and clear any error state.
    Authenticated { redirect_to: String },
    /// 401 from the backend; show the message, stay on the form.
    BadCredentials { message: String },
    /// Any other non-200; generic failure surfaced to the user.
    Failed { message: String },
}

#[derive(Serialize)]
struct JsonCredentials<'a> {
    username: &'a str,
    password: &'a str,
    provider: LoginProvider,
}

/// Client for the backend token endpoint's credential flows
pub struct LoginClient {
    client: Client,
    token_url: String,
}

impl LoginClient {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token_url: token_url.into(),
        }
    }

    /// Password-grant login, form-encoded.
    pub async fn login_form(&self, username: &str, password: &str) -> AppResult<LoginOutcome> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("username", username),
                ("password", password),
                ("grant_type", "password"),
            ])
            .send()
            .await
            .map_err(|e| AppError::OAuth(format!("Failed to send login request: {}", e)))?;

        Ok(Self::outcome(response.status()))
    }

    /// Local-credentials login, JSON body with the configured provider.
    pub async fn login_json(
        &self,
        username: &str,
        password: &str,
        provider: LoginProvider,
    ) -> AppResult<LoginOutcome> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&JsonCredentials {
                username,
                password,
                provider,
            })
            .send()
            .await
            .map_err(|e| AppError::OAuth(format!("Failed to send login request: {}", e)))?;

        Ok(Self::outcome(response.status()))
    }

    fn outcome(status: StatusCode) -> LoginOutcome {
        match status {
            StatusCode::OK => {
                info!("Login succeeded; navigating to {}", AUTHENTICATED_ENTRY);
                LoginOutcome::Authenticated {
                    redirect_to: AUTHENTICATED_ENTRY.to_string(),
                }
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Login rejected: bad credentials");
                LoginOutcome::BadCredentials {
                    message: INCORRECT_CREDENTIALS.to_string(),
                }
            }
            other => {
                warn!("Login failed with status {}", other);
                LoginOutcome::Failed {
                    message: format!("Sign-in failed ({})", other),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_form_login_success_navigates_to_app() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=alice"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = LoginClient::new(format!("{}/api/token", server.uri()));
        let outcome = client.login_form("alice", "secret").await.unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::Authenticated {
                redirect_to: "/app".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_form_login_401_reports_incorrect_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = LoginClient::new(format!("{}/api/token", server.uri()));
        let outcome = client.login_form("alice", "wrong").await.unwrap();
        // No navigation on bad credentials, just a user-visible message
        assert_eq!(
            outcome,
            LoginOutcome::BadCredentials {
                message: "Incorrect username or password".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_json_login_sends_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("content-type", "application/json"))
            .and(body_string_contains("\"provider\":\"ldap\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = LoginClient::new(format!("{}/api/token", server.uri()));
        let outcome = client
            .login_json("alice", "secret", LoginProvider::Ldap)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
    }

    #[tokio::test]
    async fn test_other_status_is_generic_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = LoginClient::new(format!("{}/api/token", server.uri()));
        let outcome = client.login_form("alice", "secret").await.unwrap();
        match outcome {
            LoginOutcome::Failed { message } => assert!(message.contains("503")),
            other => panic!("expected generic failure, got {:?}", other),
        }
    }
}
