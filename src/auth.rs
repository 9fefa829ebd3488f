//! Password-grant token exchange against the Dataspace identity service.
use crate::error::AuthenticationError;
use crate::settings::Settings;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Account credentials. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Short-lived access token. Fetched for a single download and then dropped.
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Anything that can exchange credentials for a bearer token.
pub trait TokenSource {
    async fn acquire_token(
        &self,
        credentials: &Credentials,
    ) -> Result<BearerToken, AuthenticationError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct TokenProvider {
    client: Client,
    endpoint: String,
    client_id: String,
    timeout: Duration,
}

impl TokenProvider {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            endpoint: settings.identity_url.to_string(),
            client_id: settings.client_id.clone(),
            timeout: settings.request_timeout(),
        }
    }

    fn transport_error(&self, source: reqwest::Error) -> AuthenticationError {
        AuthenticationError::Transport {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

impl TokenSource for TokenProvider {
    async fn acquire_token(
        &self,
        credentials: &Credentials,
    ) -> Result<BearerToken, AuthenticationError> {
        debug!(user = credentials.username(), "Requesting access token");
        let form = [
            ("client_id", self.client_id.as_str()),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("grant_type", "password"),
        ];
        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await;

        if !status.is_success() {
            return Err(AuthenticationError::Rejected {
                endpoint: self.endpoint.clone(),
                status,
                body: describe_body(text),
            });
        }

        let text = text.map_err(|e| self.transport_error(e))?;
        let parsed: TokenResponse =
            serde_json::from_str(&text).map_err(|e| AuthenticationError::MalformedResponse {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })?;
        Ok(BearerToken::new(parsed.access_token))
    }
}

/// Best-effort rendering of an error body: compact JSON when it parses,
/// the raw text otherwise, and the read failure if there is no body at all.
fn describe_body(body: reqwest::Result<String>) -> String {
    match body {
        Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => json.to_string(),
            Err(_) if text.trim().is_empty() => "<empty body>".to_string(),
            Err(_) => text,
        },
        Err(e) => format!("<unreadable body: {e}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use url::Url;

    fn provider(server: &MockServer) -> TokenProvider {
        let settings = Settings {
            identity_url: Url::parse(&server.url("/token")).unwrap(),
            ..Settings::default()
        };
        TokenProvider::new(settings.http_client().unwrap(), &settings)
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = Credentials::new("alice", "hunter2");
        let printed = format!("{credentials:?}");
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));

        let token = BearerToken::new("eyJhbGciOi");
        assert!(!format!("{token:?}").contains("eyJhbGciOi"));
    }

    #[tokio::test]
    async fn test_acquire_token_sends_password_grant() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .x_www_form_urlencoded_tuple("client_id", "cdse-public")
                    .x_www_form_urlencoded_tuple("username", "alice")
                    .x_www_form_urlencoded_tuple("password", "hunter2")
                    .x_www_form_urlencoded_tuple("grant_type", "password");
                then.status(200)
                    .json_body(serde_json::json!({"access_token": "tok-1", "expires_in": 600}));
            })
            .await;

        let token = provider(&server)
            .acquire_token(&Credentials::new("alice", "hunter2"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(token.secret(), "tok-1");
    }

    #[tokio::test]
    async fn test_rejected_credentials_carry_parsed_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(401).json_body(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid user credentials"
                }));
            })
            .await;

        let err = provider(&server)
            .acquire_token(&Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();

        match err {
            AuthenticationError::Rejected { status, body, .. } => {
                assert_eq!(status.as_u16(), 401);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_with_unparsable_body_still_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(503).body("<html>Service Unavailable</html>");
            })
            .await;

        let err = provider(&server)
            .acquire_token(&Credentials::new("alice", "hunter2"))
            .await
            .unwrap_err();

        match err {
            AuthenticationError::Rejected { status, body, .. } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "<html>Service Unavailable</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_without_token_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200).json_body(serde_json::json!({"token_type": "Bearer"}));
            })
            .await;

        let err = provider(&server)
            .acquire_token(&Credentials::new("alice", "hunter2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::MalformedResponse { .. }));
    }
}
