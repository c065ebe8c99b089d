//! Outbound calls to the external identity provider.
//!
//! Implementations:
//! - `HttpIdentityProvider` - reqwest client with a per-request timeout
//! - test stubs implement the trait directly

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::IdpEndpoint;
use crate::error::{OAuthError, Result};

/// Default bound on every outbound IdP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters for the IdP's authorization-code exchange.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
}

/// The part of the IdP token response the bridge needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalTokenSet {
    pub access_token: String,
    /// Issuer/instance base URL that serves user-info for this token.
    pub instance_url: String,
}

/// The external identity behind an IdP access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    #[serde(rename = "user_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub organization_id: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Trade an external authorization code for an external access token.
    async fn exchange_code(&self, idp: &IdpEndpoint, exchange: CodeExchange<'_>) -> Result<ExternalTokenSet>;

    /// Fetch the identity behind an external access token.
    async fn user_info(&self, access_token: &str, instance_url: &str) -> Result<ExternalIdentity>;
}

#[derive(Debug, Deserialize)]
struct IdpErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// reqwest-backed provider. Every request is bounded by the client timeout,
/// and dropping the returned future cancels the request.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    http: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OAuthError::ServerError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

fn unreachable_idp(e: reqwest::Error) -> OAuthError {
    if e.is_timeout() {
        OAuthError::ServerError("identity provider timed out".into())
    } else {
        OAuthError::ServerError(format!("identity provider unreachable: {e}"))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(&self, idp: &IdpEndpoint, exchange: CodeExchange<'_>) -> Result<ExternalTokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", exchange.code),
            ("client_id", exchange.client_id),
            ("client_secret", exchange.client_secret),
            ("redirect_uri", exchange.redirect_uri),
        ];
        let response = self
            .http
            .post(idp.token_url())
            .form(&form)
            .send()
            .await
            .map_err(unreachable_idp)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<ExternalTokenSet>()
                .await
                .map_err(|e| OAuthError::ServerError(format!("unexpected token response: {e}")));
        }

        // A rejected code is the caller's problem; anything else is ours.
        let body = response.json::<IdpErrorBody>().await.ok();
        match body {
            Some(body) if status.is_client_error() && body.error == "invalid_grant" => {
                Err(OAuthError::InvalidGrant(
                    body.error_description
                        .unwrap_or_else(|| "external authorization code rejected".into()),
                ))
            }
            _ => Err(OAuthError::ServerError(format!(
                "identity provider token endpoint returned {status}"
            ))),
        }
    }

    async fn user_info(&self, access_token: &str, instance_url: &str) -> Result<ExternalIdentity> {
        let url = format!("{}/services/oauth2/userinfo", instance_url.trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(unreachable_idp)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::ServerError(format!(
                "identity provider user-info returned {status}"
            )));
        }
        response
            .json::<ExternalIdentity>()
            .await
            .map_err(|e| OAuthError::ServerError(format!("unexpected user-info response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn idp(server: &MockServer) -> IdpEndpoint {
        IdpEndpoint {
            login_url: server.uri(),
            api_version: "v59.0".into(),
        }
    }

    fn exchange() -> CodeExchange<'static> {
        CodeExchange {
            code: "ext-code",
            client_id: "sf-app",
            client_secret: "sf-secret",
            redirect_uri: "http://localhost:3001/oauth/federated/callback",
        }
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form_and_parses_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=ext-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ext-access",
                "instance_url": "https://instance.example.com",
                "id": "https://login.example.com/id/00D/005",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(DEFAULT_REQUEST_TIMEOUT).unwrap();
        let tokens = provider.exchange_code(&idp(&server), exchange()).await.unwrap();

        assert_eq!(tokens.access_token, "ext-access");
        assert_eq!(tokens.instance_url, "https://instance.example.com");
    }

    #[tokio::test]
    async fn test_rejected_code_maps_to_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "expired authorization code"
            })))
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(DEFAULT_REQUEST_TIMEOUT).unwrap();
        let err = provider.exchange_code(&idp(&server), exchange()).await.unwrap_err();

        assert_eq!(err, OAuthError::InvalidGrant("expired authorization code".into()));
    }

    #[tokio::test]
    async fn test_idp_failure_maps_to_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(DEFAULT_REQUEST_TIMEOUT).unwrap();
        let err = provider.exchange_code(&idp(&server), exchange()).await.unwrap_err();

        assert_eq!(err.error_code(), "server_error");
    }

    #[tokio::test]
    async fn test_slow_idp_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(std::time::Duration::from_millis(50)).unwrap();
        let err = provider.exchange_code(&idp(&server), exchange()).await.unwrap_err();

        assert_eq!(err, OAuthError::ServerError("identity provider timed out".into()));
    }

    #[tokio::test]
    async fn test_user_info_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/oauth2/userinfo"))
            .and(header("authorization", "Bearer ext-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_id": "005xx0000012345",
                "organization_id": "00Dxx0000001gEH",
                "email": "ada@example.com",
                "name": "Ada Lovelace",
                "preferred_username": "ada@example.com"
            })))
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(DEFAULT_REQUEST_TIMEOUT).unwrap();
        let identity = provider.user_info("ext-access", &server.uri()).await.unwrap();

        assert_eq!(
            identity,
            ExternalIdentity {
                id: "005xx0000012345".into(),
                email: Some("ada@example.com".into()),
                name: Some("Ada Lovelace".into()),
                organization_id: "00Dxx0000001gEH".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_user_info_rejection_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = HttpIdentityProvider::new(DEFAULT_REQUEST_TIMEOUT).unwrap();
        let err = provider.user_info("ext-access", &server.uri()).await.unwrap_err();
        assert_eq!(err.error_code(), "server_error");
    }
}
