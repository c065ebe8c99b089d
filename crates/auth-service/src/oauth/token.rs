//! Token endpoint
//!
//! Handles:
//! - Authorization code exchange (first-party, or federated for connected apps)
//! - Refresh token grants
//! - External bearer assertions (RFC 7523)

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use oauth_core::OAuthError;
use serde::Deserialize;

use crate::AppState;
use crate::error::{ApiError, required};
use crate::extract::FormOrJson;

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Token request, form-encoded or JSON
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// "authorization_code", "refresh_token" or the jwt-bearer URN
    #[serde(default)]
    pub grant_type: Option<String>,

    /// Authorization code (for authorization_code grant)
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI (for authorization_code grant, must match original)
    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Refresh token (for refresh_token grant)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Signed assertion (for jwt-bearer grant)
    #[serde(default)]
    pub assertion: Option<String>,
}

/// Handler for `POST /token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    FormOrJson(request): FormOrJson<TokenRequest>,
) -> Result<Response, ApiError> {
    let grant_type = required(&request.grant_type, "grant_type")?;
    let body = match grant_type {
        "authorization_code" => authorization_code(&state, &request).await?,
        "refresh_token" => {
            let refresh_token = required(&request.refresh_token, "refresh_token")?;
            Json(state.server.refresh(refresh_token)?).into_response()
        }
        JWT_BEARER_GRANT => {
            let assertion = required(&request.assertion, "assertion")?;
            Json(state.server.exchange_assertion(assertion)?).into_response()
        }
        other => {
            return Err(OAuthError::UnsupportedGrantType(format!(
                "Unsupported grant type: {other}"
            ))
            .into());
        }
    };

    Ok(([(header::CACHE_CONTROL, "no-store")], body).into_response())
}

async fn authorization_code(state: &AppState, request: &TokenRequest) -> Result<Response, ApiError> {
    let code = required(&request.code, "code")?;
    let redirect_uri = required(&request.redirect_uri, "redirect_uri")?;
    let client_id = required(&request.client_id, "client_id")?;
    let client_secret = required(&request.client_secret, "client_secret")?;

    if state.server.is_federated_client(client_id) {
        let response = state
            .server
            .exchange_federated_code(code, client_id, client_secret, redirect_uri)
            .await?;
        return Ok(Json(response).into_response());
    }

    let response = state
        .server
        .exchange_code(code, client_id, client_secret, redirect_uri)?;
    Ok(Json(response).into_response())
}
