//! Sign-in through the external identity provider
//!
//! `GET /federated/authorize` sends the browser to the IdP. The IdP redirects
//! back to `GET /federated/callback`, which redeems the external code as the
//! configured connected app. Connected apps that receive the code themselves
//! redeem it at `POST /token` instead.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use oauth_core::OAuthError;
use serde::Deserialize;

use crate::AppState;
use crate::error::{ApiError, required};

#[derive(Debug, Deserialize)]
pub struct FederatedAuthorizeRequest {
    #[serde(default)]
    pub response_type: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Handler for `GET /federated/authorize`
pub async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FederatedAuthorizeRequest>,
) -> Result<Redirect, ApiError> {
    let response_type = required(&params.response_type, "response_type")?;
    let client_id = required(&params.client_id, "client_id")?;
    let redirect_uri = required(&params.redirect_uri, "redirect_uri")?;
    let scope = required(&params.scope, "scope")?;
    let url = state.server.federated_authorization_url(
        response_type,
        client_id,
        redirect_uri,
        scope,
        params.state.as_deref(),
    )?;
    tracing::info!(client_id, "Redirecting to external identity provider");
    Ok(Redirect::to(&url))
}

/// What the IdP sends back to the callback
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Handler for `GET /federated/callback`
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error.as_deref() {
        tracing::info!(error, "External identity provider refused sign-in");
        let description = params
            .error_description
            .clone()
            .unwrap_or_else(|| "External authorization failed".into());
        return Err(OAuthError::AccessDenied(description).into());
    }
    let code = params
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("Authorization code not provided".into()))?;
    let callback = state
        .federated_callback
        .as_ref()
        .ok_or_else(|| OAuthError::ServerError("Federated callback client not configured".into()))?;

    let response = state
        .server
        .exchange_federated_code(
            code,
            &callback.client_id,
            &callback.client_secret,
            &callback.redirect_uri,
        )
        .await?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(response)).into_response())
}
