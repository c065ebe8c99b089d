//! Token revocation endpoint (RFC 7009)

use std::sync::Arc;

use axum::{Json, extract::State};
use oauth_core::OAuthError;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{ApiError, required};
use crate::extract::FormOrJson;

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: Option<String>,

    /// Accepted but not used for matching; either half revokes the pair.
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub message: &'static str,
}

/// Handler for `POST /revoke`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    FormOrJson(request): FormOrJson<RevokeRequest>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let token = required(&request.token, "token")?;
    if !state.server.revoke(token) {
        return Err(OAuthError::InvalidRequest("Token not found".into()).into());
    }
    Ok(Json(RevokeResponse {
        message: "Token revoked successfully",
    }))
}
