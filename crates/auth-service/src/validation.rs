//! Token validation endpoint for resource servers
//!
//! Resource servers forward the caller's `Authorization: Bearer` header here.
//! Both first-party access tokens and external bearer assertions are accepted.
//! Responds 200 with the validated claims, 401 if the token is missing or
//! invalid, 403 if it lacks the scope named in the `scope` query parameter.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header},
};
use oauth_core::{AuthorizationServer, OAuthError, ValidatedClaims};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    /// Scope the protected resource requires
    #[serde(default)]
    pub scope: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, OAuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| OAuthError::InvalidToken("Missing Authorization header".into()))?
        .to_str()
        .map_err(|_| OAuthError::InvalidToken("Invalid Authorization header".into()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| OAuthError::InvalidToken("Invalid Authorization header format".into()))
}

/// Handler for `GET /validate`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ValidateQuery>,
    headers: HeaderMap,
) -> Result<Json<ValidatedClaims>, ApiError> {
    let token = bearer_token(&headers)?;
    let claims = state.server.validate_enhanced(token)?;

    if let Some(scope) = query.scope.as_deref() {
        AuthorizationServer::require_scope(&claims, scope)?;
    }

    tracing::debug!(
        client_id = %claims.client_id,
        source = ?claims.source,
        "Request authenticated"
    );
    Ok(Json(claims))
}
