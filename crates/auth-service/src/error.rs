//! OAuth error responses

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use oauth_core::OAuthError;
use serde::Serialize;

/// Error body for every endpoint (RFC 6749 section 5.2)
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

/// An [`OAuthError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub OAuthError);

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        } else {
            tracing::debug!(error = %err, "Request rejected");
        }

        let challenge = match &err {
            OAuthError::InvalidToken(_) => Some(r#"Bearer error="invalid_token""#),
            OAuthError::InsufficientScope(_) => Some(r#"Bearer error="insufficient_scope""#),
            _ => None,
        };

        let body = ErrorBody {
            error: err.error_code(),
            error_description: err.description().to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}

/// Pull a required form field or fail with `invalid_request`.
pub fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError(OAuthError::InvalidRequest(format!("{name} is required"))))
}
