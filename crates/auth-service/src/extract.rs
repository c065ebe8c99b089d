//! Request body extraction

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header,
};
use oauth_core::OAuthError;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// A body sent either as `application/json` or form-encoded.
///
/// Anything not declared as JSON is read as a form. Malformed bodies are
/// rejected as `invalid_request`.
#[derive(Debug)]
pub struct FormOrJson<T>(pub T);

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.trim_start().starts_with("application/json"))
}

impl<T, S> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let malformed = |reason: String| ApiError(OAuthError::InvalidRequest(reason));
        if is_json(&req) {
            let Json(body) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| malformed(e.body_text()))?;
            Ok(Self(body))
        } else {
            let Form(body) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| malformed(e.body_text()))?;
            Ok(Self(body))
        }
    }
}
