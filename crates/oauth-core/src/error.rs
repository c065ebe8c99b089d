//! OAuth error taxonomy.
//!
//! Every core operation fails closed into one of these variants. The HTTP
//! layer maps them onto RFC 6749 error codes and status codes via
//! [`OAuthError::error_code`] and [`OAuthError::status_code`].

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, OAuthError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthError {
    /// Malformed or missing parameters.
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Unknown client or bad client secret.
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Bad, expired or already consumed code or refresh token.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// Requested scope has no overlap with the client's registered scopes.
    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    /// Resource owner credentials were rejected.
    #[error("access_denied: {0}")]
    AccessDenied(String),

    /// Token is valid but lacks the scope the resource requires.
    #[error("insufficient_scope: {0}")]
    InsufficientScope(String),

    /// Signature, expiry or revocation failure on a presented token.
    #[error("invalid_token: {0}")]
    InvalidToken(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// External identity provider unreachable or misconfigured.
    #[error("server_error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// The RFC 6749 / RFC 6750 `error` code for this failure.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied(_) => "access_denied",
            OAuthError::InsufficientScope(_) => "insufficient_scope",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// HTTP status the external layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            OAuthError::InvalidClient(_) | OAuthError::InvalidToken(_) => 401,
            OAuthError::InsufficientScope(_) => 403,
            OAuthError::ServerError(_) => 500,
            _ => 400,
        }
    }

    /// Human-readable description without the error code prefix.
    pub fn description(&self) -> &str {
        match self {
            OAuthError::InvalidRequest(d)
            | OAuthError::InvalidClient(d)
            | OAuthError::InvalidGrant(d)
            | OAuthError::InvalidScope(d)
            | OAuthError::AccessDenied(d)
            | OAuthError::InsufficientScope(d)
            | OAuthError::InvalidToken(d)
            | OAuthError::UnsupportedGrantType(d)
            | OAuthError::UnsupportedResponseType(d)
            | OAuthError::ServerError(d) => d,
        }
    }
}
