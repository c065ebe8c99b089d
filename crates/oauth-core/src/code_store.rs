//! Short-lived, single-use authorization codes.
//!
//! Every lookup removes the entry under one write lock, so two concurrent
//! exchanges of the same code can never both succeed. Expired entries are
//! reaped when they are looked up; there is no background sweeper.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::clock::SharedClock;
use crate::codec::AUTH_CODE_TTL_SECS;
use crate::credentials::{digest_token, generate_opaque_token};
use crate::error::OAuthError;
use crate::scope::Scopes;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("Invalid authorization code")]
    NotFound,
    #[error("Authorization code expired")]
    Expired,
}

impl From<CodeError> for OAuthError {
    fn from(e: CodeError) -> Self {
        OAuthError::InvalidGrant(e.to_string())
    }
}

/// The grant context an authorization code stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCodeData {
    pub client_id: String,
    pub redirect_uri: String,
    pub user_id: String,
    pub scopes: Scopes,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthorizationCodeStore {
    /// Keyed by code digest; raw codes are never held.
    codes: Mutex<HashMap<String, AuthorizationCodeData>>,
    clock: SharedClock,
}

impl AuthorizationCodeStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Record a new grant and return the fresh code for it.
    pub fn issue(&self, client_id: &str, redirect_uri: &str, user_id: &str, scopes: Scopes) -> String {
        let code = generate_opaque_token();
        let data = AuthorizationCodeData {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            user_id: user_id.to_string(),
            scopes,
            expires_at: self.clock.now() + Duration::seconds(AUTH_CODE_TTL_SECS),
        };
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(digest_token(&code), data);
        code
    }

    /// Atomically remove and return the grant behind `code`.
    pub fn consume(&self, code: &str) -> Result<AuthorizationCodeData, CodeError> {
        let removed = self
            .codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&digest_token(code));

        match removed {
            None => Err(CodeError::NotFound),
            Some(data) if data.expires_at <= self.clock.now() => Err(CodeError::Expired),
            Some(data) => Ok(data),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
