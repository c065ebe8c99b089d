//! Bearer-token validation strategies.
//!
//! A [`ValidatorChain`] tries each strategy in order and accepts the first
//! that succeeds. Internal tokens come first; external assertions are the
//! fallback for server-to-server callers.

use std::sync::Arc;

use serde::Serialize;

use crate::bridge::IdentityBridge;
use crate::client::OAuthClient;
use crate::clock::SharedClock;
use crate::codec::{ExternalSubject, TokenCodec, TokenKind};
use crate::error::{OAuthError, Result};
use crate::scope::Scopes;
use crate::token_store::TokenStore;

/// Which strategy accepted a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSource {
    Internal,
    ExternalAssertion,
}

/// The identity a validated bearer token speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedClaims {
    #[serde(rename = "user_id")]
    pub subject: String,
    pub client_id: String,
    pub scopes: Scopes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalSubject>,
    pub source: ValidationSource,
}

impl ValidatedClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

pub trait TokenValidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, token: &str) -> Result<ValidatedClaims>;
}

/// First-party access tokens: signature, expiry, type, then a live record.
pub struct StoredTokenValidator {
    codec: Arc<TokenCodec>,
    tokens: Arc<TokenStore>,
    clock: SharedClock,
}

impl StoredTokenValidator {
    pub fn new(codec: Arc<TokenCodec>, tokens: Arc<TokenStore>, clock: SharedClock) -> Self {
        Self { codec, tokens, clock }
    }
}

impl TokenValidator for StoredTokenValidator {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let verified = self.codec.verify_kind(token, TokenKind::Access)?;

        let record = self
            .tokens
            .find_by_access_token(token)
            .ok_or_else(|| OAuthError::InvalidToken("Token not found or revoked".into()))?;
        if !record.is_live(self.clock.now()) {
            return Err(OAuthError::InvalidToken("Token expired".into()));
        }

        let claims = verified.claims;
        Ok(ValidatedClaims {
            external: claims.external(),
            scopes: Scopes::parse(&claims.scope),
            subject: claims.sub,
            client_id: claims.client_id,
            source: ValidationSource::Internal,
        })
    }
}

/// External bearer assertions, accepted as the bridge's bearer client.
pub struct AssertionValidator {
    bridge: Arc<IdentityBridge>,
    client: Arc<OAuthClient>,
}

impl AssertionValidator {
    pub fn new(bridge: Arc<IdentityBridge>) -> Result<Self> {
        let client = bridge.assertion_client()?;
        Ok(Self { bridge, client })
    }
}

impl TokenValidator for AssertionValidator {
    fn name(&self) -> &'static str {
        "external-assertion"
    }

    fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let subject = self
            .bridge
            .validate_assertion(token)
            .map_err(|e| OAuthError::InvalidToken(e.description().to_string()))?;
        Ok(ValidatedClaims {
            subject: subject.user_id.clone(),
            client_id: self.client.client_id.clone(),
            scopes: self.client.scopes.clone(),
            external: Some(subject),
            source: ValidationSource::ExternalAssertion,
        })
    }
}

#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn TokenValidator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, validator: Arc<dyn TokenValidator>) {
        self.validators.push(validator);
    }

    pub fn with(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.push(validator);
        self
    }

    /// Accept with the first strategy that succeeds.
    pub fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        for validator in &self.validators {
            match validator.validate(token) {
                Ok(claims) => return Ok(claims),
                Err(e) => {
                    tracing::debug!(validator = validator.name(), error = %e, "Validator rejected token");
                }
            }
        }
        Err(OAuthError::InvalidToken("Invalid token".into()))
    }
}
