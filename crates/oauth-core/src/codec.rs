//! Self-contained bearer tokens.
//!
//! Tokens are HS256 JWTs signed with one process-wide secret. The codec proves
//! integrity and expiry only; revocation and liveness are the token store's job.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{OAuthError, Result};

/// Access token lifetime (15 minutes).
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime (7 days).
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

/// Authorization code lifetime (10 minutes).
pub const AUTH_CODE_TTL_SECS: i64 = 10 * 60;

/// Shortest accepted signing secret.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
}

impl From<CodecError> for OAuthError {
    fn from(e: CodecError) -> Self {
        OAuthError::InvalidToken(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity at the external IdP that a first-party token was minted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubject {
    pub user_id: String,
    pub organization_id: String,
}

/// Claims carried by every first-party token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub client_id: String,
    /// Space-delimited scope string.
    pub scope: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_org_id: Option<String>,
}

impl TokenClaims {
    pub fn new(
        sub: impl Into<String>,
        client_id: impl Into<String>,
        scope: impl Into<String>,
        kind: TokenKind,
    ) -> Self {
        Self {
            sub: sub.into(),
            client_id: client_id.into(),
            scope: scope.into(),
            kind,
            ext_user_id: None,
            ext_org_id: None,
        }
    }

    /// Tag the claims with the external identity they were minted for.
    pub fn with_external(mut self, external: Option<&ExternalSubject>) -> Self {
        if let Some(ext) = external {
            self.ext_user_id = Some(ext.user_id.clone());
            self.ext_org_id = Some(ext.organization_id.clone());
        }
        self
    }

    pub fn external(&self) -> Option<ExternalSubject> {
        match (&self.ext_user_id, &self.ext_org_id) {
            (Some(user_id), Some(organization_id)) => Some(ExternalSubject {
                user_id: user_id.clone(),
                organization_id: organization_id.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    #[serde(flatten)]
    claims: TokenClaims,
    iat: i64,
    exp: i64,
    jti: String,
}

/// A freshly signed token and the absolute expiry embedded in it.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims recovered from a token whose signature and expiry checked out.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub claims: TokenClaims,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: SharedClock,
}

impl TokenCodec {
    pub fn new(secret: &[u8], clock: SharedClock) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(OAuthError::ServerError(format!(
                "token secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            clock,
        })
    }

    pub fn sign(&self, claims: &TokenClaims, ttl: Duration) -> Result<SignedToken> {
        let now = self.clock.now();
        let expires_at = now + ttl;
        let wire = WireClaims {
            claims: claims.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &wire, &self.encoding)
            .map_err(|e| OAuthError::ServerError(format!("failed to sign token: {e}")))?;
        Ok(SignedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> std::result::Result<VerifiedToken, CodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged against the injected clock below.
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data = decode::<WireClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => CodecError::SignatureInvalid,
                ErrorKind::ExpiredSignature => CodecError::Expired,
                _ => CodecError::Malformed,
            }
        })?;

        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or(CodecError::Malformed)?;
        if expires_at <= self.clock.now() {
            return Err(CodecError::Expired);
        }

        Ok(VerifiedToken {
            claims: data.claims.claims,
            expires_at,
        })
    }

    /// Verify and additionally require the token to be of `kind`.
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<VerifiedToken> {
        let verified = self.verify(token)?;
        if verified.claims.kind != kind {
            return Err(OAuthError::InvalidToken("Invalid token type".into()));
        }
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    const SECRET: &[u8] = b"test-secret-that-is-long-enough-for-hs256";

    fn codec() -> (TokenCodec, ManualClock) {
        let clock = ManualClock::default();
        let codec = TokenCodec::new(SECRET, Arc::new(clock.clone())).unwrap();
        (codec, clock)
    }

    fn access_claims() -> TokenClaims {
        TokenClaims::new("user-1", "c1", "read", TokenKind::Access)
    }

    #[test]
    fn test_sign_then_verify() {
        let (codec, clock) = codec();
        let signed = codec
            .sign(&access_claims(), Duration::seconds(ACCESS_TOKEN_TTL_SECS))
            .unwrap();

        let verified = codec.verify(&signed.token).unwrap();
        assert_eq!(verified.claims, access_claims());
        assert_eq!(
            verified.expires_at.timestamp(),
            (clock.now() + Duration::seconds(900)).timestamp()
        );
    }

    #[test]
    fn test_tokens_for_same_claims_are_distinct() {
        let (codec, _) = codec();
        let ttl = Duration::seconds(ACCESS_TOKEN_TTL_SECS);
        let first = codec.sign(&access_claims(), ttl).unwrap();
        let second = codec.sign(&access_claims(), ttl).unwrap();
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (codec, clock) = codec();
        let signed = codec.sign(&access_claims(), Duration::seconds(900)).unwrap();

        clock.advance(Duration::seconds(901));
        assert_eq!(codec.verify(&signed.token).unwrap_err(), CodecError::Expired);
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let (codec, _) = codec();
        let other = TokenCodec::new(
            b"another-secret-that-is-also-long-enough",
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        let signed = other.sign(&access_claims(), Duration::seconds(900)).unwrap();

        assert_eq!(
            codec.verify(&signed.token).unwrap_err(),
            CodecError::SignatureInvalid
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let (codec, _) = codec();
        assert_eq!(codec.verify("garbage").unwrap_err(), CodecError::Malformed);
        assert_eq!(codec.verify("").unwrap_err(), CodecError::Malformed);
    }

    #[test]
    fn test_verify_kind() {
        let (codec, _) = codec();
        let refresh = TokenClaims::new("user-1", "c1", "read", TokenKind::Refresh);
        let signed = codec.sign(&refresh, Duration::seconds(60)).unwrap();

        assert!(codec.verify_kind(&signed.token, TokenKind::Refresh).is_ok());
        let err = codec.verify_kind(&signed.token, TokenKind::Access).unwrap_err();
        assert_eq!(err.error_code(), "invalid_token");
    }

    #[test]
    fn test_external_subject_round_trips_through_claims() {
        let (codec, _) = codec();
        let ext = ExternalSubject {
            user_id: "005xx".into(),
            organization_id: "00Dxx".into(),
        };
        let claims = access_claims().with_external(Some(&ext));
        let signed = codec.sign(&claims, Duration::seconds(60)).unwrap();

        let verified = codec.verify(&signed.token).unwrap();
        assert_eq!(verified.claims.external(), Some(ext));
    }

    #[test]
    fn test_short_secret_is_refused() {
        assert!(TokenCodec::new(b"short", Arc::new(ManualClock::default())).is_err());
    }
}
