//! The authorization server.
//!
//! Wires the client registry, user directory, code store, token store and
//! codec together into the OAuth 2.0 flows, plus the federated flows when an
//! [`IdentityBridge`] is attached.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use url::Url;

use crate::bridge::{ExternalIdentity, IdentityBridge};
use crate::client::{ClientKind, ClientRegistry, OAuthClient};
use crate::clock::SharedClock;
use crate::code_store::AuthorizationCodeStore;
use crate::codec::{
    ACCESS_TOKEN_TTL_SECS, ExternalSubject, REFRESH_TOKEN_TTL_SECS, TokenClaims, TokenCodec,
    TokenKind,
};
use crate::error::{OAuthError, Result};
use crate::scope::Scopes;
use crate::token_store::{NewTokenRecord, TokenStore};
use crate::user::UserDirectory;
use crate::validator::{
    AssertionValidator, StoredTokenValidator, TokenValidator, ValidatedClaims, ValidatorChain,
};

/// Token endpoint success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl TokenResponse {
    fn bearer(access_token: String, refresh_token: Option<String>, scopes: &Scopes) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_TTL_SECS,
            refresh_token,
            scope: scopes.to_string(),
        }
    }
}

/// Token response for a federated code exchange, with the resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FederatedTokenResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub external_user: ExternalIdentity,
}

/// A checked authorization request, ready to show the login form for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreGrant {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uri: String,
    /// Requested scopes narrowed to what the client may have.
    pub scope: Scopes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

pub struct AuthorizationServer {
    clients: Arc<ClientRegistry>,
    users: Arc<UserDirectory>,
    codes: Arc<AuthorizationCodeStore>,
    tokens: Arc<TokenStore>,
    codec: Arc<TokenCodec>,
    bridge: Option<Arc<IdentityBridge>>,
    internal: Arc<StoredTokenValidator>,
    validators: ValidatorChain,
}

impl AuthorizationServer {
    pub fn new(
        clients: Arc<ClientRegistry>,
        users: Arc<UserDirectory>,
        codes: Arc<AuthorizationCodeStore>,
        tokens: Arc<TokenStore>,
        codec: Arc<TokenCodec>,
        clock: SharedClock,
    ) -> Self {
        let internal = Arc::new(StoredTokenValidator::new(codec.clone(), tokens.clone(), clock));
        let validators = ValidatorChain::new().with(internal.clone());
        Self {
            clients,
            users,
            codes,
            tokens,
            codec,
            bridge: None,
            internal,
            validators,
        }
    }

    /// Enable the federated flows. Fails if the bridge's assertion client is
    /// missing or of the wrong kind.
    pub fn with_federation(mut self, bridge: Arc<IdentityBridge>) -> Result<Self> {
        let assertions: Arc<dyn TokenValidator> = Arc::new(AssertionValidator::new(bridge.clone())?);
        self.validators.push(assertions);
        self.bridge = Some(bridge);
        Ok(self)
    }

    fn bridge(&self) -> Result<&IdentityBridge> {
        self.bridge
            .as_deref()
            .ok_or_else(|| OAuthError::ServerError("federation is not configured".into()))
    }

    /// Check an incoming authorization request before showing the login form.
    pub fn prepare_authorization(
        &self,
        response_type: &str,
        client_id: &str,
        redirect_uri: &str,
        scope: Option<&str>,
        state: Option<&str>,
    ) -> Result<PreGrant> {
        let scope = scope.ok_or_else(|| OAuthError::InvalidRequest("scope is required".into()))?;
        if response_type != "code" {
            return Err(OAuthError::UnsupportedResponseType(
                "Only code response type is supported".into(),
            ));
        }
        let client = self
            .clients
            .lookup(client_id)
            .ok_or_else(|| OAuthError::InvalidClient("Invalid client".into()))?;
        if !client.is_redirect_registered(redirect_uri) {
            return Err(OAuthError::InvalidRequest("Invalid redirect URI".into()));
        }
        let scope = client.narrow_scopes(&Scopes::parse(scope))?;

        Ok(PreGrant {
            client_id: client.client_id.clone(),
            client_name: client.name.clone(),
            redirect_uri: redirect_uri.to_string(),
            scope,
            state: state.map(str::to_string),
        })
    }

    pub fn authenticate_user(&self, username: &str, password: &str) -> Result<String> {
        self.users.authenticate(username, password)
    }

    /// Issue a single-use code binding the grant to `client_id` and `redirect_uri`.
    pub fn issue_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        user_id: &str,
        scopes: &Scopes,
    ) -> Result<String> {
        let client = self
            .clients
            .lookup(client_id)
            .ok_or_else(|| OAuthError::InvalidClient("Invalid client".into()))?;
        if !client.is_redirect_registered(redirect_uri) {
            return Err(OAuthError::InvalidRequest("Invalid redirect URI".into()));
        }
        if scopes.is_empty() || !scopes.is_subset_of(&client.scopes) {
            return Err(OAuthError::InvalidScope(
                "scopes exceed the client's registration".into(),
            ));
        }

        let code = self
            .codes
            .issue(client_id, redirect_uri, user_id, scopes.clone());
        tracing::info!(client_id, user_id, scope = %scopes, "Issued authorization code");
        Ok(code)
    }

    /// The client redirect carrying a freshly issued code.
    pub fn authorization_redirect(
        redirect_uri: &str,
        code: &str,
        state: Option<&str>,
    ) -> Result<String> {
        let mut url = Url::parse(redirect_uri)
            .map_err(|_| OAuthError::InvalidRequest("Invalid redirect URI".into()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("code", code);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url.into())
    }

    /// Redeem an authorization code for an access/refresh pair.
    ///
    /// The code is consumed before anything else is checked, so a code that
    /// fails any later check is gone for good.
    #[tracing::instrument(skip(self, code, client_secret))]
    pub fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let consumed = self.codes.consume(code);
        let client = self.clients.authenticate(client_id, client_secret)?;
        let data = consumed?;

        if data.client_id != client.client_id {
            return Err(OAuthError::InvalidGrant("Invalid client ID".into()));
        }
        if data.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant("Invalid redirect URI".into()));
        }

        let response = self.issue_token_pair(&data.user_id, &client, &data.scopes, None)?;
        tracing::info!(user_id = %data.user_id, scope = %response.scope, "Exchanged authorization code");
        Ok(response)
    }

    /// Mint a new access token from a live refresh token.
    ///
    /// The refresh token itself is not rotated.
    #[tracing::instrument(skip_all)]
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let invalid = || OAuthError::InvalidGrant("Invalid refresh token".into());

        self.codec
            .verify_kind(refresh_token, TokenKind::Refresh)
            .map_err(|_| invalid())?;
        let record = self
            .tokens
            .find_by_refresh_token(refresh_token)
            .ok_or_else(invalid)?;

        // Scopes come from the record, never from the presented token.
        let claims = TokenClaims::new(
            &record.user_id,
            &record.client_id,
            record.scopes.to_string(),
            TokenKind::Access,
        )
        .with_external(record.external.as_ref());
        let access = self
            .codec
            .sign(&claims, Duration::seconds(ACCESS_TOKEN_TTL_SECS))?;

        if !self
            .tokens
            .touch(record.id, access.token.clone(), access.expires_at)
        {
            return Err(invalid());
        }

        tracing::info!(record_id = %record.id, client_id = %record.client_id, "Refreshed access token");
        Ok(TokenResponse::bearer(
            access.token,
            Some(record.refresh_token),
            &record.scopes,
        ))
    }

    /// Validate a first-party access token.
    pub fn validate(&self, access_token: &str) -> Result<ValidatedClaims> {
        self.internal.validate(access_token)
    }

    /// Validate a first-party access token, falling back to external
    /// assertions when federation is configured.
    pub fn validate_enhanced(&self, token: &str) -> Result<ValidatedClaims> {
        self.validators.validate(token)
    }

    /// Fail with `InsufficientScope` unless `claims` carries `scope`.
    pub fn require_scope(claims: &ValidatedClaims, scope: &str) -> Result<()> {
        if claims.has_scope(scope) {
            Ok(())
        } else {
            Err(OAuthError::InsufficientScope(format!(
                "Token lacks required scope: {scope}"
            )))
        }
    }

    /// Revoke the record holding `token` as either half. Idempotent.
    pub fn revoke(&self, token: &str) -> bool {
        let revoked = self.tokens.revoke(token);
        if revoked {
            tracing::info!("Revoked token");
        }
        revoked
    }

    /// Issue a first-party pair for an identity resolved at the external IdP.
    pub fn mint_for_external_identity(
        &self,
        identity: &ExternalSubject,
        client_id: &str,
        scopes: &Scopes,
    ) -> Result<TokenResponse> {
        let client = self
            .clients
            .lookup(client_id)
            .ok_or_else(|| OAuthError::InvalidClient("Invalid client".into()))?;
        let granted = client.narrow_scopes(scopes)?;
        let response = self.issue_token_pair(&identity.user_id, &client, &granted, Some(identity))?;
        tracing::info!(
            external_user = %identity.user_id,
            organization = %identity.organization_id,
            client_id,
            "Minted tokens for external identity"
        );
        Ok(response)
    }

    /// The IdP sign-in URL for a federated connected app.
    ///
    /// Checked like a first-party authorization request: `code` only, and the
    /// requested scopes are narrowed to the client's.
    pub fn federated_authorization_url(
        &self,
        response_type: &str,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        state: Option<&str>,
    ) -> Result<String> {
        if response_type != "code" {
            return Err(OAuthError::UnsupportedResponseType(
                "Only code response type is supported".into(),
            ));
        }
        self.bridge()?
            .authorization_url(client_id, redirect_uri, &Scopes::parse(scope), state)
    }

    /// Redeem an external authorization code for first-party tokens.
    pub async fn exchange_federated_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<FederatedTokenResponse> {
        let identity = self
            .bridge()?
            .exchange_code(client_id, code, client_secret, redirect_uri)
            .await?;
        let client = self
            .clients
            .lookup(client_id)
            .ok_or_else(|| OAuthError::InvalidClient("Invalid client".into()))?;

        let subject = ExternalSubject {
            user_id: identity.id.clone(),
            organization_id: identity.organization_id.clone(),
        };
        let tokens = self.mint_for_external_identity(&subject, client_id, &client.scopes)?;
        Ok(FederatedTokenResponse {
            tokens,
            external_user: identity,
        })
    }

    /// Trade an external bearer assertion for a one-off access token.
    ///
    /// Nothing is stored and no refresh token is issued; the token carries
    /// the external subject and the bearer client's scopes.
    pub fn exchange_assertion(&self, assertion: &str) -> Result<TokenResponse> {
        let bridge = self.bridge()?;
        let subject = bridge.validate_assertion(assertion)?;
        let client = bridge.assertion_client()?;

        let claims = TokenClaims::new(
            &subject.user_id,
            &client.client_id,
            client.scopes.to_string(),
            TokenKind::Access,
        )
        .with_external(Some(&subject));
        let access = self
            .codec
            .sign(&claims, Duration::seconds(ACCESS_TOKEN_TTL_SECS))?;

        tracing::info!(
            external_user = %subject.user_id,
            organization = %subject.organization_id,
            "Exchanged bearer assertion"
        );
        Ok(TokenResponse::bearer(access.token, None, &client.scopes))
    }

    /// Whether `client_id` names a federated connected app.
    pub fn is_federated_client(&self, client_id: &str) -> bool {
        self.clients
            .lookup(client_id)
            .is_some_and(|c| matches!(c.kind, ClientKind::FederatedConnectedApp(_)))
    }

    fn issue_token_pair(
        &self,
        user_id: &str,
        client: &OAuthClient,
        scopes: &Scopes,
        external: Option<&ExternalSubject>,
    ) -> Result<TokenResponse> {
        let scope = scopes.to_string();
        let access_claims = TokenClaims::new(user_id, &client.client_id, scope.clone(), TokenKind::Access)
            .with_external(external);
        let refresh_claims = TokenClaims::new(user_id, &client.client_id, scope, TokenKind::Refresh)
            .with_external(external);

        let access = self
            .codec
            .sign(&access_claims, Duration::seconds(ACCESS_TOKEN_TTL_SECS))?;
        let refresh = self
            .codec
            .sign(&refresh_claims, Duration::seconds(REFRESH_TOKEN_TTL_SECS))?;

        let record_id = self.tokens.put(NewTokenRecord {
            access_token: access.token.clone(),
            refresh_token: refresh.token.clone(),
            client_id: client.client_id.clone(),
            user_id: user_id.to_string(),
            scopes: scopes.clone(),
            expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
            external: external.cloned(),
        });
        tracing::debug!(%record_id, client_id = %client.client_id, "Stored token record");

        Ok(TokenResponse::bearer(access.token, Some(refresh.token), scopes))
    }
}
