//! Federated identity bridge.
//!
//! Two ways in from the external IdP:
//! - a connected app trades an external authorization code (exchanged here
//!   against the IdP, then resolved to a user through user-info)
//! - a server-to-server caller presents a bearer assertion signed by the IdP
//!
//! Either way the result is an external identity; turning it into first-party
//! tokens is the authorization server's job.

mod assertion;
mod provider;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use url::Url;

pub use assertion::{
    AssertionClaims, AssertionSignatureVerifier, Audience, ClaimsOnlyDecoder, PublicKeyVerifier,
};
pub use provider::{
    CodeExchange, DEFAULT_REQUEST_TIMEOUT, ExternalIdentity, ExternalTokenSet,
    HttpIdentityProvider, IdentityProvider,
};

use crate::client::{ClientKind, ClientRegistry, OAuthClient};
use crate::clock::SharedClock;
use crate::codec::ExternalSubject;
use crate::error::{OAuthError, Result};
use crate::scope::Scopes;

/// What a bearer assertion must look like to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionPolicy {
    /// Expected `iss`: the IdP login URL.
    pub issuer: String,
    /// Expected `aud`: our client id at the IdP.
    pub audience: String,
    /// Internal federated-bearer client that assertion holders act as.
    pub client_id: String,
}

pub struct IdentityBridge {
    clients: Arc<ClientRegistry>,
    provider: Arc<dyn IdentityProvider>,
    verifier: Arc<dyn AssertionSignatureVerifier>,
    policy: AssertionPolicy,
    clock: SharedClock,
}

impl IdentityBridge {
    pub fn new(
        clients: Arc<ClientRegistry>,
        provider: Arc<dyn IdentityProvider>,
        verifier: Arc<dyn AssertionSignatureVerifier>,
        policy: AssertionPolicy,
        clock: SharedClock,
    ) -> Self {
        tracing::info!(
            verifier = verifier.name(),
            issuer = %policy.issuer,
            assertion_client = %policy.client_id,
            "Identity bridge configured"
        );
        Self {
            clients,
            provider,
            verifier,
            policy,
            clock,
        }
    }

    /// The client that bearer-assertion holders are issued tokens as.
    pub fn assertion_client(&self) -> Result<Arc<OAuthClient>> {
        match self.clients.lookup(&self.policy.client_id) {
            Some(client) if matches!(client.kind, ClientKind::FederatedBearer(_)) => Ok(client),
            Some(_) => Err(OAuthError::ServerError(format!(
                "assertion client {} is not a federated-bearer client",
                self.policy.client_id
            ))),
            None => Err(OAuthError::ServerError(format!(
                "assertion client {} is not registered",
                self.policy.client_id
            ))),
        }
    }

    /// Where to send the user to sign in at the IdP. Only the requested
    /// scopes the client is registered for are forwarded.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &Scopes,
        state: Option<&str>,
    ) -> Result<String> {
        let client = self
            .clients
            .lookup(client_id)
            .ok_or_else(|| OAuthError::InvalidClient("Invalid client".into()))?;
        let ClientKind::FederatedConnectedApp(idp) = &client.kind else {
            return Err(OAuthError::InvalidClient(
                "client is not a federated connected app".into(),
            ));
        };
        if !client.is_redirect_registered(redirect_uri) {
            return Err(OAuthError::InvalidRequest("Invalid redirect URI".into()));
        }
        let scopes = client.narrow_scopes(scopes)?;

        let mut url = Url::parse(&idp.authorize_url())
            .map_err(|e| OAuthError::ServerError(format!("invalid IdP login URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", &scopes.to_string());
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url.into())
    }

    /// Trade an external authorization code for the identity behind it.
    #[tracing::instrument(skip(self, code, client_secret))]
    pub async fn exchange_code(
        &self,
        client_id: &str,
        code: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<ExternalIdentity> {
        let client = self.clients.authenticate(client_id, client_secret)?;
        let ClientKind::FederatedConnectedApp(idp) = &client.kind else {
            return Err(OAuthError::InvalidClient(
                "client is not a federated connected app".into(),
            ));
        };
        if !client.is_redirect_registered(redirect_uri) {
            return Err(OAuthError::InvalidGrant("Invalid redirect URI".into()));
        }

        let tokens = self
            .provider
            .exchange_code(
                idp,
                CodeExchange {
                    code,
                    client_id,
                    client_secret,
                    redirect_uri,
                },
            )
            .await?;
        let identity = self
            .provider
            .user_info(&tokens.access_token, &tokens.instance_url)
            .await?;

        tracing::info!(
            external_user = %identity.id,
            organization = %identity.organization_id,
            api_version = %idp.api_version,
            "Resolved external identity"
        );
        Ok(identity)
    }

    /// Check a bearer assertion and return the external subject it names.
    ///
    /// Signature first, then issuer, audience and expiry; any failure rejects.
    pub fn validate_assertion(&self, assertion: &str) -> Result<ExternalSubject> {
        let claims = self.verifier.decode(assertion)?;

        if claims.iss != self.policy.issuer {
            return Err(OAuthError::InvalidGrant("Invalid assertion issuer".into()));
        }
        if !claims.aud.contains(&self.policy.audience) {
            return Err(OAuthError::InvalidGrant("Invalid assertion audience".into()));
        }
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| OAuthError::InvalidGrant("Invalid assertion expiry".into()))?;
        if expires_at <= self.clock.now() {
            return Err(OAuthError::InvalidGrant("Assertion expired".into()));
        }

        Ok(ExternalSubject {
            user_id: claims.sub,
            organization_id: claims.organization_id,
        })
    }
}
