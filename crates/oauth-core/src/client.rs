//! Client registry.
//!
//! Clients are registered once at construction from configuration and never
//! change afterwards, so the registry is an immutable map shared behind `Arc`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credentials::{hash_secret, verify_against_decoy, verify_secret};
use crate::error::{OAuthError, Result};
use crate::scope::Scopes;

/// Where a federated client's external identity provider lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpEndpoint {
    /// Login base URL, e.g. `https://login.salesforce.com`.
    pub login_url: String,
    /// External API version, e.g. `v59.0`.
    pub api_version: String,
}

impl IdpEndpoint {
    pub fn authorize_url(&self) -> String {
        format!("{}/services/oauth2/authorize", self.login_url.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/services/oauth2/token", self.login_url.trim_end_matches('/'))
    }
}

/// How a client obtains its tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKind {
    /// First-party login form followed by an authorization-code exchange.
    Standard,
    /// Authorization-code exchange performed against the external IdP.
    FederatedConnectedApp(IdpEndpoint),
    /// Server-to-server bearer assertions issued by the external IdP.
    FederatedBearer(IdpEndpoint),
}

impl ClientKind {
    pub fn idp(&self) -> Option<&IdpEndpoint> {
        match self {
            ClientKind::Standard => None,
            ClientKind::FederatedConnectedApp(idp) | ClientKind::FederatedBearer(idp) => Some(idp),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Standard => "standard",
            ClientKind::FederatedConnectedApp(_) => "federated-connected-app",
            ClientKind::FederatedBearer(_) => "federated-bearer",
        }
    }
}

/// A registered OAuth client.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    /// Argon2 PHC hash of the client secret.
    pub secret_hash: String,
    pub redirect_uris: BTreeSet<String>,
    pub scopes: Scopes,
    pub name: String,
    pub kind: ClientKind,
}

impl OAuthClient {
    /// Exact string match, no normalization.
    pub fn is_redirect_registered(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.contains(redirect_uri)
    }

    /// Restrict `requested` to this client's scopes.
    ///
    /// Fails with `InvalidScope` when nothing is left.
    pub fn narrow_scopes(&self, requested: &Scopes) -> Result<Scopes> {
        let granted = requested.intersect(&self.scopes);
        if granted.is_empty() {
            return Err(OAuthError::InvalidScope(format!(
                "none of the requested scopes are granted to client {}",
                self.client_id
            )));
        }
        Ok(granted)
    }
}

pub struct ClientRegistry {
    clients: HashMap<String, Arc<OAuthClient>>,
    /// Verified against when the client id is unknown.
    decoy_hash: String,
}

impl ClientRegistry {
    pub fn new(clients: impl IntoIterator<Item = OAuthClient>) -> Result<Self> {
        let clients = clients
            .into_iter()
            .inspect(|c| {
                tracing::debug!(
                    client_id = %c.client_id,
                    kind = c.kind.as_str(),
                    idp = c.kind.idp().map(|idp| idp.login_url.as_str()),
                    "Registering client"
                )
            })
            .map(|c| (c.client_id.clone(), Arc::new(c)))
            .collect::<HashMap<_, _>>();
        tracing::info!(count = clients.len(), "Registered OAuth clients");
        Ok(Self {
            clients,
            decoy_hash: hash_secret("unknown-client-decoy")?,
        })
    }

    pub fn lookup(&self, client_id: &str) -> Option<Arc<OAuthClient>> {
        self.clients.get(client_id).cloned()
    }

    /// Resolve a client and check its secret.
    ///
    /// Unknown client and wrong secret produce the same error after the same
    /// amount of hashing work.
    pub fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<Arc<OAuthClient>> {
        let rejected = || OAuthError::InvalidClient("client authentication failed".into());
        match self.lookup(client_id) {
            Some(client) if verify_secret(client_secret, &client.secret_hash) => Ok(client),
            Some(_) => Err(rejected()),
            None => {
                verify_against_decoy(client_secret, &self.decoy_hash);
                Err(rejected())
            }
        }
    }
}
