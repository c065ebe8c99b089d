//! Configuration loading and management

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth_core::bridge::{
    AssertionSignatureVerifier, ClaimsOnlyDecoder, DEFAULT_REQUEST_TIMEOUT, HttpIdentityProvider,
    PublicKeyVerifier,
};
use oauth_core::credentials::hash_secret;
use oauth_core::{
    AssertionPolicy, AuthorizationCodeStore, AuthorizationServer, ClientKind, ClientRegistry,
    IdentityBridge, IdpEndpoint, OAuthClient, Scopes, SharedClock, TokenCodec, TokenStore, User,
    UserDirectory,
};
use serde::{Deserialize, Serialize};

/// Main configuration for the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HS256 signing secret (32+ bytes). `AUTH_TOKEN_SECRET` takes precedence.
    /// If neither is set, a random secret is generated at startup and issued
    /// tokens won't survive restarts.
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Registered OAuth clients
    #[serde(default = "default_clients")]
    pub clients: Vec<ClientConfig>,

    /// Users who can sign in on the login form
    #[serde(default = "default_users")]
    pub users: Vec<UserConfig>,

    /// External identity provider settings; federated flows are off without it
    #[serde(default)]
    pub federation: Option<FederationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    /// Plaintext secret, hashed at startup
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub name: String,
    #[serde(flatten)]
    pub kind: ClientKindConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientKindConfig {
    Standard,
    FederatedConnectedApp { login_url: String, api_version: String },
    FederatedBearer { login_url: String, api_version: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub username: String,
    /// Plaintext password, hashed at startup
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// IdP login URL; also the required `iss` of bearer assertions
    pub login_url: String,
    /// Required `aud` of bearer assertions
    pub audience: String,
    /// Federated-bearer client that assertion holders are issued tokens as
    pub assertion_client_id: String,
    /// Timeout for each outbound IdP request in seconds (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    pub assertion_verification: AssertionVerification,
    /// Connected app that `GET /federated/callback` redeems IdP codes as
    #[serde(default)]
    pub callback: Option<CallbackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// A `federated_connected_app` client from `clients`
    pub client_id: String,
    /// Must be one of that client's `redirect_uris`
    pub redirect_uri: String,
}

/// Credentials the federated callback exchanges codes with
#[derive(Debug, Clone)]
pub struct FederatedCallback {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// How bearer-assertion signatures are checked. There is no default; the
/// operator has to pick one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AssertionVerification {
    /// RS256 against the IdP's public key (PEM)
    PublicKey { public_key_pem: String },
    /// Decode claims without checking the signature (development only)
    ClaimsOnly,
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_clients() -> Vec<ClientConfig> {
    vec![ClientConfig {
        client_id: "email-validator-web".to_string(),
        client_secret: "web-client-secret".to_string(),
        redirect_uris: vec!["http://localhost:3001".to_string()],
        scopes: vec!["email:validate".to_string()],
        name: "Email Validator Web".to_string(),
        kind: ClientKindConfig::Standard,
    }]
}

fn default_users() -> Vec<UserConfig> {
    vec![UserConfig {
        id: "user-1".to_string(),
        username: "demo@example.com".to_string(),
        password: "demo123".to_string(),
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token_secret: None,
            clients: default_clients(),
            users: default_users(),
            federation: None,
        }
    }
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path).join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_file
            );
            let config = Config::default();

            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }

    /// Resolve the connected app behind `GET /federated/callback`, if any.
    pub fn federated_callback(&self) -> Result<Option<FederatedCallback>> {
        let Some(callback) = self.federation.as_ref().and_then(|f| f.callback.as_ref()) else {
            return Ok(None);
        };
        let client = self
            .clients
            .iter()
            .find(|c| c.client_id == callback.client_id)
            .with_context(|| format!("Callback client {} is not configured", callback.client_id))?;
        if !matches!(client.kind, ClientKindConfig::FederatedConnectedApp { .. }) {
            anyhow::bail!("Callback client {} is not a federated connected app", client.client_id);
        }
        if !client.redirect_uris.contains(&callback.redirect_uri) {
            anyhow::bail!(
                "Callback redirect {} is not registered for {}",
                callback.redirect_uri,
                client.client_id
            );
        }
        Ok(Some(FederatedCallback {
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            redirect_uri: callback.redirect_uri.clone(),
        }))
    }

    /// Assemble the authorization server this configuration describes.
    pub fn build_server(&self, token_secret: &str, clock: SharedClock) -> Result<AuthorizationServer> {
        let clients = self
            .clients
            .iter()
            .map(ClientConfig::to_client)
            .collect::<Result<Vec<_>>>()?;
        let clients = Arc::new(ClientRegistry::new(clients)?);

        let users = self
            .users
            .iter()
            .map(UserConfig::to_user)
            .collect::<Result<Vec<_>>>()?;
        let users = Arc::new(UserDirectory::new(users)?);

        let codec = TokenCodec::new(token_secret.as_bytes(), clock.clone())
            .context("Invalid token secret")?;

        let server = AuthorizationServer::new(
            clients.clone(),
            users,
            Arc::new(AuthorizationCodeStore::new(clock.clone())),
            Arc::new(TokenStore::new(clock.clone())),
            Arc::new(codec),
            clock.clone(),
        );

        match &self.federation {
            Some(federation) => {
                let bridge = federation.build_bridge(clients, clock)?;
                Ok(server
                    .with_federation(Arc::new(bridge))
                    .context("Invalid federation settings")?)
            }
            None => {
                tracing::info!("No federation configured; federated grants are disabled");
                Ok(server)
            }
        }
    }
}

impl ClientConfig {
    fn to_client(&self) -> Result<OAuthClient> {
        let kind = match &self.kind {
            ClientKindConfig::Standard => ClientKind::Standard,
            ClientKindConfig::FederatedConnectedApp { login_url, api_version } => {
                ClientKind::FederatedConnectedApp(IdpEndpoint {
                    login_url: login_url.clone(),
                    api_version: api_version.clone(),
                })
            }
            ClientKindConfig::FederatedBearer { login_url, api_version } => {
                ClientKind::FederatedBearer(IdpEndpoint {
                    login_url: login_url.clone(),
                    api_version: api_version.clone(),
                })
            }
        };
        Ok(OAuthClient {
            client_id: self.client_id.clone(),
            secret_hash: hash_secret(&self.client_secret)
                .with_context(|| format!("Failed to hash secret for client {}", self.client_id))?,
            redirect_uris: self.redirect_uris.iter().cloned().collect(),
            scopes: self.scopes.iter().cloned().collect::<Scopes>(),
            name: self.name.clone(),
            kind,
        })
    }
}

impl UserConfig {
    fn to_user(&self) -> Result<User> {
        Ok(User {
            id: self.id.clone(),
            username: self.username.clone(),
            password_hash: hash_secret(&self.password)
                .with_context(|| format!("Failed to hash password for user {}", self.id))?,
        })
    }
}

impl FederationConfig {
    fn build_bridge(&self, clients: Arc<ClientRegistry>, clock: SharedClock) -> Result<IdentityBridge> {
        let verifier: Arc<dyn AssertionSignatureVerifier> = match &self.assertion_verification {
            AssertionVerification::PublicKey { public_key_pem } => Arc::new(
                PublicKeyVerifier::from_rsa_pem(public_key_pem.as_bytes())
                    .context("Invalid assertion public key")?,
            ),
            AssertionVerification::ClaimsOnly => Arc::new(ClaimsOnlyDecoder::new()),
        };
        let provider = HttpIdentityProvider::new(Duration::from_secs(self.request_timeout_secs))?;

        Ok(IdentityBridge::new(
            clients,
            Arc::new(provider),
            verifier,
            AssertionPolicy {
                issuer: self.login_url.clone(),
                audience: self.audience.clone(),
                client_id: self.assertion_client_id.clone(),
            },
            clock,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth_core::SystemClock;

    const SECRET: &str = "config-test-secret-config-test-secret";

    #[test]
    fn test_load_writes_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();

        let config = Config::load(path).unwrap();
        assert_eq!(config.clients[0].client_id, "email-validator-web");
        assert!(dir.path().join("config.json").exists());

        let reloaded = Config::load(path).unwrap();
        assert_eq!(reloaded.users[0].username, "demo@example.com");
    }

    #[test]
    fn test_parse_federated_config() {
        let json = r#"{
            "token_secret": "from-file",
            "clients": [
                {
                    "client_id": "sf-app",
                    "client_secret": "sf-secret",
                    "redirect_uris": ["http://localhost:3001/federated/callback"],
                    "scopes": ["email:validate", "api"],
                    "name": "Salesforce",
                    "kind": "federated_connected_app",
                    "login_url": "https://login.salesforce.com",
                    "api_version": "v59.0"
                },
                {
                    "client_id": "sf-app_jwt",
                    "client_secret": "unused",
                    "redirect_uris": [],
                    "scopes": ["email:validate"],
                    "name": "Salesforce server-to-server",
                    "kind": "federated_bearer",
                    "login_url": "https://login.salesforce.com",
                    "api_version": "v59.0"
                }
            ],
            "users": [],
            "federation": {
                "login_url": "https://login.salesforce.com",
                "audience": "sf-app",
                "assertion_client_id": "sf-app_jwt",
                "assertion_verification": { "mode": "claims_only" },
                "callback": {
                    "client_id": "sf-app",
                    "redirect_uri": "http://localhost:3001/federated/callback"
                }
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.clients[0].kind,
            ClientKindConfig::FederatedConnectedApp {
                login_url: "https://login.salesforce.com".into(),
                api_version: "v59.0".into(),
            }
        );
        let federation = config.federation.as_ref().unwrap();
        assert_eq!(federation.request_timeout_secs, 10);

        let server = config.build_server(SECRET, Arc::new(SystemClock)).unwrap();
        assert!(server.is_federated_client("sf-app"));
        assert!(!server.is_federated_client("sf-app_jwt"));

        let callback = config.federated_callback().unwrap().unwrap();
        assert_eq!(callback.client_id, "sf-app");
        assert_eq!(callback.client_secret, "sf-secret");
    }

    #[test]
    fn test_callback_must_name_a_connected_app_redirect() {
        let json = |client_id: &str, redirect_uri: &str| {
            format!(
                r#"{{
                    "clients": [
                        {{
                            "client_id": "sf-app",
                            "client_secret": "sf-secret",
                            "redirect_uris": ["http://localhost:3001/federated/callback"],
                            "scopes": ["api"],
                            "name": "Salesforce",
                            "kind": "federated_connected_app",
                            "login_url": "https://login.salesforce.com",
                            "api_version": "v59.0"
                        }},
                        {{
                            "client_id": "web",
                            "client_secret": "web-secret",
                            "redirect_uris": ["http://localhost:3001/federated/callback"],
                            "scopes": ["api"],
                            "name": "Web",
                            "kind": "standard"
                        }}
                    ],
                    "federation": {{
                        "login_url": "https://login.salesforce.com",
                        "audience": "sf-app",
                        "assertion_client_id": "sf-app_jwt",
                        "assertion_verification": {{ "mode": "claims_only" }},
                        "callback": {{ "client_id": "{client_id}", "redirect_uri": "{redirect_uri}" }}
                    }}
                }}"#
            )
        };
        let registered = "http://localhost:3001/federated/callback";

        for (client_id, redirect_uri) in [
            ("web", registered),
            ("missing", registered),
            ("sf-app", "http://localhost:3001/elsewhere"),
        ] {
            let config: Config = serde_json::from_str(&json(client_id, redirect_uri)).unwrap();
            assert!(config.federated_callback().is_err(), "{client_id} {redirect_uri}");
        }

        let config: Config = serde_json::from_str(&json("sf-app", registered)).unwrap();
        assert!(config.federated_callback().unwrap().is_some());
        assert!(Config::default().federated_callback().unwrap().is_none());
    }

    #[test]
    fn test_federation_needs_a_bearer_client() {
        let mut config = Config::default();
        config.federation = Some(FederationConfig {
            login_url: "https://login.example.com".into(),
            audience: "x".into(),
            assertion_client_id: "email-validator-web".into(),
            request_timeout_secs: 10,
            assertion_verification: AssertionVerification::ClaimsOnly,
            callback: None,
        });
        assert!(config.build_server(SECRET, Arc::new(SystemClock)).is_err());
    }

    #[test]
    fn test_user_entries_carry_only_credentials() {
        let json = r#"{
            "users": [
                {
                    "id": "user-2",
                    "username": "old@example.com",
                    "password": "pw",
                    "scopes": ["email:validate"]
                }
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let user = config.users[0].to_user().unwrap();
        assert_eq!(user.id, "user-2");

        let written = serde_json::to_value(Config::default()).unwrap();
        assert!(written["users"][0].get("scopes").is_none());

        let server = config.build_server(SECRET, Arc::new(SystemClock)).unwrap();
        assert_eq!(server.authenticate_user("old@example.com", "pw").unwrap(), "user-2");
    }

    #[test]
    fn test_short_token_secret_is_refused() {
        let config = Config::default();
        assert!(config.build_server("short", Arc::new(SystemClock)).is_err());
    }
}
