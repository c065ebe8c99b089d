#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth_core::bridge::{
    CodeExchange, ExternalTokenSet, IdentityProvider, PublicKeyVerifier,
};
use oauth_core::credentials::hash_secret;
use oauth_core::{
    AssertionPolicy, AuthorizationCodeStore, AuthorizationServer, Clock, ClientKind,
    ClientRegistry, ExternalIdentity, IdentityBridge, IdpEndpoint, ManualClock, OAuthClient,
    OAuthError, Result, Scopes, SharedClock, TokenCodec, TokenStore, User, UserDirectory,
};

pub const SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const ISSUER: &str = "https://login.example.com";
pub const REDIRECT: &str = "https://app/cb";
pub const FEDERATED_REDIRECT: &str = "https://app/federated/cb";

const PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/idp_private.pem");
const PUBLIC_PEM: &[u8] = include_bytes!("../fixtures/idp_public.pem");

/// IdP stand-in that accepts one external code.
pub struct StubProvider {
    pub valid_code: String,
    pub identity: ExternalIdentity,
    pub calls: Mutex<usize>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            valid_code: "ext-code".into(),
            identity: ExternalIdentity {
                id: "005xx0000012345".into(),
                email: Some("ada@example.com".into()),
                name: Some("Ada Lovelace".into()),
                organization_id: "00Dxx0000001gEH".into(),
            },
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn exchange_code(&self, _idp: &IdpEndpoint, exchange: CodeExchange<'_>) -> Result<ExternalTokenSet> {
        *self.calls.lock().unwrap() += 1;
        if exchange.code != self.valid_code {
            return Err(OAuthError::InvalidGrant("external authorization code rejected".into()));
        }
        Ok(ExternalTokenSet {
            access_token: "ext-access".into(),
            instance_url: "https://instance.example.com".into(),
        })
    }

    async fn user_info(&self, _access_token: &str, _instance_url: &str) -> Result<ExternalIdentity> {
        Ok(self.identity.clone())
    }
}

pub struct Fixture {
    pub server: AuthorizationServer,
    pub clock: ManualClock,
    pub codec: Arc<TokenCodec>,
    pub tokens: Arc<TokenStore>,
    pub codes: Arc<AuthorizationCodeStore>,
    pub provider: Arc<StubProvider>,
}

fn client(id: &str, secret: &str, redirect: &str, scopes: &str, kind: ClientKind) -> OAuthClient {
    OAuthClient {
        client_id: id.into(),
        secret_hash: hash_secret(secret).unwrap(),
        redirect_uris: [redirect.to_string()].into(),
        scopes: Scopes::parse(scopes),
        name: id.into(),
        kind,
    }
}

fn idp() -> IdpEndpoint {
    IdpEndpoint {
        login_url: ISSUER.into(),
        api_version: "v59.0".into(),
    }
}

pub fn fixture() -> Fixture {
    let clock = ManualClock::default();
    let shared: SharedClock = Arc::new(clock.clone());

    let clients = Arc::new(
        ClientRegistry::new([
            client("c1", "s1", REDIRECT, "read", ClientKind::Standard),
            client(
                "sf-app",
                "sf-secret",
                FEDERATED_REDIRECT,
                "email:validate api",
                ClientKind::FederatedConnectedApp(idp()),
            ),
            client(
                "sf-app_jwt",
                "unused",
                FEDERATED_REDIRECT,
                "email:validate api",
                ClientKind::FederatedBearer(idp()),
            ),
        ])
        .unwrap(),
    );
    let users = Arc::new(
        UserDirectory::new([User {
            id: "user-1".into(),
            username: "demo@example.com".into(),
            password_hash: hash_secret("demo123").unwrap(),
        }])
        .unwrap(),
    );
    let codes = Arc::new(AuthorizationCodeStore::new(shared.clone()));
    let tokens = Arc::new(TokenStore::new(shared.clone()));
    let codec = Arc::new(TokenCodec::new(SECRET, shared.clone()).unwrap());

    let provider = Arc::new(StubProvider::new());
    let bridge = IdentityBridge::new(
        clients.clone(),
        provider.clone(),
        Arc::new(PublicKeyVerifier::from_rsa_pem(PUBLIC_PEM).unwrap()),
        AssertionPolicy {
            issuer: ISSUER.into(),
            audience: "sf-app".into(),
            client_id: "sf-app_jwt".into(),
        },
        shared.clone(),
    );

    let server = AuthorizationServer::new(
        clients,
        users,
        codes.clone(),
        tokens.clone(),
        codec.clone(),
        shared,
    )
    .with_federation(Arc::new(bridge))
    .unwrap();

    Fixture {
        server,
        clock,
        codec,
        tokens,
        codes,
        provider,
    }
}

impl Fixture {
    /// Run the login and code steps for `c1` and return the code.
    pub fn code_for(&self, requested_scope: &str) -> String {
        let pre = self
            .server
            .prepare_authorization("code", "c1", REDIRECT, Some(requested_scope), Some("xyz"))
            .unwrap();
        let user_id = self
            .server
            .authenticate_user("demo@example.com", "demo123")
            .unwrap();
        self.server
            .issue_code(&pre.client_id, &pre.redirect_uri, &user_id, &pre.scope)
            .unwrap()
    }

    /// An IdP-signed bearer assertion valid for five minutes.
    pub fn assertion(&self, overrides: serde_json::Value) -> String {
        let mut claims = serde_json::json!({
            "iss": ISSUER,
            "aud": "sf-app",
            "sub": "005xx0000012345",
            "exp": (self.clock.now() + Duration::minutes(5)).timestamp(),
            "organization_id": "00Dxx0000001gEH"
        });
        if let (Some(base), Some(extra)) = (claims.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        let key = EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap();
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
    }
}
