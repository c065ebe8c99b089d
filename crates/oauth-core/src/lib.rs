//! OAuth 2.0 authorization server core.
//!
//! Issues and validates bearer tokens for first-party clients through the
//! authorization-code flow, and bridges identities from an external IdP
//! either by code exchange or by bearer assertion. Everything is in memory;
//! the HTTP surface lives in the `auth-service` crate.

pub mod bridge;
pub mod client;
pub mod clock;
pub mod code_store;
pub mod codec;
pub mod credentials;
pub mod error;
pub mod scope;
pub mod server;
pub mod token_store;
pub mod user;
pub mod validator;

pub use bridge::{AssertionPolicy, ExternalIdentity, IdentityBridge, IdentityProvider};
pub use client::{ClientKind, ClientRegistry, IdpEndpoint, OAuthClient};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use code_store::AuthorizationCodeStore;
pub use codec::{ExternalSubject, TokenClaims, TokenCodec, TokenKind};
pub use error::{OAuthError, Result};
pub use scope::Scopes;
pub use server::{AuthorizationServer, FederatedTokenResponse, PreGrant, TokenResponse};
pub use token_store::TokenStore;
pub use user::{User, UserDirectory};
pub use validator::{ValidatedClaims, ValidationSource};
