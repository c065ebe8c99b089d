//! Resource owners.

use std::collections::HashMap;

use crate::credentials::{hash_secret, verify_against_decoy, verify_secret};
use crate::error::{OAuthError, Result};

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 PHC hash of the password.
    pub password_hash: String,
}

/// Bootstrapped, read-only user directory keyed by login name.
pub struct UserDirectory {
    by_username: HashMap<String, User>,
    decoy_hash: String,
}

impl UserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Result<Self> {
        let by_username = users
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect::<HashMap<_, _>>();
        tracing::info!(count = by_username.len(), "Loaded users");
        Ok(Self {
            by_username,
            decoy_hash: hash_secret("unknown-user-decoy")?,
        })
    }

    /// Check a username/password pair and return the user id.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let verified = match self.by_username.get(username) {
            Some(user) => verify_secret(password, &user.password_hash).then(|| user.id.clone()),
            None => {
                verify_against_decoy(password, &self.decoy_hash);
                None
            }
        };
        verified.ok_or_else(|| OAuthError::AccessDenied("Invalid credentials".into()))
    }
}
