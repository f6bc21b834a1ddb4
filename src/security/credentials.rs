// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Local credential lookup
//!
//! Only used for paths that authenticate locally instead of through the SSO
//! provider. Hash verification is delegated to a [`PasswordVerifier`]; the
//! stock [`PwhashVerifier`] understands the crypt formats produced by
//! `openssl passwd` (`$1$`, `$5$`, `$6$`, `$apr1$`).

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use log::debug;

use super::error::{Result, SecurityError};
use super::request::Principal;

/// Demo password hash for `password`, as `openssl passwd -5 | base64 -w0`.
pub const DEMO_PASSWORD_HASH: &str =
    "JDUkemtkZW1vJHM1a1g3SDFYbVNadjdMeURwempJdkJYdXhKVTZJY3JiTFJxazdwWThKV0IK";

/// A principal together with its password hash (crypt format, decoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub principal: Principal,
    pub password_hash: String,
}

/// Lookup of principals by user name.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credential for `username`, or [`SecurityError::Lookup`].
    async fn credential(&self, username: &str) -> Result<StoredCredential>;

    /// Principal for `username`, or [`SecurityError::Lookup`].
    async fn lookup(&self, username: &str) -> Result<Principal> {
        Ok(self.credential(username).await?.principal)
    }
}

/// Verifies a clear-text password against a stored hash.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// [`PasswordVerifier`] backed by the `pwhash` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PwhashVerifier;

impl PasswordVerifier for PwhashVerifier {
    fn verify(&self, password: &str, hash: &str) -> bool {
        pwhash::unix::verify(password, hash)
    }
}

/// Decode a base64-wrapped crypt hash, dropping the trailing newline that
/// `openssl passwd` emits.
pub fn decode_password_hash(encoded: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| SecurityError::configuration(format!("Password hash is not valid base64: {}", e)))?;
    let hash = String::from_utf8(bytes)
        .map_err(|_| SecurityError::configuration("Password hash is not valid UTF-8"))?;
    let hash = hash.trim_end_matches(['\n', '\r']).to_string();
    if !["$1$", "$5$", "$6$", "$apr1$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
    {
        return Err(SecurityError::configuration(
            "Password hash must be a crypt hash, use: openssl passwd -5 <password> | base64 -w0",
        ));
    }
    Ok(hash)
}

/// Fixed in-memory credential store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    users: HashMap<String, StoredCredential>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the single demo account `user` / `password`, role `USER`.
    /// Not for production use.
    pub fn demo() -> Self {
        let mut store = Self::new();
        // The constant is known to decode.
        if let Ok(hash) = decode_password_hash(DEMO_PASSWORD_HASH) {
            store.insert(Principal::new("user", ["USER"]), hash);
        }
        store
    }

    /// Add or replace an entry. `password_hash` is the decoded crypt string.
    pub fn insert(&mut self, principal: Principal, password_hash: impl Into<String>) {
        self.users.insert(
            principal.username.clone(),
            StoredCredential {
                principal,
                password_hash: password_hash.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credential(&self, username: &str) -> Result<StoredCredential> {
        self.users
            .get(username)
            .cloned()
            .ok_or_else(|| SecurityError::Lookup {
                username: username.to_string(),
            })
    }
}

/// Authenticate `username` with `password`.
///
/// Both an unknown user and a wrong password are recoverable errors
/// ([`SecurityError::is_authentication_failure`]).
pub async fn authenticate(
    store: &dyn CredentialStore,
    verifier: &dyn PasswordVerifier,
    username: &str,
    password: &str,
) -> Result<Principal> {
    let credential = store.credential(username).await?;
    if verifier.verify(password, &credential.password_hash) {
        debug!("User '{}' authenticated", username);
        Ok(credential.principal)
    } else {
        debug!("Password mismatch for user '{}'", username);
        Err(SecurityError::InvalidCredentials {
            username: username.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_password_hash() {
        let hash = decode_password_hash(DEMO_PASSWORD_HASH).unwrap();
        assert!(hash.starts_with("$5$zkdemo$"));
        assert!(!hash.ends_with('\n'));

        let plain = base64::engine::general_purpose::STANDARD.encode("password");
        assert!(decode_password_hash(&plain).is_err());
        assert!(decode_password_hash("***").is_err());
    }

    #[test]
    fn test_pwhash_verifier() {
        let hash = decode_password_hash(DEMO_PASSWORD_HASH).unwrap();
        assert!(PwhashVerifier.verify("password", &hash));
        assert!(!PwhashVerifier.verify("Password", &hash));
    }

    #[tokio::test]
    async fn test_demo_store_has_one_user() {
        let store = InMemoryCredentialStore::demo();
        assert_eq!(store.len(), 1);
        let principal = store.lookup("user").await.unwrap();
        assert_eq!(principal, Principal::new("user", ["USER"]));
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let store = InMemoryCredentialStore::demo();
        let err = store.lookup("admin").await.unwrap_err();
        assert_eq!(
            err,
            SecurityError::Lookup {
                username: "admin".to_string()
            }
        );
        assert!(err.is_authentication_failure());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = InMemoryCredentialStore::demo();
        let principal = authenticate(&store, &PwhashVerifier, "user", "password")
            .await
            .unwrap();
        assert_eq!(principal.username, "user");

        let wrong = authenticate(&store, &PwhashVerifier, "user", "nope").await;
        assert!(matches!(wrong, Err(SecurityError::InvalidCredentials { .. })));

        let unknown = authenticate(&store, &PwhashVerifier, "ghost", "password").await;
        assert!(matches!(unknown, Err(SecurityError::Lookup { .. })));
    }
}
