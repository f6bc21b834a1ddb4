// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Local user accounts
//!
//! Users listed here back the [`InMemoryCredentialStore`] used by the local
//! login form. Accounts managed by the SSO provider never appear here.

use serde::{Deserialize, Serialize};

use crate::security::{
    decode_password_hash, InMemoryCredentialStore, Principal, Result, SecurityError,
    DEMO_PASSWORD_HASH,
};

/// User definition for local authentication
///
/// # Fields
///
/// * `user` - The username used for authentication
/// * `pass` - Base64-encoded password hash (created with openssl passwd -5 | base64 -w0)
/// * `roles` - Roles granted to the user, matched against rule requirements
///
/// # Example
///
/// ```
/// use rust_sso_gate::config::User;
///
/// let user = User {
///     user: "user".to_string(),
///     pass: "JDUkemtkZW1vJHM1a1g3SDFYbVNadjdMeURwempJdkJYdXhKVTZJY3JiTFJxazdwWThKV0IK".to_string(),
///     roles: vec!["USER".to_string()],
///     email: None,
///     name: None,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The username used for authentication
    pub user: String,

    /// Base64-encoded password hash
    ///
    /// This should be created using: `openssl passwd -5 <password> | base64 -w0`
    pub pass: String,

    /// Roles held by the user, e.g. `USER` or `ADMIN`
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal::new(self.user.clone(), self.roles.iter().cloned())
    }
}

impl Default for User {
    /// The demo account: `user` / `password` with role `USER`.
    /// Do not use it in production.
    fn default() -> Self {
        Self {
            user: "user".to_string(),
            pass: DEMO_PASSWORD_HASH.to_string(),
            roles: vec!["USER".to_string()],
            email: None,
            name: Some("Demo User".to_string()),
        }
    }
}

/// Configuration of local user accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// List of users with their credentials and roles
    pub users: Vec<User>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            users: vec![User::default()],
        }
    }
}

impl AccessConfig {
    /// Build the credential store, decoding every password hash.
    pub fn credential_store(&self) -> Result<InMemoryCredentialStore> {
        let mut store = InMemoryCredentialStore::new();
        for user in &self.users {
            let hash = decode_password_hash(&user.pass).map_err(|e| with_user_name(&user.user, e))?;
            store.insert(user.principal(), hash);
        }
        Ok(store)
    }
}

fn with_user_name(user: &str, error: SecurityError) -> SecurityError {
    match error {
        SecurityError::Configuration(message) => {
            SecurityError::Configuration(format!("User '{}': {}", user, message))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CredentialStore;

    #[tokio::test]
    async fn test_default_access_is_the_demo_user() {
        let store = AccessConfig::default().credential_store().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.lookup("user").await.unwrap(),
            Principal::new("user", ["USER"])
        );
    }

    #[test]
    fn test_bad_hash_names_the_user() {
        let access = AccessConfig {
            users: vec![User {
                user: "broken".to_string(),
                pass: "cGFzc3dvcmQ=".to_string(),
                roles: vec![],
                email: None,
                name: None,
            }],
        };
        let err = access.credential_store().unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Configuration error: User 'broken': "), "{}", message);
        assert_eq!(message.matches("Configuration error").count(), 1, "{}", message);
    }
}
