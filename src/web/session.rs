// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session cookie payload
//!
//! The cookie value is base64 encoded JSON:
//!
//! ```json
//! {
//!   "session_id": "5f0c1c9e-...",
//!   "username": "user",
//!   "roles": ["USER"]
//! }
//! ```
//!
//! The cookie is added as a Rocket private cookie, so the value is also
//! encrypted and authenticated with the server secret key. Passwords are
//! never part of the payload.

use std::collections::BTreeSet;

use base64::Engine;
use rocket::http::{Cookie, SameSite};
use rocket::time::Duration;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::security::Principal;

/// Decoded session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub session_id: String,
    pub username: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl SessionCookie {
    pub fn new(session_id: impl Into<String>, principal: &Principal) -> Self {
        Self {
            session_id: session_id.into(),
            username: principal.username.clone(),
            roles: principal.roles.clone(),
        }
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.username.clone(), self.roles.iter().cloned())
    }

    /// Base64 JSON representation.
    pub fn encode(&self) -> String {
        // Serializing strings and a set of strings cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        base64::engine::general_purpose::STANDARD.encode(json)
    }

    /// Parse a cookie value, `None` on any malformed input.
    pub fn decode(value: &str) -> Option<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(value)
            .ok()?;
        let cookie: Self = serde_json::from_slice(&decoded).ok()?;
        if cookie.session_id.is_empty() || cookie.username.is_empty() {
            return None;
        }
        Some(cookie)
    }

    /// HTTP-only cookie carrying this session, named after `settings`.
    pub fn to_cookie(&self, settings: &SessionConfig) -> Cookie<'static> {
        let mut cookie = Cookie::new(settings.cookie_name.clone(), self.encode());
        cookie.set_http_only(true);
        cookie.set_path("/");
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(Duration::seconds(settings.max_age_secs));
        cookie
    }
}
