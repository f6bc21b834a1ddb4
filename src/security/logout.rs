// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session teardown and SSO logout
//!
//! Logging out has three parts:
//!
//! 1. the local session keyed by the session id is invalidated in the
//!    [`SessionStore`] (idempotent, safe to retry),
//! 2. the caller is told which cookies to clear,
//! 3. the browser is redirected to the identity provider's end-session
//!    endpoint with `post_logout_redirect_uri` pointing back at the
//!    application home page.
//!
//! ```
//! use rust_sso_gate::security::build_logout_url;
//!
//! let url = build_logout_url("https://idp.example/logout", "https://app.example/").unwrap();
//! assert_eq!(
//!     url,
//!     "https://idp.example/logout?post_logout_redirect_uri=https%3A%2F%2Fapp.example%2F"
//! );
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use url::{form_urlencoded, Url};

use super::error::{Result, SecurityError};
use super::request::Principal;

/// Query parameter carrying the post-logout landing page.
pub const POST_LOGOUT_REDIRECT_PARAM: &str = "post_logout_redirect_uri";

/// A request to end the session `session_id`. Consumed by
/// [`SessionTerminator::logout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRequest {
    pub session_id: String,
}

impl LogoutRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// What the host layer must do to finish a logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectInstruction {
    /// Absolute URL of the identity provider's end-session endpoint,
    /// including the post-logout redirect parameter.
    pub location: String,
    /// Cookie names to expire on the response.
    pub clear_cookies: Vec<String>,
}

/// Storage of local session state.
///
/// Production deployments back this with a shared cache or database;
/// [`InMemorySessionStore`] serves single-process setups and tests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Drop the session. Invalidating an unknown or already invalidated
    /// session succeeds.
    async fn invalidate(&self, session_id: &str) -> Result<()>;
}

/// Process-local session registry.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Principal>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `principal` and return its id.
    pub fn create(&self, principal: Principal) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!("Opening session for '{}'", principal.username);
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), principal);
        session_id
    }

    /// Principal of an active session.
    pub fn get(&self, session_id: &str) -> Option<Principal> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn invalidate(&self, session_id: &str) -> Result<()> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        match removed {
            Some(principal) => debug!("Session of '{}' invalidated", principal.username),
            None => debug!("Session already invalidated"),
        }
        Ok(())
    }
}

/// Parse `value` as an absolute http(s) URL.
fn parse_absolute_url(what: &str, value: &str) -> Result<Url> {
    if value.trim().is_empty() {
        return Err(SecurityError::configuration(format!("{} is empty", what)));
    }
    let url = Url::parse(value).map_err(|e| {
        SecurityError::configuration(format!("{} '{}' is not an absolute URL: {}", what, value, e))
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(SecurityError::configuration(format!(
            "{} '{}' must be an http or https URL",
            what, value
        )));
    }
    Ok(url)
}

/// Check that `value` is usable as an SSO endpoint or home page.
pub fn validate_absolute_url(what: &str, value: &str) -> Result<()> {
    parse_absolute_url(what, value).map(|_| ())
}

/// Build `{end_session_endpoint}?post_logout_redirect_uri={urlencoded(home_page)}`.
///
/// The endpoint is kept as written (a host-only endpoint gets no `/`
/// added) and an existing query string on it is extended with `&`. The home
/// page is `application/x-www-form-urlencoded`, so a space becomes `+`:
/// decode the parameter with form decoding (`Url::query_pairs`) to get back
/// exactly `post_logout_redirect_url`.
///
/// # Errors
///
/// [`SecurityError::Configuration`] if either URL is empty or not an
/// absolute http(s) URL, or if the endpoint carries a fragment.
pub fn build_logout_url(end_session_endpoint: &str, post_logout_redirect_url: &str) -> Result<String> {
    let endpoint = parse_absolute_url("End-session endpoint", end_session_endpoint)?;
    validate_absolute_url("Post-logout redirect URL", post_logout_redirect_url)?;
    if endpoint.fragment().is_some() {
        return Err(SecurityError::configuration(format!(
            "End-session endpoint '{}' must not contain a fragment",
            end_session_endpoint
        )));
    }

    let endpoint = end_session_endpoint.trim();
    let separator = if !endpoint.contains('?') {
        "?"
    } else if endpoint.ends_with('?') || endpoint.ends_with('&') {
        ""
    } else {
        "&"
    };
    let parameter = form_urlencoded::Serializer::new(String::new())
        .append_pair(POST_LOGOUT_REDIRECT_PARAM, post_logout_redirect_url)
        .finish();
    Ok(format!("{}{}{}", endpoint, separator, parameter))
}

/// Coordinates local session teardown with the identity provider logout.
pub struct SessionTerminator {
    store: Arc<dyn SessionStore>,
    session_cookies: Vec<String>,
}

impl SessionTerminator {
    /// `session_cookies` are the cookie names every logout clears.
    pub fn new(store: Arc<dyn SessionStore>, session_cookies: Vec<String>) -> Self {
        Self {
            store,
            session_cookies,
        }
    }

    /// Cookies to clear, also when [`logout`](Self::logout) fails.
    pub fn session_cookies(&self) -> &[String] {
        &self.session_cookies
    }

    /// End `session` and compute where to send the browser.
    ///
    /// URLs are validated before the store is touched. A failing store is
    /// logged and returned as [`SecurityError::ExternalService`]; the caller
    /// still clears [`session_cookies`](Self::session_cookies) in that case.
    pub async fn logout(
        &self,
        session: LogoutRequest,
        end_session_endpoint: &str,
        post_logout_redirect_url: &str,
    ) -> Result<RedirectInstruction> {
        let location = build_logout_url(end_session_endpoint, post_logout_redirect_url)?;

        if let Err(e) = self.store.invalidate(&session.session_id).await {
            error!("Failed to invalidate session: {}", e);
            return Err(match e {
                SecurityError::ExternalService(message) => SecurityError::ExternalService(message),
                other => SecurityError::ExternalService(other.to_string()),
            });
        }

        info!("Session terminated, redirecting to identity provider");
        Ok(RedirectInstruction {
            location,
            clear_cookies: self.session_cookies.clone(),
        })
    }
}

impl std::fmt::Debug for SessionTerminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTerminator")
            .field("session_cookies", &self.session_cookies)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnreachableStore;

    #[async_trait]
    impl SessionStore for UnreachableStore {
        async fn invalidate(&self, _session_id: &str) -> Result<()> {
            Err(SecurityError::ExternalService("connection refused".to_string()))
        }
    }

    fn terminator(store: Arc<dyn SessionStore>) -> SessionTerminator {
        SessionTerminator::new(store, vec!["user_session".to_string()])
    }

    #[test]
    fn test_logout_url_encoding() {
        let url = build_logout_url("https://idp.example/logout", "https://app.example/").unwrap();
        assert_eq!(
            url,
            "https://idp.example/logout?post_logout_redirect_uri=https%3A%2F%2Fapp.example%2F"
        );
    }

    #[test]
    fn test_logout_url_keeps_endpoint_text() {
        assert_eq!(
            build_logout_url("https://idp.example", "https://app.example/").unwrap(),
            "https://idp.example?post_logout_redirect_uri=https%3A%2F%2Fapp.example%2F"
        );
        assert_eq!(
            build_logout_url("https://idp.example/logout?", "https://app.example/").unwrap(),
            "https://idp.example/logout?post_logout_redirect_uri=https%3A%2F%2Fapp.example%2F"
        );
        assert!(build_logout_url("https://idp.example/logout#end", "https://app.example/").is_err());
    }

    #[test]
    fn test_logout_url_form_encodes_spaces() {
        let url = build_logout_url("https://idp.example/logout", "https://app.example/a b").unwrap();
        assert!(url.ends_with("=https%3A%2F%2Fapp.example%2Fa+b"), "{}", url);
    }

    #[test]
    fn test_logout_url_keeps_existing_query() {
        let url = build_logout_url(
            "https://idp.example/logout?client_id=zk",
            "https://app.example/home?tab=1 2",
        )
        .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "zk".to_string()),
                (
                    POST_LOGOUT_REDIRECT_PARAM.to_string(),
                    "https://app.example/home?tab=1 2".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_logout_url_rejects_bad_urls() {
        for (endpoint, home) in [
            ("", "https://app.example/"),
            ("https://idp.example/logout", ""),
            ("/logout", "https://app.example/"),
            ("https://idp.example/logout", "app.example"),
            ("mailto:admin@idp.example", "https://app.example/"),
            ("ftp://idp.example/logout", "https://app.example/"),
        ] {
            assert!(
                matches!(
                    build_logout_url(endpoint, home),
                    Err(SecurityError::Configuration(_))
                ),
                "{:?} / {:?}",
                endpoint,
                home
            );
        }
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let session_id = store.create(Principal::new("user", ["USER"]));
        assert!(store.is_active(&session_id));

        let terminator = terminator(store.clone());
        let instruction = terminator
            .logout(
                LogoutRequest::new(session_id.clone()),
                "https://idp.example/logout",
                "https://app.example/",
            )
            .await
            .unwrap();

        assert!(!store.is_active(&session_id));
        assert_eq!(instruction.clear_cookies, vec!["user_session".to_string()]);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let store = Arc::new(InMemorySessionStore::new());
        let session_id = store.create(Principal::new("user", ["USER"]));
        let terminator = terminator(store);

        let first = terminator
            .logout(
                LogoutRequest::new(session_id.clone()),
                "https://idp.example/logout",
                "https://app.example/",
            )
            .await
            .unwrap();
        let second = terminator
            .logout(
                LogoutRequest::new(session_id),
                "https://idp.example/logout",
                "https://app.example/",
            )
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_store_failure_is_external_service_error() {
        let terminator = terminator(Arc::new(UnreachableStore));
        let result = terminator
            .logout(
                LogoutRequest::new("abc"),
                "https://idp.example/logout",
                "https://app.example/",
            )
            .await;
        assert!(matches!(result, Err(SecurityError::ExternalService(_))));
        assert_eq!(terminator.session_cookies(), ["user_session".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_configuration_leaves_session_alone() {
        let store = Arc::new(InMemorySessionStore::new());
        let session_id = store.create(Principal::new("user", ["USER"]));
        let terminator = terminator(store.clone());

        let result = terminator
            .logout(LogoutRequest::new(session_id.clone()), "", "https://app.example/")
            .await;
        assert!(matches!(result, Err(SecurityError::Configuration(_))));
        assert!(store.is_active(&session_id));
    }
}
