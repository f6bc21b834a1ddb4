// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Single sign-on and session settings

use std::env;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::security::{build_logout_url, validate_absolute_url, Result, SecurityError};

/// Environment variable overriding [`SsoConfig::end_session_endpoint`].
pub const END_SESSION_ENDPOINT_ENV: &str = "END_SESSION_ENDPOINT";
/// Environment variable overriding [`SsoConfig::home_page`].
pub const HOME_PAGE_ENV: &str = "HOME_PAGE";

/// Identity provider settings.
///
/// Both URLs are required. They have no default so that a deployment which
/// forgot them refuses to start instead of logging users out to nowhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoConfig {
    /// End-session (logout) endpoint of the identity provider, absolute URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// Application home page the provider sends the browser back to after
    /// logout, absolute URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page: Option<String>,
}

impl SsoConfig {
    /// Override the URLs from `END_SESSION_ENDPOINT` and `HOME_PAGE`.
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = env::var(END_SESSION_ENDPOINT_ENV) {
            debug!("Overriding end-session endpoint from environment");
            self.end_session_endpoint = Some(endpoint);
        }
        if let Ok(home_page) = env::var(HOME_PAGE_ENV) {
            debug!("Overriding home page from environment");
            self.home_page = Some(home_page);
        }
    }

    /// Both URLs, validated as absolute http(s) URLs.
    pub fn urls(&self) -> Result<(&str, &str)> {
        let endpoint = self
            .end_session_endpoint
            .as_deref()
            .ok_or_else(|| SecurityError::configuration("sso.end_session_endpoint is required"))?;
        let home_page = self
            .home_page
            .as_deref()
            .ok_or_else(|| SecurityError::configuration("sso.home_page is required"))?;
        validate_absolute_url("sso.end_session_endpoint", endpoint)?;
        validate_absolute_url("sso.home_page", home_page)?;
        Ok((endpoint, home_page))
    }

    /// The full logout redirect URL.
    pub fn logout_url(&self) -> Result<String> {
        let (endpoint, home_page) = self.urls()?;
        build_logout_url(endpoint, home_page)
    }
}

fn default_cookie_name() -> String {
    "user_session".to_string()
}

fn default_clear_cookies() -> Vec<String> {
    vec![default_cookie_name(), "JSESSIONID".to_string()]
}

fn default_max_age_secs() -> i64 {
    3600
}

/// Local session cookie settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the private cookie holding the session.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Cookies removed on logout.
    #[serde(default = "default_clear_cookies")]
    pub clear_cookies: Vec<String>,

    /// Session cookie lifetime in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            clear_cookies: default_clear_cookies(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_urls_fail_closed() {
        let sso = SsoConfig::default();
        assert!(matches!(sso.urls(), Err(SecurityError::Configuration(_))));

        let sso = SsoConfig {
            end_session_endpoint: Some("https://idp.example/logout".to_string()),
            home_page: None,
        };
        let err = sso.logout_url().unwrap_err();
        assert!(err.to_string().contains("sso.home_page"));
    }

    #[test]
    fn test_logout_url() {
        let sso = SsoConfig {
            end_session_endpoint: Some("https://idp.example/logout".to_string()),
            home_page: Some("https://app.example/".to_string()),
        };
        assert_eq!(
            sso.logout_url().unwrap(),
            "https://idp.example/logout?post_logout_redirect_uri=https%3A%2F%2Fapp.example%2F"
        );
    }

    #[test]
    fn test_relative_home_page_rejected() {
        let sso = SsoConfig {
            end_session_endpoint: Some("https://idp.example/logout".to_string()),
            home_page: Some("/home".to_string()),
        };
        assert!(sso.urls().is_err());
    }
}
