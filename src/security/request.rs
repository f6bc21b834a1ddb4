// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request descriptors and principals
//!
//! The host HTTP layer turns every inbound request into a
//! [`RequestDescriptor`] before asking the [`Authorizer`](super::Authorizer)
//! for a decision. Descriptors are plain values: they are built once per
//! request and never mutated while being evaluated.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SecurityError;

/// HTTP request method as seen by the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
}

impl Method {
    /// Canonical upper-case name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "CONNECT" => Ok(Method::Connect),
            other => Err(SecurityError::configuration(format!(
                "Unknown HTTP method: {}",
                other
            ))),
        }
    }
}

/// An authenticated identity and the roles it holds.
///
/// Principals come either from the local [`CredentialStore`](super::CredentialStore)
/// or from an identity assertion made by the SSO provider. They are never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(username: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// `true` when every role in `required` is held by this principal.
    pub fn has_roles(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.roles)
    }
}

/// Normalized view of an inbound HTTP request.
///
/// # Fields
///
/// * `path` - Request path without the query string, e.g. `/zkau`
/// * `method` - Request method
/// * `query` - Raw query string as received, without the leading `?`
/// * `query_params` - Decoded query parameters; the first occurrence of a
///   repeated name wins
/// * `is_authenticated` - Whether the host layer found an authenticated session
/// * `principal_roles` - Roles of that session's principal
///
/// # Example
///
/// ```
/// use rust_sso_gate::security::{Method, RequestDescriptor};
///
/// let request = RequestDescriptor::parse(Method::Get, "/zkau?dtid=z_0&cmd_0=rmDesktop&opt_0=i");
/// assert_eq!(request.path, "/zkau");
/// assert_eq!(request.query_param("cmd_0"), Some("rmDesktop"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: Method,
    pub query: Option<String>,
    pub query_params: HashMap<String, String>,
    pub is_authenticated: bool,
    pub principal_roles: BTreeSet<String>,
}

impl RequestDescriptor {
    /// Descriptor for an anonymous request without query string.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            query: None,
            query_params: HashMap::new(),
            is_authenticated: false,
            principal_roles: BTreeSet::new(),
        }
    }

    /// Split a request target (`/path?query`) into a descriptor.
    pub fn parse(method: Method, target: &str) -> Self {
        match target.split_once('?') {
            Some((path, query)) => Self::new(method, path).with_query(query),
            None => Self::new(method, target),
        }
    }

    /// Attach a raw query string and decode its parameters.
    pub fn with_query(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut params = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        self.query_params = params;
        self.query = if raw.is_empty() { None } else { Some(raw) };
        self
    }

    /// Mark the request as coming from an authenticated principal.
    pub fn with_principal(mut self, principal: &Principal) -> Self {
        self.is_authenticated = true;
        self.principal_roles = principal.roles.clone();
        self
    }

    /// First decoded value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Path followed by `?query` when a query string is present.
    pub fn path_and_query(&self) -> Cow<'_, str> {
        match &self.query {
            Some(query) => Cow::Owned(format!("{}?{}", self.path, query)),
            None => Cow::Borrowed(&self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_path_and_query() {
        let request = RequestDescriptor::parse(Method::Post, "/zkau?dtid=z_1&cmd_0=rmDesktop&cmd_0=dup");
        assert_eq!(request.path, "/zkau");
        assert_eq!(request.query.as_deref(), Some("dtid=z_1&cmd_0=rmDesktop&cmd_0=dup"));
        assert_eq!(request.query_param("dtid"), Some("z_1"));
        assert_eq!(request.query_param("cmd_0"), Some("rmDesktop"));
        assert_eq!(request.path_and_query(), "/zkau?dtid=z_1&cmd_0=rmDesktop&cmd_0=dup");
    }

    #[test]
    fn test_query_params_are_decoded() {
        let request = RequestDescriptor::parse(Method::Get, "/search?q=hello+world&x=%2Fa");
        assert_eq!(request.query_param("q"), Some("hello world"));
        assert_eq!(request.query_param("x"), Some("/a"));
    }

    #[test]
    fn test_empty_query_is_absent() {
        let request = RequestDescriptor::parse(Method::Get, "/login?");
        assert_eq!(request.query, None);
        assert_eq!(request.path_and_query(), "/login");
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
        assert!("FETCH".parse::<Method>().is_err());
    }

    #[test]
    fn test_principal_role_containment() {
        let principal = Principal::new("user", ["USER", "AUDITOR"]);
        let required: BTreeSet<String> = ["USER".to_string()].into_iter().collect();
        assert!(principal.has_roles(&required));
        assert!(principal.has_roles(&BTreeSet::new()));

        let admin: BTreeSet<String> = ["ADMIN".to_string()].into_iter().collect();
        assert!(!principal.has_roles(&admin));

        let request = RequestDescriptor::new(Method::Get, "/").with_principal(&principal);
        assert!(request.is_authenticated);
        assert!(request.principal_roles.contains("AUDITOR"));
    }
}
