// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request matchers
//!
//! A [`Matcher`] is the compiled form of a rule's selection criteria. Rules
//! are usually described with a [`MatcherSpec`] (which is what the YAML
//! configuration deserializes into) and compiled once when the
//! [`PolicyTable`](super::PolicyTable) is built, so evaluation never parses
//! patterns.
//!
//! ## Variants
//!
//! | Variant        | Matches against              | Pattern syntax                      |
//! |----------------|------------------------------|-------------------------------------|
//! | `PathGlob`     | path                         | Ant-style `*`, `?`, `**`            |
//! | `PathRegex`    | path, plus `?query` if any   | anchored regular expression         |
//! | `MvcPath`      | path without matrix params   | glob plus `{name}` variables        |
//! | `MethodFilter` | method, then inner matcher   | -                                   |
//! | `Predicate`    | whole descriptor             | arbitrary function                  |

use std::fmt;
use std::sync::Arc;

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{Result, SecurityError};
use super::request::{Method, RequestDescriptor};

/// One compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Exact, case-sensitive comparison.
    Literal(String),
    /// Segment containing `*` or `?` wildcards.
    Wildcard(Pattern),
    /// `{name}`: exactly one non-empty segment.
    Variable(String),
    /// `**`: zero or more whole segments.
    MultiSegment,
}

impl Segment {
    /// Compile a segment holding `*` or `?`. Brackets stay literal, as Ant
    /// patterns have no character classes.
    fn wildcard(raw: &str, pattern: &str) -> Result<Self> {
        let escaped: String = raw
            .chars()
            .map(|c| match c {
                '[' => "[[]".to_string(),
                ']' => "[]]".to_string(),
                other => other.to_string(),
            })
            .collect();
        Pattern::new(&escaped).map(Segment::Wildcard).map_err(|e| {
            SecurityError::configuration(format!(
                "Invalid wildcard segment '{}' in pattern '{}': {}",
                raw, pattern, e
            ))
        })
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == segment,
            Segment::Wildcard(wildcard) => wildcard.matches(segment),
            Segment::Variable(_) => !segment.is_empty(),
            Segment::MultiSegment => true,
        }
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::MultiSegment, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((segment, rest)) => match path.split_first() {
            Some((head, tail)) => segment.matches(head) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// A compiled Ant-style or MVC path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile an Ant-style glob such as `/zkau/web/**/*.zul`.
    pub fn glob(pattern: &str) -> Result<Self> {
        Self::compile(pattern, false)
    }

    /// Compile an MVC route pattern such as `/users/{id}`.
    pub fn mvc(pattern: &str) -> Result<Self> {
        Self::compile(pattern, true)
    }

    fn compile(pattern: &str, allow_variables: bool) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(SecurityError::configuration(format!(
                "Path pattern '{}' must start with '/'",
                pattern
            )));
        }

        let mut segments = Vec::new();
        for raw in pattern.split('/').filter(|s| !s.is_empty()) {
            let segment = if raw == "**" {
                Segment::MultiSegment
            } else if raw.contains("**") {
                return Err(SecurityError::configuration(format!(
                    "'**' must occupy a whole segment in pattern '{}'",
                    pattern
                )));
            } else if raw.contains('{') || raw.contains('}') {
                let name = raw
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .filter(|name| {
                        !name.is_empty() && !name.contains('{') && !name.contains('}')
                    });
                match (allow_variables, name) {
                    (true, Some(name)) => Segment::Variable(name.to_string()),
                    _ => {
                        return Err(SecurityError::configuration(format!(
                            "Invalid path variable segment '{}' in pattern '{}'",
                            raw, pattern
                        )))
                    }
                }
            } else if raw.contains('*') || raw.contains('?') {
                Segment::wildcard(raw, pattern)?
            } else {
                Segment::Literal(raw.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a raw request path.
    pub fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &segments)
    }

    /// Match a path after MVC normalization: matrix parameters
    /// (`;name=value`) are stripped from every segment and trailing slashes
    /// are ignored.
    pub fn matches_route(&self, path: &str) -> bool {
        let segments: Vec<&str> = path
            .split('/')
            .map(|segment| segment.split(';').next().unwrap_or_default())
            .filter(|s| !s.is_empty())
            .collect();
        match_segments(&self.segments, &segments)
    }

    /// `true` when this pattern is a run of literals closed by `**` and
    /// `other` starts with the same literals, i.e. every path `other`
    /// matches is also matched by `self`.
    pub(crate) fn covers(&self, other: &PathPattern) -> bool {
        let Some((Segment::MultiSegment, prefix)) = self.segments.split_last() else {
            return false;
        };
        prefix.iter().all(|s| matches!(s, Segment::Literal(_)))
            && other.segments.len() >= prefix.len()
            && other.segments[..prefix.len()] == *prefix
    }
}

/// A named boolean function over a request.
///
/// Used for ad-hoc conditions that are not about the path, such as
/// "query parameter `cmd_0` equals `rmDesktop`".
#[derive(Clone)]
pub struct RequestPredicate {
    name: String,
    test: Arc<dyn Fn(&RequestDescriptor) -> bool + Send + Sync>,
}

impl RequestPredicate {
    pub fn new<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    /// Predicate that holds when query parameter `param` equals `value`.
    pub fn query_param_equals(param: impl Into<String>, value: impl Into<String>) -> Self {
        let param = param.into();
        let value = value.into();
        Self::new(format!("{}={}", param, value), move |request| {
            request.query_param(&param) == Some(value.as_str())
        })
    }

    /// [`query_param_equals`](Self::query_param_equals) limited to requests
    /// whose path matches `route` (MVC rules).
    pub fn query_param_on_route(
        route: PathPattern,
        param: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let param = param.into();
        let value = value.into();
        Self::new(
            format!("{}?{}={}", route.as_str(), param, value),
            move |request| {
                route.matches_route(&request.path)
                    && request.query_param(&param) == Some(value.as_str())
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn test(&self, request: &RequestDescriptor) -> bool {
        (self.test)(request)
    }
}

impl fmt::Debug for RequestPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestPredicate").field(&self.name).finish()
    }
}

/// Compiled request matcher.
#[derive(Debug, Clone)]
pub enum Matcher {
    PathGlob(PathPattern),
    PathRegex(Regex),
    MethodFilter(Method, Box<Matcher>),
    Predicate(RequestPredicate),
    MvcPath(PathPattern),
}

impl Matcher {
    pub fn path_glob(pattern: &str) -> Result<Self> {
        PathPattern::glob(pattern).map(Matcher::PathGlob)
    }

    /// Compile a regular expression that must match the whole of
    /// `path?query`.
    pub fn path_regex(pattern: &str) -> Result<Self> {
        Regex::new(&format!("^(?:{})$", pattern))
            .map(Matcher::PathRegex)
            .map_err(|e| {
                SecurityError::configuration(format!("Invalid regex '{}': {}", pattern, e))
            })
    }

    pub fn mvc_path(pattern: &str) -> Result<Self> {
        PathPattern::mvc(pattern).map(Matcher::MvcPath)
    }

    pub fn predicate<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(RequestPredicate::new(name, test))
    }

    /// Restrict this matcher to a single HTTP method.
    pub fn with_method(self, method: Method) -> Self {
        Matcher::MethodFilter(method, Box::new(self))
    }

    /// Evaluate the matcher against a request.
    pub fn matches(&self, request: &RequestDescriptor) -> bool {
        match self {
            Matcher::PathGlob(pattern) => pattern.matches(&request.path),
            Matcher::PathRegex(regex) => regex.is_match(&request.path_and_query()),
            Matcher::MethodFilter(method, inner) => {
                request.method == *method && inner.matches(request)
            }
            Matcher::Predicate(predicate) => predicate.test(request),
            Matcher::MvcPath(pattern) => pattern.matches_route(&request.path),
        }
    }

    /// The glob pattern and method restriction, when this is a (possibly
    /// method-filtered) `PathGlob`.
    pub(crate) fn as_glob(&self) -> Option<(Option<Method>, &PathPattern)> {
        match self {
            Matcher::PathGlob(pattern) => Some((None, pattern)),
            Matcher::MethodFilter(method, inner) => match inner.as_ref() {
                Matcher::PathGlob(pattern) => Some((Some(*method), pattern)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Declarative description of a matcher, as found in the configuration file.
///
/// ```yaml
/// match:
///   type: glob
///   pattern: /zkres/**
///   method: GET
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatcherSpec {
    Glob {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<Method>,
    },
    Regex {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<Method>,
    },
    Mvc {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<Method>,
    },
    /// Query parameter `name` equals `value`, optionally only on the MVC
    /// route `path`.
    QueryParam {
        name: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<Method>,
    },
}

impl MatcherSpec {
    pub fn glob(pattern: impl Into<String>) -> Self {
        MatcherSpec::Glob {
            pattern: pattern.into(),
            method: None,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        MatcherSpec::Regex {
            pattern: pattern.into(),
            method: None,
        }
    }

    pub fn mvc(pattern: impl Into<String>) -> Self {
        MatcherSpec::Mvc {
            pattern: pattern.into(),
            method: None,
        }
    }

    pub fn query_param(name: impl Into<String>, value: impl Into<String>) -> Self {
        MatcherSpec::QueryParam {
            name: name.into(),
            value: value.into(),
            path: None,
            method: None,
        }
    }

    /// Limit a query parameter matcher to one MVC route. Other matchers are
    /// returned unchanged.
    pub fn on_route(mut self, route: impl Into<String>) -> Self {
        if let MatcherSpec::QueryParam { path, .. } = &mut self {
            *path = Some(route.into());
        }
        self
    }

    /// Same matcher restricted to `method`.
    pub fn with_method(mut self, restrict: Method) -> Self {
        match &mut self {
            MatcherSpec::Glob { method, .. }
            | MatcherSpec::Regex { method, .. }
            | MatcherSpec::Mvc { method, .. }
            | MatcherSpec::QueryParam { method, .. } => *method = Some(restrict),
        }
        self
    }

    /// Compile into a [`Matcher`], failing on malformed patterns.
    pub fn compile(&self) -> Result<Matcher> {
        let (matcher, method) = match self {
            MatcherSpec::Glob { pattern, method } => (Matcher::path_glob(pattern)?, method),
            MatcherSpec::Regex { pattern, method } => (Matcher::path_regex(pattern)?, method),
            MatcherSpec::Mvc { pattern, method } => (Matcher::mvc_path(pattern)?, method),
            MatcherSpec::QueryParam {
                name,
                value,
                path,
                method,
            } => {
                if name.is_empty() {
                    return Err(SecurityError::configuration(
                        "Query parameter matcher needs a parameter name",
                    ));
                }
                let predicate = match path {
                    Some(route) => {
                        RequestPredicate::query_param_on_route(PathPattern::mvc(route)?, name, value)
                    }
                    None => RequestPredicate::query_param_equals(name, value),
                };
                (Matcher::Predicate(predicate), method)
            }
        };
        Ok(match method {
            Some(method) => matcher.with_method(*method),
            None => matcher,
        })
    }
}
