// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Ordered policy tables
//!
//! A [`PolicyTable`] is an ordered list of [`Rule`]s. Evaluation is a linear
//! scan in insertion order: the first rule whose matcher accepts the request
//! decides. When nothing matches the table answers
//! `Decision::RequireAuth` with an empty role set.
//!
//! Order is the only precedence mechanism. A narrow DENY must therefore be
//! listed before any broader ALLOW that would also match; the builder warns
//! about the obvious violations of that rule but never reorders.
//!
//! ```
//! use rust_sso_gate::security::{Decision, MatcherSpec, Method, PolicyTable, RequestDescriptor};
//!
//! let table = PolicyTable::builder()
//!     .deny("admin-secure", MatcherSpec::glob("/admin/**/secure/**"))
//!     .allow("admin", MatcherSpec::glob("/admin/**").with_method(Method::Get))
//!     .build()
//!     .unwrap();
//!
//! let request = RequestDescriptor::new(Method::Get, "/admin/secure/x");
//! assert_eq!(table.evaluate(&request), Decision::Deny);
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::error::{Result, SecurityError};
use super::matcher::{Matcher, MatcherSpec};
use super::request::{Method, RequestDescriptor};

/// Outcome of evaluating a request against the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    Allow,
    Deny,
    /// Authentication is required, and the principal must hold every listed
    /// role. An empty set only requires authentication.
    RequireAuth(BTreeSet<String>),
}

impl Decision {
    /// `RequireAuth` without role requirements; the table default.
    pub fn authenticated() -> Self {
        Decision::RequireAuth(BTreeSet::new())
    }

    pub fn require_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Decision::RequireAuth(roles.into_iter().map(Into::into).collect())
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("ALLOW"),
            Decision::Deny => f.write_str("DENY"),
            Decision::RequireAuth(roles) if roles.is_empty() => f.write_str("REQUIRE_AUTH"),
            Decision::RequireAuth(roles) => write!(
                f,
                "REQUIRE_AUTH({})",
                roles.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

/// Decision keyword used in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Allow,
    Deny,
    Authenticated,
}

/// Declarative rule, as read from the `policy` section of the configuration.
///
/// ```yaml
/// - name: secure-area
///   match: { type: mvc, pattern: /secure }
///   decision: authenticated
///   roles: [USER]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(rename = "match")]
    pub matcher: MatcherSpec,
    pub decision: DecisionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, matcher: MatcherSpec, decision: DecisionKind) -> Self {
        Self {
            name: name.into(),
            matcher,
            decision,
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Compile the matcher and resolve the decision.
    pub fn compile(&self) -> Result<Rule> {
        let decision = match (self.decision, self.roles.is_empty()) {
            (DecisionKind::Allow, true) => Decision::Allow,
            (DecisionKind::Deny, true) => Decision::Deny,
            (DecisionKind::Authenticated, _) => Decision::require_roles(self.roles.iter().cloned()),
            (_, false) => {
                return Err(SecurityError::configuration(format!(
                    "Rule '{}': roles are only valid with the 'authenticated' decision",
                    self.name
                )))
            }
        };
        let matcher = self.matcher.compile().map_err(|e| with_rule_name(&self.name, e))?;
        Ok(Rule::new(self.name.clone(), matcher, decision))
    }
}

fn with_rule_name(name: &str, error: SecurityError) -> SecurityError {
    match error {
        SecurityError::Configuration(message) => {
            SecurityError::Configuration(format!("Rule '{}': {}", name, message))
        }
        other => other,
    }
}

/// A compiled rule. Immutable once built.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    matcher: Matcher,
    decision: Decision,
}

impl Rule {
    pub fn new(name: impl Into<String>, matcher: Matcher, decision: Decision) -> Self {
        Self {
            name: name.into(),
            matcher,
            decision,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    pub fn matches(&self, request: &RequestDescriptor) -> bool {
        self.matcher.matches(request)
    }
}

/// Ordered, immutable rule set. First match wins.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: Vec<Rule>,
}

impl PolicyTable {
    /// Build a table from compiled rules.
    ///
    /// # Errors
    ///
    /// [`SecurityError::Configuration`] when `rules` is empty.
    pub fn build(rules: Vec<Rule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(SecurityError::configuration(
                "Policy table needs at least one rule",
            ));
        }
        report_duplicate_names(&rules);
        report_shadowed_denials(&rules);
        Ok(Self { rules })
    }

    /// Compile and build from declarative rule specs, keeping their order.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .map(RuleSpec::compile)
            .collect::<Result<Vec<_>>>()?;
        Self::build(rules)
    }

    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    /// First rule matching `request`, if any.
    pub fn matching_rule(&self, request: &RequestDescriptor) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(request))
    }

    /// Decide `request`. Falls through to `RequireAuth({})` when no rule
    /// matches.
    pub fn evaluate(&self, request: &RequestDescriptor) -> Decision {
        match self.matching_rule(request) {
            Some(rule) => {
                debug!(
                    "{} {} matched rule '{}': {}",
                    request.method,
                    request.path,
                    rule.name(),
                    rule.decision()
                );
                rule.decision().clone()
            }
            None => {
                debug!(
                    "{} {} matched no rule, authentication required",
                    request.method, request.path
                );
                Decision::authenticated()
            }
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn report_duplicate_names(rules: &[Rule]) {
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.name()) {
            warn!("Policy contains more than one rule named '{}'", rule.name());
        }
    }
}

/// Warn about DENY globs that an earlier ALLOW glob of the form
/// `/literal/prefix/**` already covers.
fn report_shadowed_denials(rules: &[Rule]) {
    for (index, rule) in rules.iter().enumerate() {
        if *rule.decision() != Decision::Deny {
            continue;
        }
        let Some((deny_method, deny_pattern)) = rule.matcher().as_glob() else {
            continue;
        };
        for earlier in rules[..index]
            .iter()
            .filter(|earlier| earlier.decision().is_allow())
        {
            let Some((allow_method, allow_pattern)) = earlier.matcher().as_glob() else {
                continue;
            };
            if methods_overlap(allow_method, deny_method) && allow_pattern.covers(deny_pattern) {
                warn!(
                    "DENY rule '{}' ({}) is shadowed by earlier ALLOW rule '{}' ({})",
                    rule.name(),
                    deny_pattern.as_str(),
                    earlier.name(),
                    allow_pattern.as_str()
                );
            }
        }
    }
}

fn methods_overlap(a: Option<Method>, b: Option<Method>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Fluent assembly of a [`PolicyTable`].
///
/// Pattern errors are collected and reported by [`build`](Self::build), so a
/// chain of calls never panics halfway.
#[derive(Debug, Default)]
pub struct PolicyTableBuilder {
    rules: Vec<Result<Rule>>,
}

impl PolicyTableBuilder {
    /// Append a rule compiled from `spec`.
    pub fn rule(mut self, name: &str, spec: MatcherSpec, decision: Decision) -> Self {
        let rule = spec
            .compile()
            .map(|matcher| Rule::new(name, matcher, decision))
            .map_err(|e| with_rule_name(name, e));
        self.rules.push(rule);
        self
    }

    pub fn allow(self, name: &str, spec: MatcherSpec) -> Self {
        self.rule(name, spec, Decision::Allow)
    }

    pub fn deny(self, name: &str, spec: MatcherSpec) -> Self {
        self.rule(name, spec, Decision::Deny)
    }

    pub fn authenticated<I, S>(self, name: &str, spec: MatcherSpec, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule(name, spec, Decision::require_roles(roles))
    }

    /// Append an ALLOW rule guarded by an arbitrary predicate.
    pub fn allow_when<F>(mut self, name: &str, test: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        self.rules
            .push(Ok(Rule::new(name, Matcher::predicate(name, test), Decision::Allow)));
        self
    }

    /// Append an already compiled matcher.
    pub fn matcher(mut self, name: &str, matcher: Matcher, decision: Decision) -> Self {
        self.rules.push(Ok(Rule::new(name, matcher, decision)));
        self
    }

    /// Append declarative specs in order.
    pub fn specs(mut self, specs: &[RuleSpec]) -> Self {
        self.rules.extend(specs.iter().map(RuleSpec::compile));
        self
    }

    pub fn build(self) -> Result<PolicyTable> {
        let rules = self.rules.into_iter().collect::<Result<Vec<_>>>()?;
        PolicyTable::build(rules)
    }
}

/// Query parameter and value the ZK client sends to release a desktop.
pub const DESKTOP_CLEANUP_PARAM: (&str, &str) = ("cmd_0", "rmDesktop");

/// Rule set of the ZK demo application.
///
/// 1. Deny direct access to `.zul` pages under the class-path web folder and
///    to secure resources.
/// 2. Allow GET on ZK resources.
/// 3. Allow desktop cleanup on `/zkau`, both as the browser sends it (regex
///    on the raw query) and as the ZATS test client sends it (parameter
///    check on the same route).
/// 4. Allow the landing, login and logout pages.
/// 5. Require role `USER` on `/secure`.
///
/// Anything else falls through to "authenticated".
pub fn default_rule_specs() -> Vec<RuleSpec> {
    let (cleanup_param, cleanup_value) = DESKTOP_CLEANUP_PARAM;
    vec![
        RuleSpec::new(
            "zul-files",
            MatcherSpec::glob("/zkau/web/**/*.zul"),
            DecisionKind::Deny,
        ),
        RuleSpec::new(
            "zk-secure-resources",
            MatcherSpec::glob("/zkres/**/secure/**"),
            DecisionKind::Deny,
        ),
        RuleSpec::new(
            "zk-resources",
            MatcherSpec::glob("/zkres/**").with_method(Method::Get),
            DecisionKind::Allow,
        ),
        RuleSpec::new(
            "desktop-cleanup",
            MatcherSpec::regex(r"/zkau\?dtid=.*&cmd_0=rmDesktop&.*").with_method(Method::Get),
            DecisionKind::Allow,
        ),
        RuleSpec::new(
            "desktop-cleanup-zats",
            MatcherSpec::query_param(cleanup_param, cleanup_value).on_route("/zkau"),
            DecisionKind::Allow,
        ),
        RuleSpec::new("public-root", MatcherSpec::mvc("/"), DecisionKind::Allow),
        RuleSpec::new("public-login", MatcherSpec::mvc("/login"), DecisionKind::Allow),
        RuleSpec::new("public-logout", MatcherSpec::mvc("/logout"), DecisionKind::Allow),
        RuleSpec::new(
            "secure-area",
            MatcherSpec::mvc("/secure"),
            DecisionKind::Authenticated,
        )
        .with_roles(["USER"]),
    ]
}
