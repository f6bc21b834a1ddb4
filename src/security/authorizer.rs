// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request authorization
//!
//! The [`Authorizer`] combines the table decision with the (optional)
//! authenticated principal:
//!
//! | Table decision      | No principal        | Principal present                     |
//! |---------------------|---------------------|---------------------------------------|
//! | `Allow`             | `Allow`             | `Allow`                               |
//! | `Deny`              | `Deny`              | `Deny`                                |
//! | `RequireAuth(roles)`| `RequireAuth(roles)`| `Allow` if roles ⊆ principal, else `Deny` |
//!
//! The table itself is shared read-only between all request handlers.
//! [`Authorizer::reload`] swaps in a new table atomically; a request that is
//! already being evaluated keeps using the snapshot it started with.

use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};

use super::policy::{Decision, PolicyTable};
use super::request::{Principal, RequestDescriptor};

/// Evaluates requests against the current [`PolicyTable`].
#[derive(Debug)]
pub struct Authorizer {
    policy: RwLock<Arc<PolicyTable>>,
}

impl Authorizer {
    pub fn new(policy: PolicyTable) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy)),
        }
    }

    /// Snapshot of the table currently in force.
    pub fn policy(&self) -> Arc<PolicyTable> {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the table. Readers see either the old or the new table,
    /// never a mix.
    pub fn reload(&self, policy: PolicyTable) {
        let rules = policy.len();
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(policy);
        info!("Policy reloaded with {} rules", rules);
    }

    /// Decide `request` for an optional authenticated principal.
    ///
    /// Pure function of its inputs and the current table; never fails.
    pub fn authorize(&self, request: &RequestDescriptor, principal: Option<&Principal>) -> Decision {
        let policy = self.policy();
        resolve(policy.evaluate(request), principal)
    }
}

/// Apply the principal to a table decision.
fn resolve(decision: Decision, principal: Option<&Principal>) -> Decision {
    match (decision, principal) {
        (Decision::RequireAuth(roles), Some(principal)) => {
            if principal.has_roles(&roles) {
                Decision::Allow
            } else {
                debug!(
                    "Principal '{}' lacks roles {:?} (has {:?})",
                    principal.username, roles, principal.roles
                );
                Decision::Deny
            }
        }
        (decision, _) => decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{MatcherSpec, Method};

    fn table() -> PolicyTable {
        PolicyTable::builder()
            .allow("public", MatcherSpec::mvc("/"))
            .deny("blocked", MatcherSpec::glob("/blocked/**"))
            .authenticated("admin", MatcherSpec::glob("/admin/**"), ["ADMIN"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_anonymous_keeps_require_auth() {
        let authorizer = Authorizer::new(table());
        let request = RequestDescriptor::new(Method::Get, "/admin/users");
        assert_eq!(
            authorizer.authorize(&request, None),
            Decision::require_roles(["ADMIN"])
        );
        let other = RequestDescriptor::new(Method::Get, "/anything");
        assert_eq!(authorizer.authorize(&other, None), Decision::authenticated());
    }

    #[test]
    fn test_role_containment() {
        let authorizer = Authorizer::new(table());
        let request = RequestDescriptor::new(Method::Get, "/admin/users");

        let admin = Principal::new("root", ["ADMIN", "USER"]);
        assert_eq!(authorizer.authorize(&request, Some(&admin)), Decision::Allow);

        let user = Principal::new("user", ["USER"]);
        assert_eq!(authorizer.authorize(&request, Some(&user)), Decision::Deny);

        let nobody = Principal::new("nobody", Vec::<String>::new());
        let other = RequestDescriptor::new(Method::Get, "/anything");
        assert_eq!(authorizer.authorize(&other, Some(&nobody)), Decision::Allow);
    }

    #[test]
    fn test_allow_and_deny_ignore_principal() {
        let authorizer = Authorizer::new(table());
        let admin = Principal::new("root", ["ADMIN"]);

        let blocked = RequestDescriptor::new(Method::Get, "/blocked/x");
        assert_eq!(authorizer.authorize(&blocked, None), Decision::Deny);
        assert_eq!(authorizer.authorize(&blocked, Some(&admin)), Decision::Deny);

        let root = RequestDescriptor::new(Method::Get, "/");
        assert_eq!(authorizer.authorize(&root, None), Decision::Allow);
        assert_eq!(authorizer.authorize(&root, Some(&admin)), Decision::Allow);
    }

    #[test]
    fn test_reload_swaps_table() {
        let authorizer = Authorizer::new(table());
        let snapshot = authorizer.policy();
        let request = RequestDescriptor::new(Method::Get, "/blocked/x");

        authorizer.reload(
            PolicyTable::builder()
                .allow("open", MatcherSpec::glob("/**"))
                .build()
                .unwrap(),
        );

        assert_eq!(authorizer.authorize(&request, None), Decision::Allow);
        // The old snapshot is untouched.
        assert_eq!(snapshot.evaluate(&request), Decision::Deny);
        assert_eq!(authorizer.policy().len(), 1);
    }

    #[test]
    fn test_concurrent_evaluation_during_reload() {
        let authorizer = Arc::new(Authorizer::new(table()));
        let request = RequestDescriptor::new(Method::Get, "/blocked/x");

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let authorizer = Arc::clone(&authorizer);
                let request = request.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let decision = authorizer.authorize(&request, None);
                        assert!(decision == Decision::Deny || decision == Decision::Allow);
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            authorizer.reload(table());
            authorizer.reload(
                PolicyTable::builder()
                    .allow("open", MatcherSpec::glob("/**"))
                    .build()
                    .unwrap(),
            );
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
