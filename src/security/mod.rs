// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authorization decision core
//!
//! This module contains everything needed to decide requests and to tear
//! sessions down, independent of the HTTP server hosting it:
//!
//! - [`matcher`]: compiled request matchers (glob, regex, MVC route, method
//!   filter, predicate)
//! - [`policy`]: ordered rule tables, first match wins
//! - [`authorizer`]: combines table decisions with the authenticated principal
//! - [`logout`]: session invalidation and identity provider logout redirect
//! - [`credentials`]: local credential lookup and password verification
//!
//! ## Control flow
//!
//! ```text
//! HTTP layer ──► RequestDescriptor ──► Authorizer ──► PolicyTable ──► Matcher
//!                                          │
//!                                          ▼
//!                              Decision { Allow | Deny | RequireAuth(roles) }
//! ```
//!
//! On logout the HTTP layer calls the [`SessionTerminator`] instead.

pub mod authorizer;
pub mod credentials;
pub mod error;
pub mod logout;
pub mod matcher;
pub mod policy;
pub mod request;

pub use authorizer::Authorizer;
pub use credentials::{
    authenticate, decode_password_hash, CredentialStore, InMemoryCredentialStore,
    PasswordVerifier, PwhashVerifier, StoredCredential, DEMO_PASSWORD_HASH,
};
pub use error::{Result, SecurityError};
pub use logout::{
    build_logout_url, validate_absolute_url, InMemorySessionStore, LogoutRequest,
    RedirectInstruction, SessionStore, SessionTerminator, POST_LOGOUT_REDIRECT_PARAM,
};
pub use matcher::{Matcher, MatcherSpec, PathPattern, RequestPredicate};
pub use policy::{
    default_rule_specs, Decision, DecisionKind, PolicyTable, PolicyTableBuilder, Rule, RuleSpec,
    DESKTOP_CLEANUP_PARAM,
};
pub use request::{Method, Principal, RequestDescriptor};
