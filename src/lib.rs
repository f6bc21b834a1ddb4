// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rust SSO Gate
//!
//! Request authorization for a web application that delegates login to an
//! external single sign-on provider.
//!
//! - [`security`]: the decision engine. Requests are matched against an
//!   ordered rule table (first match wins) and answered with ALLOW, DENY or
//!   REQUIRE_AUTH. Also coordinates logout with the identity provider.
//! - [`config`]: YAML configuration validated against a JSON schema.
//! - [`web`]: a Rocket host that enforces the decisions through request
//!   guards.

pub mod config;
pub mod security;
pub mod web;
