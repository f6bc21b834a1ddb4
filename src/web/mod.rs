// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket host
//!
//! Every protected route takes an [`guards::Authorized`] guard. The guard
//! describes the incoming request, asks the shared
//! [`Authorizer`](crate::security::Authorizer) for a decision and turns it
//! into an outcome:
//!
//! | Decision                       | Outcome                                 |
//! |--------------------------------|-----------------------------------------|
//! | ALLOW                          | handler runs                            |
//! | DENY                           | 403 Forbidden                           |
//! | REQUIRE_AUTH, no session       | 401, the catcher redirects to `/login`  |
//! | REQUIRE_AUTH, roles missing    | 403 Forbidden                           |
//!
//! Sessions live in a private cookie (see [`session`]) and in the
//! [`InMemorySessionStore`](crate::security::InMemorySessionStore) so that a
//! logout invalidates the cookie server side as well.

pub mod guards;
pub mod handlers;
pub mod server;
pub mod session;

pub use guards::{Authorized, SessionUser};
pub use server::{build_rocket, GatewayState};
