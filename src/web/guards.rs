// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request guards enforcing authorization decisions

use log::debug;
use rocket::http::{RawStr, Status};
use rocket::request::{self, FromRequest, Request};
use rocket::State;

use super::server::GatewayState;
use super::session::SessionCookie;
use crate::security::{Decision, Method, Principal, RequestDescriptor};

/// Authenticated session found in the private session cookie.
///
/// The cookie alone is not enough: its session id must still be active in
/// the session store, so a logged out cookie replayed later is rejected.
/// Forwards with [`Status::Unauthorized`] when there is no valid session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub session_id: String,
    pub principal: Principal,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let state = match request.guard::<&State<GatewayState>>().await {
            request::Outcome::Success(state) => state,
            _ => return request::Outcome::Error((Status::InternalServerError, ())),
        };

        let Some(cookie) = request.cookies().get_private(&state.session.cookie_name) else {
            return request::Outcome::Forward(Status::Unauthorized);
        };

        let Some(session) = SessionCookie::decode(cookie.value()) else {
            debug!("Malformed session cookie");
            return request::Outcome::Forward(Status::Unauthorized);
        };

        match state.sessions.get(&session.session_id) {
            Some(principal) => request::Outcome::Success(SessionUser {
                session_id: session.session_id,
                principal,
            }),
            None => {
                debug!("Session of '{}' is no longer active", session.username);
                request::Outcome::Forward(Status::Unauthorized)
            }
        }
    }
}

/// Why [`Authorized`] refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The policy denies the request (or the principal lacks a role).
    Denied,
    /// The policy requires an authenticated session.
    AuthenticationRequired,
    /// The request method is not one the policy engine knows.
    UnsupportedMethod(String),
    /// [`GatewayState`] is not managed by the Rocket instance.
    MissingState,
}

/// Guard passed only by requests the [`Authorizer`](crate::security::Authorizer)
/// allows.
///
/// ```no_run
/// use rocket::get;
/// use rust_sso_gate::web::Authorized;
///
/// #[get("/reports")]
/// fn reports(auth: Authorized) -> String {
///     match auth.principal {
///         Some(principal) => format!("Reports for {}", principal.username),
///         None => "Public reports".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    /// Principal of the session, if the request carried one.
    pub principal: Option<Principal>,
}

/// Describe a Rocket request for the policy engine.
///
/// The path is percent-decoded so that an encoded dot or slash cannot slip
/// past a glob. The query string is kept raw.
pub fn describe_request(
    request: &Request<'_>,
    principal: Option<&Principal>,
) -> Result<RequestDescriptor, AuthorizationError> {
    let method: Method = request
        .method()
        .as_str()
        .parse()
        .map_err(|_| AuthorizationError::UnsupportedMethod(request.method().as_str().to_string()))?;

    let path = RawStr::new(request.uri().path().as_str()).percent_decode_lossy();
    let mut descriptor = RequestDescriptor::new(method, path.into_owned());
    if let Some(query) = request.uri().query() {
        descriptor = descriptor.with_query(query.as_str());
    }
    if let Some(principal) = principal {
        descriptor = descriptor.with_principal(principal);
    }
    Ok(descriptor)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Authorized {
    type Error = AuthorizationError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let state = match request.guard::<&State<GatewayState>>().await {
            request::Outcome::Success(state) => state,
            _ => {
                return request::Outcome::Error((
                    Status::InternalServerError,
                    AuthorizationError::MissingState,
                ))
            }
        };

        let principal = request
            .guard::<Option<SessionUser>>()
            .await
            .succeeded()
            .flatten()
            .map(|user| user.principal);

        let descriptor = match describe_request(request, principal.as_ref()) {
            Ok(descriptor) => descriptor,
            Err(e) => return request::Outcome::Error((Status::MethodNotAllowed, e)),
        };

        match state.authorizer.authorize(&descriptor, principal.as_ref()) {
            Decision::Allow => request::Outcome::Success(Authorized { principal }),
            Decision::Deny => {
                debug!("{} {} denied", descriptor.method, descriptor.path);
                request::Outcome::Error((Status::Forbidden, AuthorizationError::Denied))
            }
            Decision::RequireAuth(_) => {
                debug!("{} {} requires authentication", descriptor.method, descriptor.path);
                request::Outcome::Error((
                    Status::Unauthorized,
                    AuthorizationError::AuthenticationRequired,
                ))
            }
        }
    }
}
