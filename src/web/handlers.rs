// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Route handlers
//!
//! Every handler takes an [`Authorized`] guard, so no route can be reached
//! without a policy decision. Handlers only render pages; the access rules
//! all live in the policy table.

use std::path::PathBuf;

use log::{debug, error, info, warn};
use rocket::form::{Form, FromForm};
use rocket::http::{ContentType, Cookie, CookieJar, Status};
use rocket::response::content::RawHtml;
use rocket::response::status::Custom;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::Serialize;
use serde_json::json;

use super::guards::{Authorized, SessionUser};
use super::server::GatewayState;
use super::session::SessionCookie;
use crate::security::{
    authenticate, build_logout_url, LogoutRequest, SecurityError, DESKTOP_CLEANUP_PARAM,
};

/// Login form fields.
#[derive(FromForm)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[get("/")]
pub fn index(auth: Authorized, state: &State<GatewayState>) -> Result<RawHtml<String>, Status> {
    state.render(
        "index",
        &json!({
            "name": state.name,
            "username": auth.principal.map(|p| p.username),
        }),
    )
}

#[get("/login")]
pub fn login_page(_auth: Authorized, state: &State<GatewayState>) -> Result<RawHtml<String>, Status> {
    state.render("login", &json!({ "error_msg": null, "username": "" }))
}

/// Authenticate against the local accounts and open a session.
#[post("/login", data = "<form>")]
pub async fn login_submit(
    _auth: Authorized,
    form: Form<LoginForm>,
    state: &State<GatewayState>,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, Custom<RawHtml<String>>> {
    let failure = |status: Status, message: &str| {
        let page = state
            .render(
                "login",
                &json!({ "error_msg": message, "username": form.username }),
            )
            .unwrap_or_else(|_| RawHtml(message.to_string()));
        Custom(status, page)
    };

    match authenticate(&state.credentials, &state.verifier, &form.username, &form.password).await {
        Ok(principal) => {
            let session_id = state.sessions.create(principal.clone());
            cookies.add_private(SessionCookie::new(session_id, &principal).to_cookie(&state.session));
            info!("User '{}' signed in", principal.username);
            Ok(Redirect::to("/secure"))
        }
        Err(e) if e.is_authentication_failure() => {
            warn!("Failed sign in: {}", e);
            Err(failure(Status::Unauthorized, "Invalid username or password"))
        }
        Err(e) => {
            error!("Sign in unavailable: {}", e);
            Err(failure(Status::ServiceUnavailable, "Sign in is temporarily unavailable"))
        }
    }
}

/// Expire every session cookie, private or not.
fn clear_session_cookies(state: &GatewayState, cookies: &CookieJar<'_>) {
    for name in state.terminator.session_cookies() {
        let mut cookie = Cookie::new(name.clone(), "");
        cookie.set_path("/");
        if *name == state.session.cookie_name {
            cookies.remove_private(cookie);
        } else {
            cookies.remove(cookie);
        }
    }
}

async fn end_session(
    user: Option<SessionUser>,
    state: &GatewayState,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, Status> {
    // Cookies go away whatever happens next.
    clear_session_cookies(state, cookies);

    let (endpoint, home_page) = state.sso.urls().map_err(|e| {
        error!("Cannot log out: {}", e);
        Status::InternalServerError
    })?;

    let location = match user {
        Some(user) => {
            info!("User '{}' signing out", user.principal.username);
            state
                .terminator
                .logout(LogoutRequest::new(user.session_id), endpoint, home_page)
                .await
                .map(|instruction| instruction.location)
        }
        None => {
            debug!("Sign out without an active session");
            build_logout_url(endpoint, home_page)
        }
    };

    match location {
        Ok(location) => Ok(Redirect::to(location)),
        Err(SecurityError::ExternalService(_)) => Err(Status::BadGateway),
        Err(_) => Err(Status::InternalServerError),
    }
}

/// End the local session and hand over to the identity provider logout.
#[get("/logout")]
pub async fn logout(
    _auth: Authorized,
    user: Option<SessionUser>,
    state: &State<GatewayState>,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, Status> {
    end_session(user, state, cookies).await
}

#[post("/logout")]
pub async fn logout_post(
    _auth: Authorized,
    user: Option<SessionUser>,
    state: &State<GatewayState>,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, Status> {
    end_session(user, state, cookies).await
}

#[get("/secure/<path..>")]
pub fn secure(
    auth: Authorized,
    path: PathBuf,
    state: &State<GatewayState>,
) -> Result<RawHtml<String>, Status> {
    // Never rendered without an account, whatever the policy allows.
    let Some(principal) = auth.principal else {
        warn!("Anonymous request reached the secure area, asking for sign in");
        return Err(Status::Unauthorized);
    };
    let username = principal.username;
    let roles: Vec<String> = principal.roles.into_iter().collect();
    let path = path.to_string_lossy().into_owned();
    state.render(
        "secure",
        &json!({ "username": username, "roles": roles, "path": path }),
    )
}

#[get("/zkres/<path..>")]
pub fn zk_resource(_auth: Authorized, path: PathBuf) -> (ContentType, String) {
    (
        ContentType::Plain,
        format!("resource: {}\n", path.display()),
    )
}

/// Answer of the desktop update endpoint.
#[derive(Debug, Serialize)]
pub struct DesktopUpdate {
    pub dtid: Option<String>,
    pub command: Option<String>,
    pub desktop_removed: bool,
}

fn desktop_update(dtid: Option<String>, command: Option<String>) -> Json<DesktopUpdate> {
    let desktop_removed = command.as_deref() == Some(DESKTOP_CLEANUP_PARAM.1);
    if desktop_removed {
        debug!("Desktop {:?} released", dtid);
    }
    Json(DesktopUpdate {
        dtid,
        command,
        desktop_removed,
    })
}

#[get("/zkau?<dtid>&<cmd_0>")]
pub fn zkau(_auth: Authorized, dtid: Option<String>, cmd_0: Option<String>) -> Json<DesktopUpdate> {
    desktop_update(dtid, cmd_0)
}

#[post("/zkau?<dtid>&<cmd_0>")]
pub fn zkau_post(
    _auth: Authorized,
    dtid: Option<String>,
    cmd_0: Option<String>,
) -> Json<DesktopUpdate> {
    desktop_update(dtid, cmd_0)
}

#[get("/zkau/web/<path..>")]
pub fn zk_web(_auth: Authorized, path: PathBuf) -> (ContentType, String) {
    (
        ContentType::Plain,
        format!("web resource: {}\n", path.display()),
    )
}
