// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::Arc;

use anyhow::{Context, Result};
use handlebars::Handlebars;
use log::{debug, error};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::response::Redirect;
use rocket::{catch, catchers, routes, Build, Request, Rocket};
use serde::Serialize;

use super::handlers;
use crate::config::{Config, SessionConfig, SsoConfig};
use crate::security::{
    Authorizer, InMemoryCredentialStore, InMemorySessionStore, PwhashVerifier, SessionStore,
    SessionTerminator,
};

/// Shared state of the gateway, managed by Rocket.
///
/// # Fields
///
/// * `authorizer` - Decision engine, reloadable at runtime
/// * `sessions` - Active local sessions
/// * `terminator` - Logout coordinator, backed by `sessions`
/// * `credentials` - Local accounts for the login form
/// * `sso` - Identity provider URLs
/// * `session` - Session cookie settings
/// * `name` - Display name of the application
#[derive(Debug)]
pub struct GatewayState {
    pub authorizer: Authorizer,
    pub sessions: Arc<InMemorySessionStore>,
    pub terminator: SessionTerminator,
    pub credentials: InMemoryCredentialStore,
    pub verifier: PwhashVerifier,
    pub sso: SsoConfig,
    pub session: SessionConfig,
    pub name: String,
    templates: Handlebars<'static>,
}

impl GatewayState {
    /// Compile the policy, load the accounts and register page templates.
    pub fn from_config(config: &Config) -> Result<Self> {
        let authorizer = Authorizer::new(config.build_policy()?);
        let credentials = config
            .access
            .credential_store()
            .context("Invalid access configuration")?;

        let sessions = Arc::new(InMemorySessionStore::new());
        let store: Arc<dyn SessionStore> = sessions.clone();
        let terminator = SessionTerminator::new(store, config.session.clear_cookies.clone());

        let mut templates = Handlebars::new();
        templates
            .register_template_string("index", include_str!("../../resources/templates/index.hbs"))
            .context("Failed to register index template")?;
        templates
            .register_template_string("login", include_str!("../../resources/templates/login.hbs"))
            .context("Failed to register login template")?;
        templates
            .register_template_string("secure", include_str!("../../resources/templates/secure.hbs"))
            .context("Failed to register secure template")?;

        Ok(Self {
            authorizer,
            sessions,
            terminator,
            credentials,
            verifier: PwhashVerifier,
            sso: config.sso.clone(),
            session: config.session.clone(),
            name: config.server.name.clone(),
            templates,
        })
    }

    /// Render one of the page templates.
    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<RawHtml<String>, Status> {
        self.templates
            .render(template, data)
            .map(RawHtml)
            .map_err(|e| {
                error!("Failed to render {} template: {}", template, e);
                Status::InternalServerError
            })
    }
}

/// Build the Rocket instance serving the gateway.
///
/// `figment` carries the Rocket settings (address, port, log level). When
/// the configuration has a `secret_key` it is merged in, so that private
/// session cookies survive a restart.
///
/// # Errors
///
/// Fails when the policy or the user accounts in `config` are invalid.
pub async fn build_rocket(figment: Figment, config: &Config) -> Result<Rocket<Build>> {
    let state = GatewayState::from_config(config)?;
    debug!(
        "Gateway state ready with {} rules and {} accounts",
        state.authorizer.policy().len(),
        state.credentials.len()
    );

    let figment = match &config.server.secret_key {
        Some(secret_key) => figment.merge(("secret_key", secret_key.clone())),
        None => figment,
    };

    let rocket = rocket::custom(figment)
        .mount(
            "/",
            routes![
                handlers::index,
                handlers::login_page,
                handlers::login_submit,
                handlers::logout,
                handlers::logout_post,
                handlers::secure,
                handlers::zk_resource,
                handlers::zkau,
                handlers::zkau_post,
                handlers::zk_web,
            ],
        )
        .register("/", catchers![unauthorized, forbidden])
        .manage(state);
    Ok(rocket)
}

/// Anonymous request to a protected page: send the browser to the login form.
#[catch(401)]
fn unauthorized() -> Redirect {
    Redirect::to("/login")
}

#[catch(403)]
fn forbidden(request: &Request<'_>) -> RawHtml<String> {
    debug!("Forbidden: {}", request.uri());
    RawHtml(
        "<!DOCTYPE html><html><head><title>Forbidden</title></head>\
         <body><h1>403 Forbidden</h1><p>Access to this resource is denied.</p>\
         <p><a href=\"/\">Home</a></p></body></html>"
            .to_string(),
    )
}
