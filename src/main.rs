// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the SSO gateway
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use rocket::config::LogLevel;
use std::path::PathBuf;

use rust_sso_gate::config::{output_config_schema, Config};
use rust_sso_gate::security::{Authorizer, Method, RequestDescriptor};
use rust_sso_gate::web::build_rocket;

/// Request authorization gateway with single sign-on logout
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output the JSON schema for the configuration file and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Server address (overrides config file)
    #[arg(short, long)]
    address: Option<String>,

    /// Server port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Identity provider end-session endpoint (overrides config file and END_SESSION_ENDPOINT)
    #[arg(long)]
    end_session_endpoint: Option<String>,

    /// Page the identity provider returns to after logout (overrides config file and HOME_PAGE)
    #[arg(long)]
    home_page: Option<String>,

    /// Evaluate a single request target (e.g. "/zkau?dtid=z_0&cmd_0=rmDesktop&opt=i") and exit
    #[arg(long, value_name = "TARGET")]
    evaluate: Option<String>,

    /// HTTP method used with --evaluate
    #[arg(long, default_value = "GET", requires = "evaluate")]
    method: String,

    /// Configured user the --evaluate request is made as
    #[arg(long, requires = "evaluate")]
    user: Option<String>,
}

#[rocket::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.show_config_schema {
        return output_config_schema();
    }

    debug!("Loading configuration from {:?}", args.config);
    let mut config = Config::load_from_file(&args.config)?;
    config.apply_args(
        args.address.clone(),
        args.port,
        args.end_session_endpoint.clone(),
        args.home_page.clone(),
    );
    config.validate()?;

    if let Some(target) = &args.evaluate {
        return evaluate(&config, target, &args.method, args.user.as_deref());
    }

    info!(
        "Starting {} on {}:{}",
        config.server.name, config.server.address, config.server.port
    );
    let figment = rocket::Config::figment()
        .merge(("ident", config.server.name.clone()))
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port))
        .merge(("log_level", LogLevel::Normal));

    let rocket = build_rocket(figment, &config).await?;
    let _rocket = rocket.launch().await?;
    Ok(())
}

/// Print the decision for one request and the rule that produced it.
fn evaluate(config: &Config, target: &str, method: &str, user: Option<&str>) -> Result<()> {
    let method: Method = method.parse()?;
    let policy = config.build_policy()?;

    let principal = match user {
        Some(name) => Some(
            config
                .access
                .users
                .iter()
                .find(|u| u.user == name)
                .map(|u| u.principal())
                .with_context(|| format!("Unknown user: {}", name))?,
        ),
        None => None,
    };

    let mut request = RequestDescriptor::parse(method, target);
    if let Some(principal) = &principal {
        request = request.with_principal(principal);
    }

    let rule = policy
        .matching_rule(&request)
        .map(|rule| rule.name().to_string())
        .unwrap_or_else(|| "<default>".to_string());
    let authorizer = Authorizer::new(policy);
    let decision = authorizer.authorize(&request, principal.as_ref());

    println!("{} {} -> {} (rule: {})", method, target, decision, rule);
    Ok(())
}
