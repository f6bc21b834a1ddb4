// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::collections::HashSet;

use anyhow::{Context, Result};
use base64::Engine;
use log::{debug, warn};

use super::{Config, CONFIG_SCHEMA};
use crate::security::{decode_password_hash, PolicyTable};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// ### Example
///
/// ```bash
/// ./rust_sso_gate --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// ### Validation Rules
///
/// - **SSO**: `end_session_endpoint` and `home_page` are present and absolute http(s) URLs
/// - **Port Range**: the server port is within 1-65534
/// - **IP Address Format**: warns when the bind address is not an IP address
/// - **Secret key**: when present, decodes from base64 to at least 32 bytes
/// - **Session**: the session cookie has a name
/// - **User Credentials**: password hashes are base64-encoded `openssl passwd`
///   crypt strings and user names are unique
/// - **Policy**: the rule list is non-empty and every pattern compiles
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    config.sso.urls().context("Invalid SSO configuration")?;

    if config.server.port < 1 || config.server.port > 65534 {
        anyhow::bail!("Invalid port number: {}", config.server.port);
    }

    if !is_valid_ip_address(&config.server.address) {
        warn!(
            "Potentially invalid address format: {}",
            config.server.address
        );
    }

    if let Some(secret_key) = &config.server.secret_key {
        let key = base64::engine::general_purpose::STANDARD
            .decode(secret_key)
            .context("Server secret key is not valid base64")?;
        if key.len() < 32 {
            anyhow::bail!("Server secret key must be at least 256 bits");
        }
    }

    if config.session.cookie_name.trim().is_empty() {
        anyhow::bail!("Session cookie name must not be empty");
    }
    if !config
        .session
        .clear_cookies
        .contains(&config.session.cookie_name)
    {
        warn!(
            "Session cookie '{}' is not cleared on logout",
            config.session.cookie_name
        );
    }

    let mut seen = HashSet::new();
    for user in &config.access.users {
        if !seen.insert(user.user.as_str()) {
            anyhow::bail!("Duplicate user: {}", user.user);
        }
        decode_password_hash(&user.pass)
            .with_context(|| format!("Invalid password hash for user {}", user.user))?;
    }

    PolicyTable::from_specs(&config.policy).context("Invalid policy")?;

    Ok(())
}
