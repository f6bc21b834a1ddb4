// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema before it is deserialized, then checked
//! against the rules in [`utils::validate_specific_rules`].
//!
//! ## Configuration Structure
//!
//! - `server`: Settings for the Rocket host server
//! - `sso`: Identity provider end-session endpoint and application home page
//! - `session`: Session cookie settings
//! - `access`: Local user accounts
//! - `policy`: Ordered authorization rules, first match wins
//!
//! ## Fail-closed loading
//!
//! A configuration that is missing the SSO URLs, carries a malformed pattern
//! or an empty rule list is rejected. The server never starts with an
//! incomplete policy.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_sso_gate::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("0.0.0.0".to_string()),                    // Server address
//!     Some(8081),                                     // Server port
//!     Some("https://idp.example/logout".to_string()), // End-session endpoint
//!     None,                                           // Home page
//! );
//!
//! println!("Server port: {}", config.server.port);
//! ```

pub mod access;
pub mod server;
pub mod sso;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::security::{default_rule_specs, PolicyTable, RuleSpec};

// Re-export all types for public API
pub use access::{AccessConfig, User};
pub use server::ServerConfig;
pub use sso::{SessionConfig, SsoConfig};
pub use utils::{is_valid_ip_address, output_config_schema, validate_specific_rules};

/// JSON schema the YAML file is validated against.
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

fn default_policy() -> Vec<RuleSpec> {
    default_rule_specs()
}

/// Root configuration structure.
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, except the SSO URLs which must be provided (in the
/// file, through the environment or on the command line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sso: SsoConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub access: AccessConfig,

    /// Ordered authorization rules. Defaults to the ZK demo rule set.
    #[serde(default = "default_policy")]
    pub policy: Vec<RuleSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sso: SsoConfig::default(),
            session: SessionConfig::default(),
            access: AccessConfig::default(),
            policy: default_policy(),
        }
    }
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Parse and schema-validate YAML text without touching the filesystem.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let yaml_value: serde_yml::Value =
            serde_yml::from_str(contents).context("Failed to parse YAML configuration")?;

        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        if let Err(error) = validator.validate(&json_value) {
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        serde_yml::from_str(contents).context("Failed to deserialize configuration")
    }

    /// Load and validate configuration from a file.
    ///
    /// A missing file is created with the default configuration. Environment
    /// overrides (`END_SESSION_ENDPOINT`, `HOME_PAGE`) are applied before the
    /// final validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_file`](Self::from_file) but without the final
    /// [`validate`](Self::validate), so that command line overrides can be
    /// applied first.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            default_config
        } else {
            debug!("Loading configuration from {:?}", path);
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

            match Self::from_yaml_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    error!("Configuration error in {}: {:#}", path.display(), err);
                    if let Err(e) = Self::create_sample_config(path) {
                        error!("Failed to create sample config: {}", e);
                    }
                    return Err(err.context(format!(
                        "Invalid configuration file {}",
                        path.display()
                    )));
                }
            }
        };

        config.sso.apply_env();
        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the configuration.
    /// Call [`validate`](Self::validate) afterwards.
    ///
    /// # Parameters
    ///
    /// * `address` - Network address for the server to bind to
    /// * `port` - TCP port for the server
    /// * `end_session_endpoint` - Identity provider end-session endpoint
    /// * `home_page` - Post-logout landing page
    pub fn apply_args(
        &mut self,
        address: Option<String>,
        port: Option<u16>,
        end_session_endpoint: Option<String>,
        home_page: Option<String>,
    ) {
        if let Some(address) = address {
            debug!("Overriding address from command line: {}", address);
            self.server.address = address;
        }
        if let Some(port) = port {
            debug!("Overriding port from command line: {}", port);
            self.server.port = port;
        }
        if let Some(endpoint) = end_session_endpoint {
            debug!("Overriding end-session endpoint from command line: {}", endpoint);
            self.sso.end_session_endpoint = Some(endpoint);
        }
        if let Some(home_page) = home_page {
            debug!("Overriding home page from command line: {}", home_page);
            self.sso.home_page = Some(home_page);
        }
    }

    /// Run the checks the schema cannot express.
    pub fn validate(&self) -> Result<()> {
        validate_specific_rules(self)
    }

    /// Compile the `policy` section.
    pub fn build_policy(&self) -> Result<PolicyTable> {
        PolicyTable::from_specs(&self.policy).context("Invalid policy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_yaml_and_schema() {
        let yaml = serde_yml::to_string(&Config::default()).unwrap();
        let parsed = Config::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = Config::from_yaml_str(
            "sso:\n  end_session_endpoint: https://idp.example/logout\n  home_page: https://app.example/\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.policy, default_rule_specs());
        assert_eq!(config.access.users.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_schema_rejects_unknown_decision() {
        let yaml = r#"
policy:
  - name: odd
    match: { type: glob, pattern: /x }
    decision: maybe
"#;
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_schema_rejects_empty_policy() {
        assert!(Config::from_yaml_str("policy: []\n").is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(
            Some("0.0.0.0".to_string()),
            Some(9000),
            Some("https://idp.example/logout".to_string()),
            Some("https://app.example/".to_string()),
        );
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert!(config.validate().is_ok());
    }
}
