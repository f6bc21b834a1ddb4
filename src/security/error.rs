// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-sso-gate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy of the security core
//!
//! Only malformed configuration and failing collaborators are errors.
//! Authorization outcomes, including denials, are [`Decision`](super::Decision)
//! values and never travel through this type.

use thiserror::Error;

/// Errors raised by the security core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// Malformed or missing configuration (bad pattern, empty rule list,
    /// missing or relative endpoint URL). Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The credential store has no entry for this user.
    #[error("User '{username}' not found")]
    Lookup { username: String },

    /// The user exists but the presented password does not verify.
    #[error("Invalid credentials for user '{username}'")]
    InvalidCredentials { username: String },

    /// An external collaborator (session store, directory) failed.
    #[error("External service error: {0}")]
    ExternalService(String),
}

impl SecurityError {
    /// Shorthand for building a [`SecurityError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        SecurityError::Configuration(message.into())
    }

    /// `true` for failures the caller should report as "authentication failed"
    /// rather than as a server fault.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            SecurityError::Lookup { .. } | SecurityError::InvalidCredentials { .. }
        )
    }
}

/// Result alias used throughout the security core.
pub type Result<T> = std::result::Result<T, SecurityError>;
