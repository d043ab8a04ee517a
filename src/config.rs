//! Relay configuration
//!
//! Read once at startup from the environment and shared as an immutable
//! snapshot. Booleans are enabled only by the literal value `true`.

use crate::nostr::{RelaySigner, SignError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid RELAY_SECRET: {0}")]
    InvalidSecret(#[from] SignError),

    #[error("invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Immutable configuration snapshot
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay address, used in logs
    pub relay_url: String,
    pub admins: Vec<String>,
    pub whitelist: Vec<String>,
    /// Static claims accepted by the join protocol
    pub claims: Vec<String>,
    /// Base URL of the remote access backend
    pub auth_backend: Option<String>,
    pub auth_backend_timeout: Duration,
    /// Key the relay signs its own events with
    pub signer: RelaySigner,
    /// Callers must be authenticated and have access
    pub restrict_user: bool,
    /// Event authors must have access
    pub restrict_author: bool,
    /// Hand out fresh invites to callers querying for them
    pub generate_claims: bool,
    pub enable_groups: bool,
    /// Blank signatures for non-admin readers
    pub strip_signatures: bool,
    /// Answer join requests with a put-user event
    pub auto_join: bool,
    /// Answer leave requests with a remove-user event
    pub auto_leave: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relay_url: "localhost:3334".to_string(),
            admins: Vec::new(),
            whitelist: Vec::new(),
            claims: Vec::new(),
            auth_backend: None,
            auth_backend_timeout: Duration::from_secs(60),
            signer: RelaySigner::generate(),
            restrict_user: true,
            restrict_author: false,
            generate_claims: false,
            enable_groups: false,
            strip_signatures: false,
            auto_join: false,
            auto_leave: true,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset variables take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let flag = |name: &str, default: bool| match lookup(name) {
            Some(value) => value == "true",
            None => default,
        };

        let signer = match lookup("RELAY_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => RelaySigner::from_hex(&secret)?,
            None => defaults.signer,
        };

        let auth_backend_timeout = match lookup("RELAY_AUTH_BACKEND_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    name: "RELAY_AUTH_BACKEND_TIMEOUT_SECS",
                    value,
                })?,
            None => defaults.auth_backend_timeout,
        };

        Ok(Self {
            relay_url: lookup("RELAY_URL").unwrap_or(defaults.relay_url),
            admins: split_list(lookup("RELAY_ADMINS")),
            whitelist: split_list(lookup("RELAY_WHITELIST")),
            claims: split_list(lookup("RELAY_CLAIMS")),
            auth_backend: lookup("RELAY_AUTH_BACKEND").filter(|s| !s.is_empty()),
            auth_backend_timeout,
            signer,
            restrict_user: flag("RELAY_RESTRICT_USER", defaults.restrict_user),
            restrict_author: flag("RELAY_RESTRICT_AUTHOR", defaults.restrict_author),
            generate_claims: flag("RELAY_GENERATE_CLAIMS", defaults.generate_claims),
            enable_groups: flag("RELAY_ENABLE_GROUPS", defaults.enable_groups),
            strip_signatures: flag("RELAY_STRIP_SIGNATURES", defaults.strip_signatures),
            auto_join: flag("GROUP_AUTO_JOIN", defaults.auto_join),
            auto_leave: flag("GROUP_AUTO_LEAVE", defaults.auto_leave),
        })
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
