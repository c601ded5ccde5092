//! Configuration management for oxd-messenger
//!
//! This module handles loading, parsing, validating, and overriding
//! configuration from YAML files and environment variables. A loaded
//! [`Config`] is passed explicitly into [`crate::Messenger::from_config`]
//! and [`crate::Client::new`]; nothing is looked up ambiently afterwards.

use crate::error::{OxdError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings for the oxd server
    #[serde(default)]
    pub oxd: OxdConfig,
    /// Site (relying party) settings used by the command client
    #[serde(default)]
    pub client: SiteConfig,
}

/// Connection settings for the oxd server socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OxdConfig {
    /// Server host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Protection access token attached to every request once known
    #[serde(default)]
    pub protection_access_token: Option<String>,

    /// Deadline for a single connect attempt (0 disables)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Deadline for a single read or write (0 disables)
    #[serde(default = "default_io_timeout")]
    pub io_timeout_seconds: u64,

    /// Size of each socket read while reassembling a response
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Reconnect behavior
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8099
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_io_timeout() -> u64 {
    30
}

fn default_read_chunk_size() -> usize {
    1024
}

impl Default for OxdConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            protection_access_token: None,
            connect_timeout_seconds: default_connect_timeout(),
            io_timeout_seconds: default_io_timeout(),
            read_chunk_size: default_read_chunk_size(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl OxdConfig {
    /// Connect deadline, or `None` when disabled
    pub fn connect_timeout(&self) -> Option<Duration> {
        seconds_or_none(self.connect_timeout_seconds)
    }

    /// Read/write deadline, or `None` when disabled
    pub fn io_timeout(&self) -> Option<Duration> {
        seconds_or_none(self.io_timeout_seconds)
    }
}

fn seconds_or_none(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

/// Bounded reconnect with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Connect attempts per (re)connect, and write failures tolerated per message
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubled delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Site registration settings for the command client
///
/// Only `op_host` is required, and only by the commands that register a
/// site. Empty lists are omitted from outgoing requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Previously registered site id
    #[serde(default)]
    pub oxd_id: Option<String>,

    /// OpenID Provider base URL
    #[serde(default)]
    pub op_host: Option<String>,

    /// Redirect URI the OP sends the user back to
    #[serde(default)]
    pub authorization_redirect_uri: Option<String>,

    /// Redirect URI after logout
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,

    /// `web` or `native`
    #[serde(default)]
    pub application_type: Option<String>,

    /// Display name registered with the OP
    #[serde(default)]
    pub client_name: Option<String>,

    /// Requested scopes
    #[serde(default)]
    pub scope: Vec<String>,

    /// Grant types to register
    #[serde(default)]
    pub grant_types: Vec<String>,

    /// Authentication context class references, in priority order
    #[serde(default)]
    pub acr_values: Vec<String>,

    /// Response types to register
    #[serde(default)]
    pub response_types: Vec<String>,

    /// Contact e-mail addresses
    #[serde(default)]
    pub contacts: Vec<String>,

    /// JWKS URI of the client
    #[serde(default)]
    pub client_jwks_uri: Option<String>,

    /// Token endpoint authentication method
    #[serde(default)]
    pub client_token_endpoint_auth_method: Option<String>,

    /// Pre-registered client id
    #[serde(default)]
    pub client_id: Option<String>,

    /// Pre-registered client secret
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OxdError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| OxdError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("OXD_HOST") {
            self.oxd.host = host;
        }

        if let Ok(port) = std::env::var("OXD_PORT") {
            if let Ok(value) = port.parse() {
                self.oxd.port = value;
            } else {
                tracing::warn!("Invalid OXD_PORT: {}", port);
            }
        }

        if let Ok(token) = std::env::var("OXD_PROTECTION_ACCESS_TOKEN") {
            self.oxd.protection_access_token = Some(token);
        }

        if let Ok(timeout) = std::env::var("OXD_CONNECT_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.oxd.connect_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid OXD_CONNECT_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(timeout) = std::env::var("OXD_IO_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.oxd.io_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid OXD_IO_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(attempts) = std::env::var("OXD_RECONNECT_MAX_ATTEMPTS") {
            if let Ok(value) = attempts.parse() {
                self.oxd.reconnect.max_attempts = value;
            } else {
                tracing::warn!("Invalid OXD_RECONNECT_MAX_ATTEMPTS: {}", attempts);
            }
        }

        if let Ok(oxd_id) = std::env::var("OXD_ID") {
            self.client.oxd_id = Some(oxd_id);
        }

        if let Ok(op_host) = std::env::var("OXD_OP_HOST") {
            self.client.op_host = Some(op_host);
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.oxd.host.trim().is_empty() {
            return Err(OxdError::Config("oxd.host cannot be empty".to_string()).into());
        }

        if self.oxd.port == 0 {
            return Err(
                OxdError::Config("oxd.port must be between 1 and 65535".to_string()).into(),
            );
        }

        if self.oxd.read_chunk_size == 0 {
            return Err(OxdError::Config(
                "oxd.read_chunk_size must be greater than 0".to_string(),
            )
            .into());
        }

        let reconnect = &self.oxd.reconnect;
        if reconnect.max_attempts == 0 {
            return Err(OxdError::Config(
                "oxd.reconnect.max_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if reconnect.initial_backoff_ms > reconnect.max_backoff_ms {
            return Err(OxdError::Config(format!(
                "oxd.reconnect.initial_backoff_ms ({}) must not exceed max_backoff_ms ({})",
                reconnect.initial_backoff_ms, reconnect.max_backoff_ms
            ))
            .into());
        }

        for (name, value) in [
            ("client.op_host", &self.client.op_host),
            (
                "client.authorization_redirect_uri",
                &self.client.authorization_redirect_uri,
            ),
            (
                "client.post_logout_redirect_uri",
                &self.client.post_logout_redirect_uri,
            ),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw).map_err(|e| {
                    OxdError::Config(format!("{} is not a valid URL ({}): {}", name, raw, e))
                })?;
            }
        }

        Ok(())
    }
}
