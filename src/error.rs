//! Error types for oxd-messenger
//!
//! This module defines all error types used throughout the library,
//! using `thiserror` for ergonomic error handling.
//!
//! Errors fall into three classes that callers usually want to treat
//! differently:
//!
//! - transport errors (connection refused, broken pipe, deadlines) where
//!   retrying the whole operation may succeed,
//! - framing errors where the bytes on the wire could not be understood,
//! - application errors where the server answered with `status: "error"`.

use thiserror::Error;

/// Main error type for oxd-messenger operations
#[derive(Error, Debug)]
pub enum OxdError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connecting (or reconnecting) to the server failed after all attempts
    #[error("Connection error: {0}")]
    Connection(String),

    /// A read or write on an established connection failed and was not recovered
    #[error("Transport error: {0}")]
    Transport(String),

    /// A connect, read, or write deadline elapsed
    #[error("Timed out during {operation} after {limit:?}")]
    Timeout {
        /// The operation that timed out (`connect`, `read`, `write`)
        operation: String,
        /// The configured deadline
        limit: std::time::Duration,
    },

    /// The JSON payload does not fit in the 4-digit length prefix
    #[error("Frame too large: {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Encoded payload size in bytes
        size: usize,
        /// Largest payload the framing can describe
        max: usize,
    },

    /// The length prefix or payload of a frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// An access token was supplied with the wrong JSON type
    #[error("Invalid access token: {0}")]
    InvalidAccessToken(String),

    /// Request parameters did not serialize to a JSON object
    #[error("Invalid request params: {0}")]
    InvalidParams(String),

    /// The server answered with `status: "error"`
    #[error("oxd server error: {error}: {description}")]
    Server {
        /// Machine-readable error code
        error: String,
        /// Human-readable description
        description: String,
    },

    /// The server rejected an UMA permission ticket
    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),

    /// The server needs more claims before issuing an RPT
    #[error("Need info: {description}")]
    NeedInfo {
        /// Human-readable description
        description: String,
        /// Server-provided details (ticket, required claims, redirect URI)
        details: serde_json::Value,
    },

    /// Access check on a resource that is not protected
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OxdError {
    /// Returns `true` for failures of the underlying connection.
    ///
    /// Retrying the whole request is reasonable for these.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OxdError::Connection(_)
                | OxdError::Transport(_)
                | OxdError::Timeout { .. }
                | OxdError::Io(_)
        )
    }

    /// Returns `true` when bytes on the wire could not be framed or parsed.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            OxdError::FrameTooLarge { .. } | OxdError::MalformedFrame(_)
        )
    }

    /// Returns `true` when the server itself reported an error.
    pub fn is_application(&self) -> bool {
        matches!(
            self,
            OxdError::Server { .. }
                | OxdError::InvalidTicket(_)
                | OxdError::NeedInfo { .. }
                | OxdError::InvalidRequest(_)
        )
    }
}

/// Result type alias for oxd-messenger operations
///
/// Uses `anyhow::Error` so that context can be attached while the
/// underlying [`OxdError`] stays reachable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
