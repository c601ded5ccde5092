//! oxd-messenger - client library for the oxd authorization server
//!
//! This library talks to an oxd server over its length-prefixed JSON socket
//! protocol and exposes the oxd OpenID Connect and UMA commands as typed
//! async methods.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `transport`: the `Transport` trait, the wire codec (`transport::frame`),
//!   and the reconnecting socket transport (`transport::socket`)
//! - `messenger`: request building, access-token injection, exchanges
//! - `protocol`: request/response types and command names
//! - `client`: one method per oxd command, with typed application errors
//! - `resource`: UMA resource sets for `uma_rs_protect`
//! - `config`: configuration loading and validation
//! - `error`: error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use oxd_messenger::{Config, Messenger};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/oxd.yaml")?;
//!     let mut messenger = Messenger::from_config(&config)?;
//!
//!     let response = messenger.request("ping", serde_json::Value::Null).await?;
//!     println!("{}", response);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod messenger;
pub mod protocol;
pub mod resource;
pub mod transport;

// Re-export commonly used types
pub use client::{Client, RptRequest};
pub use config::Config;
pub use error::{OxdError, Result};
pub use messenger::Messenger;
pub use protocol::{Request, Response, ResponseStatus};
pub use resource::{Resource, ResourceSet};
pub use transport::socket::{ConnectionState, SocketTransport};
pub use transport::Transport;
