//! Transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that carries one oxd request
//! to the server and brings back its response. Concrete implementations
//! live in submodules:
//!
//! - [`socket::SocketTransport`] -- the length-prefixed TCP protocol,
//!   with lazy connect and reconnect-on-error.
//! - `fake::FakeTransport` -- in-process fake used in tests (cfg(test)
//!   only).
//!
//! [`frame`] holds the wire codec used by the socket transport.
//!
//! # Design
//!
//! The protocol carries no request identifiers, so a transport can only
//! have one exchange in flight. `exchange` takes `&mut self`, which makes
//! the borrow checker enforce that. Callers that need concurrency use one
//! transport per task or wrap it in a mutex.
//!
//! Framing, connection management, and retries are the responsibility of
//! each implementation. An HTTPS transport would be another implementation
//! of this trait that POSTs the same JSON bodies and sends the token as a
//! bearer header.

use serde_json::Value;

use crate::error::Result;

/// Abstraction over oxd transport implementations.
///
/// # Examples
///
/// ```no_run
/// use oxd_messenger::transport::socket::SocketTransport;
/// use oxd_messenger::transport::Transport;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let mut transport = SocketTransport::tcp("localhost", 8099);
/// let response = transport
///     .exchange(&serde_json::json!({"command": "ping", "params": {}}))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait Transport: Send + std::fmt::Debug {
    /// Send one request payload and wait for the response to it.
    ///
    /// The payload is an already-built JSON object
    /// (`{"command": ..., "params": {...}}`); the response is returned
    /// as parsed JSON without interpreting its `status`.
    ///
    /// # Errors
    ///
    /// Returns a transport-class [`crate::error::OxdError`] when the peer
    /// cannot be reached or the exchange is interrupted, and a framing-class
    /// error when the response cannot be decoded.
    async fn exchange(&mut self, request: &Value) -> Result<Value>;

    /// Human-readable description of the remote endpoint, for logs.
    fn endpoint(&self) -> String;
}

pub mod frame;
pub mod socket;

#[cfg(test)]
pub mod fake;
