//! Socket transport for the oxd server
//!
//! This module implements [`SocketTransport`], which keeps exactly one
//! outbound connection to the server and exchanges length-prefixed JSON
//! frames over it (see [`crate::transport::frame`]).
//!
//! # Lifecycle
//!
//! ```text
//!  UNINITIALIZED --first exchange--> CONNECTED --I/O error--> FAILED
//!                                        ^                      |
//!                                        +----- reconnect ------+
//! ```
//!
//! - No connection is opened at construction; the first exchange connects.
//! - The connection is reused for every later exchange.
//! - Connecting makes at most [`RetryPolicy::max_attempts`] attempts with
//!   exponential backoff between them, then fails with
//!   [`OxdError::Connection`].
//!
//! # Partial I/O
//!
//! Writes track how many bytes the OS accepted. When a write fails the
//! socket is replaced and sending continues from the same offset, so no
//! byte is dropped or sent twice.
//!
//! Reads accumulate chunks until the declared payload length has arrived.
//! Unlike writes, a failed read is never resumed: the partial frame is
//! discarded, the socket is dropped, and the error is returned. Resuming
//! on a new connection could stitch bytes of two different responses
//! together. The next exchange reconnects.

use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{OxdConfig, ReconnectConfig};
use crate::error::{OxdError, Result};
use crate::transport::frame::{self, LENGTH_PREFIX_LEN};
use crate::transport::Transport;

/// Default size of each socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Connection lifecycle state of a [`SocketTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Uninitialized,
    /// A live socket is held.
    Connected,
    /// The last socket failed and was discarded.
    Failed,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Connect attempts per (re)connect. Also the number of failed writes
    /// tolerated while sending one message.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Upper bound for the delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Build a policy from its configuration section.
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use oxd_messenger::transport::socket::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_millis(100));
    /// assert_eq!(policy.backoff(3), Duration::from_millis(400));
    /// ```
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

/// Opens new connections for a [`SocketTransport`].
///
/// Separating socket creation from the transport lets tests hand out
/// scripted in-memory streams instead of real sockets.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// The connected byte stream.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open a fresh connection.
    async fn connect(&self) -> io::Result<Self::Stream>;

    /// `host:port` (or similar) for logs and error messages.
    fn address(&self) -> String;
}

/// [`Connector`] for plain TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    /// Create a connector for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        // Frames are small request/response pairs; don't let Nagle hold them back.
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Length-prefixed JSON transport over a single reusable connection.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use oxd_messenger::transport::socket::{RetryPolicy, SocketTransport};
///
/// let transport = SocketTransport::tcp("localhost", 8099)
///     .with_retry(RetryPolicy {
///         max_attempts: 3,
///         initial_backoff: Duration::from_millis(50),
///         max_backoff: Duration::from_secs(1),
///     })
///     .with_timeouts(Some(Duration::from_secs(5)), Some(Duration::from_secs(10)));
/// ```
pub struct SocketTransport<C: Connector = TcpConnector> {
    connector: C,
    stream: Option<C::Stream>,
    state: ConnectionState,
    retry: RetryPolicy,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
    read_chunk_size: usize,
}

impl SocketTransport<TcpConnector> {
    /// TCP transport to `host:port` with default settings.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(TcpConnector::new(host, port))
    }

    /// TCP transport built from the `oxd` configuration section.
    pub fn from_config(config: &OxdConfig) -> Self {
        Self::new(TcpConnector::new(config.host.clone(), config.port))
            .with_retry(RetryPolicy::from_config(&config.reconnect))
            .with_timeouts(config.connect_timeout(), config.io_timeout())
            .with_read_chunk_size(config.read_chunk_size)
    }
}

impl<C: Connector> SocketTransport<C> {
    /// Create an unconnected transport that will open sockets with `connector`.
    pub fn new(connector: C) -> Self {
        let defaults = OxdConfig::default();
        Self {
            connector,
            stream: None,
            state: ConnectionState::Uninitialized,
            retry: RetryPolicy::default(),
            connect_timeout: defaults.connect_timeout(),
            io_timeout: defaults.io_timeout(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Replace the reconnect policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set per-attempt connect and per-operation read/write deadlines.
    /// `None` waits indefinitely.
    pub fn with_timeouts(mut self, connect: Option<Duration>, io: Option<Duration>) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }

    /// Set the size of each socket read (minimum 1).
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `true` while a live socket is held.
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The connector used to open sockets.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Drop the current socket (if any) and open a new one.
    async fn connect(&mut self) -> Result<()> {
        self.stream = None;
        let address = self.connector.address();
        let mut last_error: Option<io::Error> = None;

        for attempt in 1..=self.retry.max_attempts {
            tracing::debug!(address = %address, attempt, "connecting to oxd server");

            match with_deadline(self.connect_timeout, self.connector.connect()).await {
                Ok(stream) => {
                    match self.state {
                        ConnectionState::Uninitialized => {
                            tracing::info!("Opened first connection to oxd server at {}", address)
                        }
                        _ => tracing::info!("Reconnected to oxd server at {}", address),
                    }
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        address = %address,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        "connect failed: {}",
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        self.state = ConnectionState::Failed;
        if let (Some(limit), Some(e)) = (self.connect_timeout, &last_error) {
            if e.kind() == io::ErrorKind::TimedOut {
                return Err(OxdError::Timeout {
                    operation: "connect".to_string(),
                    limit,
                }
                .into());
            }
        }
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no connection attempts allowed".to_string());
        Err(OxdError::Connection(format!(
            "failed to connect to {} after {} attempt(s): {}",
            address, self.retry.max_attempts, reason
        ))
        .into())
    }

    /// Borrow the live socket, connecting first if there is none.
    async fn ensure_connected(&mut self) -> Result<&mut C::Stream> {
        if self.stream.is_none() {
            self.connect().await?;
        }
        self.stream
            .as_mut()
            .ok_or_else(|| OxdError::Connection("no socket after connect".to_string()).into())
    }

    fn mark_failed(&mut self) {
        self.stream = None;
        self.state = ConnectionState::Failed;
    }

    /// Send every byte of `bytes`, reconnecting and resuming from the
    /// current offset when a write fails.
    async fn write_resuming(&mut self, bytes: &[u8]) -> Result<()> {
        let io_timeout = self.io_timeout;
        let mut sent = 0usize;
        let mut failures = 0u32;

        while sent < bytes.len() {
            let stream = self.ensure_connected().await?;
            let result = with_deadline(io_timeout, stream.write(&bytes[sent..])).await;

            let error = match result {
                Ok(0) => io::Error::new(io::ErrorKind::WriteZero, "socket accepted zero bytes"),
                Ok(n) => {
                    sent += n;
                    tracing::trace!(sent, total = bytes.len(), "wrote frame bytes");
                    continue;
                }
                Err(e) => e,
            };

            failures += 1;
            self.mark_failed();
            if failures > self.retry.max_attempts {
                if let (Some(limit), io::ErrorKind::TimedOut) = (io_timeout, error.kind()) {
                    return Err(OxdError::Timeout {
                        operation: "write".to_string(),
                        limit,
                    }
                    .into());
                }
                return Err(OxdError::Transport(format!(
                    "write failed {} time(s) with {} of {} bytes sent: {}",
                    failures,
                    sent,
                    bytes.len(),
                    error
                ))
                .into());
            }
            tracing::warn!(
                sent,
                total = bytes.len(),
                "Reconnecting due to socket error: {}",
                error
            );
        }

        let stream = self.ensure_connected().await?;
        if let Err(e) = with_deadline(io_timeout, stream.flush()).await {
            self.mark_failed();
            return Err(OxdError::Transport(format!("flush failed: {}", e)).into());
        }

        Ok(())
    }

    /// Read one complete frame payload from the live socket.
    async fn receive_frame(&mut self) -> Result<Vec<u8>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| OxdError::Transport("no connection to read from".to_string()))?;

        let outcome = read_frame_from(stream, self.read_chunk_size, self.io_timeout).await;
        if outcome.is_err() {
            self.mark_failed();
        }
        outcome
    }
}

impl<C: Connector> fmt::Debug for SocketTransport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTransport")
            .field("connector", &self.connector)
            .field("state", &self.state)
            .field("retry", &self.retry)
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .field("read_chunk_size", &self.read_chunk_size)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<C: Connector> Transport for SocketTransport<C> {
    /// Encode `request`, send it, and decode the response frame.
    ///
    /// # Errors
    ///
    /// - [`OxdError::FrameTooLarge`] before anything is sent.
    /// - [`OxdError::Connection`] when (re)connecting is exhausted.
    /// - [`OxdError::Timeout`] when the last connect attempt, the last write
    ///   attempt or a read ran past its deadline.
    /// - [`OxdError::Transport`] when a write keeps failing or the response
    ///   is cut off.
    /// - [`OxdError::MalformedFrame`] when the response cannot be decoded.
    async fn exchange(&mut self, request: &Value) -> Result<Value> {
        let frame = frame::encode(request)?;
        tracing::trace!(bytes = frame.len(), endpoint = %self.connector.address(), "sending frame");

        self.write_resuming(&frame).await?;
        let payload = self.receive_frame().await?;
        tracing::trace!(bytes = payload.len(), "received frame");

        frame::decode_payload(&payload).map_err(|e| {
            self.mark_failed();
            e
        })
    }

    fn endpoint(&self) -> String {
        self.connector.address()
    }
}

/// Accumulate reads until the declared payload length has arrived.
///
/// The length prefix may itself be split across reads. Bytes past the
/// declared length are discarded.
async fn read_frame_from<S>(
    stream: &mut S,
    chunk_size: usize,
    io_timeout: Option<Duration>,
) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = BytesMut::with_capacity(LENGTH_PREFIX_LEN);
    let mut payload = BytesMut::new();
    let mut declared: Option<usize> = None;
    let mut chunk = vec![0u8; chunk_size];

    loop {
        let n = match with_deadline(io_timeout, stream.read(&mut chunk)).await {
            Ok(0) => {
                return Err(OxdError::Transport(format!(
                    "connection closed by server after {} byte(s) of the response",
                    prefix.len() + payload.len()
                ))
                .into())
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut && io_timeout.is_some() => {
                return Err(OxdError::Timeout {
                    operation: "read".to_string(),
                    limit: io_timeout.unwrap_or_default(),
                }
                .into())
            }
            Err(e) => return Err(OxdError::Transport(format!("read failed: {}", e)).into()),
        };

        let mut data = &chunk[..n];

        if declared.is_none() {
            let take = (LENGTH_PREFIX_LEN - prefix.len()).min(data.len());
            prefix.extend_from_slice(&data[..take]);
            data = &data[take..];

            if prefix.len() == LENGTH_PREFIX_LEN {
                let length = frame::decode_length(&prefix)?;
                payload.reserve(length);
                declared = Some(length);
            }
        }

        payload.extend_from_slice(data);

        if let Some(length) = declared {
            if payload.len() >= length {
                if payload.len() > length {
                    tracing::warn!(
                        extra = payload.len() - length,
                        "discarding bytes past the declared frame length"
                    );
                    payload.truncate(length);
                }
                return Ok(payload.to_vec());
            }
        }
    }
}

/// Run `fut` under an optional deadline, reporting expiry as `TimedOut`.
async fn with_deadline<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("deadline of {:?} elapsed", limit),
            ))
        }),
        None => fut.await,
    }
}
