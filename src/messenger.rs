//! Request/response messenger
//!
//! [`Messenger`] builds oxd requests, attaches the protection access token
//! when one is held, and runs each exchange over a [`Transport`]. It does
//! not interpret the response: a `status: "error"` answer is returned like
//! any other. The command client is responsible for that.
//!
//! Nothing is retried here. Socket recovery happens inside the transport;
//! a failed exchange is reported and the caller decides whether to send
//! the request again.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::{OxdError, Result};
use crate::protocol::{json_type_name, Request, ACCESS_TOKEN_PARAM};
use crate::transport::socket::SocketTransport;
use crate::transport::Transport;

/// Sends commands to the oxd server over a single transport.
///
/// # Examples
///
/// ```no_run
/// use oxd_messenger::{Config, Messenger};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = Config::load("config/oxd.yaml")?;
/// let mut messenger = Messenger::from_config(&config)?;
///
/// let response = messenger
///     .request("get_user_info", serde_json::json!({"access_token": "tok"}))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Messenger {
    transport: Box<dyn Transport>,
    access_token: Option<String>,
}

impl Messenger {
    /// Create a messenger over `transport` with no access token.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            access_token: None,
        }
    }

    /// Create a socket messenger from configuration.
    ///
    /// No connection is opened until the first request. The access token is
    /// seeded from `oxd.protection_access_token` when present.
    ///
    /// # Errors
    ///
    /// Returns [`OxdError::Config`] if the configuration does not validate.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut messenger = Self::new(Box::new(SocketTransport::from_config(&config.oxd)));
        if let Some(token) = config
            .oxd
            .protection_access_token
            .as_deref()
            .filter(|t| !t.is_empty())
        {
            messenger.set_access_token(token);
        }
        Ok(messenger)
    }

    /// Send an already-built request and return the raw response.
    ///
    /// The request is sent exactly as given; no access token is added.
    pub async fn send<T: Serialize + ?Sized>(&mut self, request: &T) -> Result<Value> {
        let payload = serde_json::to_value(request).map_err(OxdError::Serialization)?;
        let command = payload
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();

        let started = Instant::now();
        let result = self.transport.exchange(&payload).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::debug!(command = %command, elapsed_ms, "oxd exchange complete"),
            Err(e) => tracing::debug!(command = %command, elapsed_ms, "oxd exchange failed: {}", e),
        }

        result
    }

    /// Build `{"command": command, "params": params}` and send it.
    ///
    /// `params` must serialize to a JSON object, or to `null` for no
    /// parameters. A held access token is written to
    /// `params.protection_access_token`, replacing any value the caller
    /// supplied there.
    ///
    /// # Errors
    ///
    /// Returns [`OxdError::InvalidParams`] if `params` is not an object,
    /// plus anything [`Messenger::send`] returns.
    pub async fn request<P: Serialize>(&mut self, command: &str, params: P) -> Result<Value> {
        let mut params = match serde_json::to_value(params).map_err(OxdError::Serialization)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(OxdError::InvalidParams(format!(
                    "params for `{}` must be a JSON object, got {}",
                    command,
                    json_type_name(&other)
                ))
                .into())
            }
        };

        if let Some(token) = &self.access_token {
            params.insert(ACCESS_TOKEN_PARAM.to_string(), Value::String(token.clone()));
        }

        self.send(&Request::new(command, params)).await
    }

    /// The protection access token, if one is held.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Hold `token` and attach it to every later request.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = Some(token.into());
    }

    /// Set the token from an untyped JSON value, e.g. a field of a response.
    ///
    /// # Errors
    ///
    /// Returns [`OxdError::InvalidAccessToken`] if `value` is not a string.
    /// The held token is left unchanged in that case.
    pub fn set_access_token_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::String(token) => {
                self.access_token = Some(token.clone());
                Ok(())
            }
            other => Err(OxdError::InvalidAccessToken(format!(
                "expected a string, got {}",
                json_type_name(other)
            ))
            .into()),
        }
    }

    /// Stop attaching a token to requests.
    pub fn clear_access_token(&mut self) {
        self.access_token = None;
    }

    /// Description of the transport's remote endpoint.
    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("transport", &self.transport)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
