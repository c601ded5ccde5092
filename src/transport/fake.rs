//! In-process fake transport for unit tests
//!
//! [`FakeTransport`] and [`FakeTransportHandle`] replace the socket in
//! tests of the messenger and the command client.
//!
//! # Usage
//!
//! Call [`FakeTransport::new`] to obtain a `(FakeTransport, FakeTransportHandle)`
//! pair. Box the transport into the code under test, then from the test:
//!
//! - Queue server responses *before* the call: `handle.inbound_tx.send(value)`
//!   or [`FakeTransport::inject_response`].
//! - Inspect what was sent afterwards: `handle.outbound_rx.try_recv()`.
//!
//! ```text
//! exchange(request) -----> outbound_tx -----> outbound_rx (handle reads)
//! handle inbound_tx ------> inbound_rx ------> exchange() return value
//! ```
//!
//! An exchange with no queued response fails with
//! [`OxdError::Transport`] instead of waiting, so a missing response shows
//! up as a test failure rather than a hang.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{OxdError, Result};
use crate::transport::Transport;

/// In-process fake transport for use in tests.
#[derive(Debug)]
pub struct FakeTransport {
    /// Every request passed to `exchange` is forwarded here.
    outbound_tx: mpsc::UnboundedSender<Value>,
    /// Responses queued by the test, consumed one per exchange.
    inbound_rx: mpsc::UnboundedReceiver<Value>,
    /// Same channel end as `handle.inbound_tx`, for `inject_response`.
    inbound_inject_tx: mpsc::UnboundedSender<Value>,
}

/// Test-side handle paired with a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Requests the code under test sent, in order.
    pub outbound_rx: mpsc::UnboundedReceiver<Value>,
    /// Queue a response for the next exchange.
    pub inbound_tx: mpsc::UnboundedSender<Value>,
}

impl FakeTransport {
    /// Create a new `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let transport = Self {
            outbound_tx,
            inbound_rx,
            inbound_inject_tx: inbound_tx.clone(),
        };
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
        };

        (transport, handle)
    }

    /// Queue `response` for the next exchange.
    ///
    /// # Panics
    ///
    /// Never in practice: the transport holds the receiving end itself.
    pub fn inject_response(&self, response: Value) {
        self.inbound_inject_tx
            .send(response)
            .expect("FakeTransport: inbound channel closed");
    }
}

impl FakeTransportHandle {
    /// Queue a successful `{"status":"ok","data":data}` response.
    pub fn respond_ok(&self, data: Value) {
        self.inbound_tx
            .send(serde_json::json!({"status": "ok", "data": data}))
            .expect("FakeTransport dropped");
    }

    /// Queue a `{"status":"error",...}` response.
    pub fn respond_error(&self, error: &str, description: &str, details: Option<Value>) {
        let mut data = serde_json::json!({
            "error": error,
            "error_description": description,
        });
        if let Some(details) = details {
            data["details"] = details;
        }
        self.inbound_tx
            .send(serde_json::json!({"status": "error", "data": data}))
            .expect("FakeTransport dropped");
    }

    /// Take the next request sent through the transport.
    ///
    /// # Panics
    ///
    /// Panics if nothing was sent.
    pub fn sent(&mut self) -> Value {
        self.outbound_rx
            .try_recv()
            .expect("FakeTransport: no request was sent")
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn exchange(&mut self, request: &Value) -> Result<Value> {
        // A dropped handle just means nobody inspects the requests.
        let _ = self.outbound_tx.send(request.clone());

        self.inbound_rx.try_recv().map_err(|_| {
            OxdError::Transport("FakeTransport: no response queued".to_string()).into()
        })
    }

    fn endpoint(&self) -> String {
        "fake".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_exchange_records_request_and_returns_queued_response() {
        let (mut transport, mut handle) = FakeTransport::new();
        handle.respond_ok(json!({"pong": true}));

        let response = transport
            .exchange(&json!({"command": "ping", "params": {}}))
            .await
            .unwrap();

        assert_eq!(response, json!({"status": "ok", "data": {"pong": true}}));
        assert_eq!(handle.sent()["command"], "ping");
    }

    #[tokio::test]
    async fn test_inject_response_is_consumed_in_order() {
        let (mut transport, _handle) = FakeTransport::new();
        transport.inject_response(json!(1));
        transport.inject_response(json!(2));

        assert_eq!(transport.exchange(&json!({})).await.unwrap(), json!(1));
        assert_eq!(transport.exchange(&json!({})).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_missing_response_is_transport_error() {
        let (mut transport, _handle) = FakeTransport::new();
        let err = transport.exchange(&json!({})).await.unwrap_err();
        assert!(err.downcast_ref::<OxdError>().unwrap().is_transport());
    }
}
