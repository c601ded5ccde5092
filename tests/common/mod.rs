//! Shared helpers for integration tests
//!
//! [`StubServer`] is a loopback oxd server speaking the real framing: it
//! decodes each request, passes it to a handler closure, and frames the
//! handler's return value back.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use oxd_messenger::transport::frame;

type Handler = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A running stub server. Aborted on drop.
pub struct StubServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

#[allow(dead_code)]
impl StubServer {
    /// Serve every request on every connection with `handler`.
    pub async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::spawn_with_limit(handler, None).await
    }

    /// Like [`StubServer::spawn`], but close each connection after
    /// `per_connection` responses.
    pub async fn spawn_with_limit<F>(handler: F, per_connection: Option<usize>) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind stub server");
        let addr = listener.local_addr().expect("stub server has no address");
        let handler: Handler = Arc::new(handler);
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));

        let task = {
            let connections = connections.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_connection(
                        stream,
                        handler.clone(),
                        requests.clone(),
                        per_connection,
                    ));
                }
            })
        };

        Self {
            addr,
            connections,
            requests,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Requests answered so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    handler: Handler,
    requests: Arc<AtomicUsize>,
    per_connection: Option<usize>,
) {
    let mut served = 0usize;
    loop {
        if per_connection.map_or(false, |limit| served >= limit) {
            return;
        }

        let mut prefix = [0u8; frame::LENGTH_PREFIX_LEN];
        if stream.read_exact(&mut prefix).await.is_err() {
            return;
        }
        let Ok(length) = frame::decode_length(&prefix) else {
            return;
        };
        let mut payload = vec![0u8; length];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }
        let Ok(request) = frame::decode_payload(&payload) else {
            return;
        };

        let response = handler(request);
        let Ok(bytes) = frame::encode(&response) else {
            return;
        };
        if stream.write_all(&bytes).await.is_err() {
            return;
        }

        served += 1;
        requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// `{"status":"ok","data":data}`
#[allow(dead_code)]
pub fn ok(data: Value) -> Value {
    serde_json::json!({"status": "ok", "data": data})
}

/// A loopback port with nothing listening on it.
#[allow(dead_code)]
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind probe listener");
    let port = listener.local_addr().expect("no local address").port();
    drop(listener);
    port
}

/// Route library logs to the test output. Safe to call from every test.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("oxd_messenger=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
