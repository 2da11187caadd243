//! The two ways of reaching a tool server: a spawned child process talking
//! newline-delimited JSON-RPC over its standard streams, or a remote
//! endpoint speaking MCP over server-sent events.

use futures::StreamExt;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;

use super::MCPError;
use super::protocol::{Incoming, JsonRpcResponse};
use crate::sse::SseDecoder;

/// Time a child gets to exit on its own after stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Time allowed for an SSE server to announce its message endpoint.
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Sse,
    Stdio,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sse => write!(f, "sse"),
            Self::Stdio => write!(f, "stdio"),
        }
    }
}

#[derive(Default)]
pub struct ResponseRouter {
    pending: Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
    closed: AtomicBool,
}

impl ResponseRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, id: u64) -> Result<oneshot::Receiver<JsonRpcResponse>, MCPError> {
        let mut pending = self.pending.lock().await;
        // `close` flips the flag before draining, so checking under the lock
        // cannot strand a sender.
        if self.is_closed() {
            return Err(MCPError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(rx)
    }

    pub async fn forget(&self, id: u64) {
        self.pending.lock().await.remove(&id);
    }

    pub async fn deliver(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_u64() else {
            tracing::warn!("Dropping response without a numeric id: {:?}", response.id);
            return;
        };
        match self.pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::debug!("No pending request for response id {id}"),
        }
    }

    /// Fails every outstanding request and refuses new ones.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.lock().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn route_message(server_id: &str, text: &str, router: &ResponseRouter) {
    match Incoming::parse(text) {
        Ok(Incoming::Response(response)) => router.deliver(response).await,
        Ok(Incoming::Notification(notification)) => {
            tracing::debug!("[{server_id}] notification {}", notification.method);
        }
        Ok(Incoming::Request(request)) => {
            tracing::debug!("[{server_id}] ignoring server request {}", request.method);
        }
        Err(e) => tracing::warn!("[{server_id}] unparseable message: {e}: {text}"),
    }
}

pub enum Transport {
    Stdio(StdioTransport),
    Sse(SseTransport),
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Sse(_) => TransportKind::Sse,
        }
    }

    pub async fn send(&self, message: &str) -> Result<(), MCPError> {
        match self {
            Self::Stdio(stdio) => stdio.send(message).await,
            Self::Sse(sse) => sse.send(message).await,
        }
    }

    pub async fn close(&self) -> Result<(), MCPError> {
        match self {
            Self::Stdio(stdio) => stdio.close().await,
            Self::Sse(sse) => {
                sse.close().await;
                Ok(())
            }
        }
    }
}

pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    writer: Mutex<Option<BufWriter<ChildStdin>>>,
    reader: JoinHandle<()>,
    router: Arc<ResponseRouter>,
}

impl StdioTransport {
    pub fn spawn(
        server_id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        router: Arc<ResponseRouter>,
    ) -> Result<Self, MCPError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MCPError::SpawnFailed(format!("{command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MCPError::SpawnFailed("child stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MCPError::SpawnFailed("child stdout was not captured".to_string()))?;

        let server_id = server_id.to_string();
        let lines_router = Arc::clone(&router);
        let reader = tokio::spawn(async move {
            let router = lines_router;
            let mut lines = LinesStream::new(BufReader::new(stdout).lines());
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => route_message(&server_id, line.trim(), &router).await,
                    Err(e) => {
                        tracing::warn!("[{server_id}] read error: {e}");
                        break;
                    }
                }
            }
            tracing::debug!("[{server_id}] stdout closed");
            router.close().await;
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            writer: Mutex::new(Some(BufWriter::new(stdin))),
            reader,
            router,
        })
    }

    async fn send(&self, message: &str) -> Result<(), MCPError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(MCPError::Disconnected)?;
        writer.write_all(message.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MCPError> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        let mut guard = self.child.lock().await;
        let result = match guard.as_mut() {
            Some(child) => match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(status) => status.map(|_| ()).map_err(MCPError::from),
                Err(_) => child.kill().await.map_err(MCPError::from),
            },
            None => Ok(()),
        };
        *guard = None;
        self.reader.abort();
        self.router.close().await;
        result
    }
}

pub struct SseTransport {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    reader: JoinHandle<()>,
    router: Arc<ResponseRouter>,
}

impl SseTransport {
    /// Opens the event stream and waits for the `endpoint` announcement.
    pub async fn connect(
        server_id: &str,
        url: &str,
        router: Arc<ResponseRouter>,
    ) -> Result<Self, MCPError> {
        let base = reqwest::Url::parse(url)
            .map_err(|e| MCPError::InvalidConfig(format!("invalid url {url}: {e}")))?;
        let http = reqwest::Client::new();

        let response = http
            .get(base.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| MCPError::ConnectionFailed(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(MCPError::ConnectionFailed(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(
            server_id.to_string(),
            base,
            response,
            endpoint_tx,
            Arc::clone(&router),
        ));

        let endpoint = match tokio::time::timeout(ENDPOINT_TIMEOUT, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(MCPError::ConnectionFailed(format!(
                    "{url}: stream ended before an endpoint was announced"
                )));
            }
            Err(_) => {
                reader.abort();
                return Err(MCPError::Timeout(format!("{url}: no endpoint event")));
            }
        };

        tracing::debug!("[{server_id}] posting messages to {endpoint}");
        Ok(Self {
            http,
            endpoint,
            reader,
            router,
        })
    }

    async fn send(&self, message: &str) -> Result<(), MCPError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .body(message.to_string())
            .send()
            .await
            .map_err(|e| MCPError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MCPError::ProtocolError(format!(
                "message endpoint returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        self.reader.abort();
        self.router.close().await;
    }
}

async fn read_events(
    server_id: String,
    base: reqwest::Url,
    response: reqwest::Response,
    endpoint_tx: oneshot::Sender<reqwest::Url>,
    router: Arc<ResponseRouter>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut decoder = SseDecoder::default();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("[{server_id}] event stream error: {e}");
                break;
            }
        };

        for event in decoder.push(&bytes) {
            match event.event.as_str() {
                "endpoint" => match base.join(event.data.trim()) {
                    Ok(endpoint) => {
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(endpoint);
                        }
                    }
                    Err(e) => tracing::warn!("[{server_id}] bad endpoint {}: {e}", event.data),
                },
                "message" => route_message(&server_id, event.data.trim(), &router).await,
                other => tracing::debug!("[{server_id}] ignoring event {other}"),
            }
        }
    }

    tracing::debug!("[{server_id}] event stream closed");
    router.close().await;
}
