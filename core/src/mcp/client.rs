/// Backend MCP clients
///
/// `BackendClient` is the seam between the aggregation engine and a single
/// backend MCP server. `StdioClient` speaks JSON-RPC 2.0 over a spawned
/// subprocess with proper request/response correlation.
use super::types::*;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};

/// Per-request timeout applied by every client implementation
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected client for a single backend MCP server.
///
/// All calls may block on backend I/O; dropping an in-flight future cancels
/// the wait (the backend may still observe the request).
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Open the underlying transport.
    async fn start(&self) -> Result<(), McpError>;

    /// Perform the MCP initialize handshake.
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult, McpError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), McpError>;

    /// Fetch a single page of the backend's tool listing.
    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, McpError>;

    /// Invoke a tool by its backend-local name.
    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, McpError>;

    /// Tear down the transport. Must be safe to call more than once.
    async fn close(&self) -> Result<(), McpError>;
}

impl std::fmt::Debug for dyn BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn BackendClient")
    }
}

/// Shared request/response correlation state for line- or event-oriented
/// transports: a monotonically increasing id and a map of waiting callers.
pub(crate) struct RequestTracker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
}

impl RequestTracker {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn register(&self) -> (u64, oneshot::Receiver<JsonRpcResponse>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        (id, rx)
    }

    pub(crate) async fn abandon(&self, id: u64) {
        self.pending.lock().await.remove(&id);
    }

    /// Route a decoded response to its waiting caller, if any.
    pub(crate) async fn dispatch(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_u64() else {
            return;
        };

        if let Some(tx) = self.pending.lock().await.remove(&id) {
            let _ = tx.send(response);
        } else {
            warn!(target: "mcp_client", id, "received response for unknown request");
        }
    }

    /// Await a registered response with the standard request timeout.
    pub(crate) async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<JsonRpcResponse>,
        method: &str,
    ) -> Result<JsonRpcResponse, McpError> {
        match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                self.abandon(id).await;
                Err(McpError::Transport("response channel closed".to_string()))
            }
            Err(_) => {
                warn!(target: "mcp_client", method, "request timeout");
                self.abandon(id).await;
                Err(McpError::Timeout)
            }
        }
    }
}

/// MCP client speaking to a spawned subprocess over stdio
pub struct StdioClient {
    command: String,
    args: Vec<String>,
    env: Vec<String>,
    process: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    tracker: Arc<RequestTracker>,
}

impl StdioClient {
    /// Create a client for `command args...` with a `KEY=VALUE` environment list.
    pub fn new(command: String, args: Vec<String>, env: Vec<String>) -> Self {
        Self {
            command,
            args,
            env,
            process: Mutex::new(None),
            stdin: Mutex::new(None),
            reader: Mutex::new(None),
            tracker: Arc::new(RequestTracker::new()),
        }
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let (id, rx) = self.tracker.register().await;

        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: json!(id),
            method: method.to_string(),
            params,
        };

        if let Err(err) = self.write_line(&serde_json::to_string(&request)?).await {
            self.tracker.abandon(id).await;
            return Err(err);
        }

        let response = self.tracker.wait(id, rx, method).await?;
        response.into_result()
    }

    async fn send_notification(&self, method: &str) -> Result<(), McpError> {
        let notification = JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: None,
        };

        self.write_line(&serde_json::to_string(&notification)?).await
    }

    async fn write_line(&self, line: &str) -> Result<(), McpError> {
        let mut stdin_guard = self.stdin.lock().await;
        let stdin = stdin_guard
            .as_mut()
            .ok_or_else(|| McpError::Transport("stdin not available".to_string()))?;

        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    fn spawn_reader(&self, stdout: ChildStdout) -> JoinHandle<()> {
        let tracker = Arc::clone(&self.tracker);
        let command = self.command.clone();

        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<JsonRpcResponse>(&line) {
                    Ok(response) => tracker.dispatch(response).await,
                    Err(err) => {
                        warn!(
                            target: "mcp_client",
                            command = %command,
                            error = %err,
                            "failed to parse JSON-RPC response"
                        );
                    }
                }
            }

            debug!(target: "mcp_client", command = %command, "stdout reader exited");
        })
    }
}

#[async_trait]
impl BackendClient for StdioClient {
    async fn start(&self) -> Result<(), McpError> {
        debug!(target: "mcp_client", command = %self.command, "spawning MCP server process");

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for pair in &self.env {
            if let Some((key, value)) = pair.split_once('=') {
                cmd.env(key, value);
            }
        }

        let mut child = cmd.spawn().map_err(|err| {
            error!(target: "mcp_client", command = %self.command, error = %err, "failed to spawn process");
            McpError::Transport(format!("failed to spawn process: {err}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture stdout".to_string()))?;

        *self.stdin.lock().await = Some(stdin);
        *self.process.lock().await = Some(child);
        *self.reader.lock().await = Some(self.spawn_reader(stdout));

        Ok(())
    }

    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult, McpError> {
        let result = self.send_request("initialize", Some(json!(params))).await?;

        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|err| McpError::Protocol(format!("invalid initialize result: {err}")))?;

        self.send_notification("notifications/initialized").await?;

        Ok(result)
    }

    async fn ping(&self) -> Result<(), McpError> {
        self.send_request("ping", None).await.map(|_| ())
    }

    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, McpError> {
        let params = ListToolsParams { cursor };
        let result = self.send_request("tools/list", Some(json!(params))).await?;

        serde_json::from_value(result)
            .map_err(|err| McpError::Protocol(format!("invalid tools/list result: {err}")))
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, McpError> {
        debug!(target: "mcp_client", tool = %params.name, "calling tool");

        let result = self.send_request("tools/call", Some(json!(params))).await?;

        serde_json::from_value(result)
            .map_err(|err| McpError::Protocol(format!("invalid tools/call result: {err}")))
    }

    async fn close(&self) -> Result<(), McpError> {
        debug!(target: "mcp_client", command = %self.command, "closing MCP server process");

        // Closing stdin signals shutdown to well-behaved servers.
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }

        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }

        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }

        Ok(())
    }
}
