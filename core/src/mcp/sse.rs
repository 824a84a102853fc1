/// SSE backend client
///
/// Opens a long-lived `text/event-stream` connection to the backend. The
/// server's `endpoint` event announces the URL requests are POSTed to;
/// responses arrive as `message` events on the stream and are correlated by
/// request id.
use super::client::{BackendClient, RequestTracker, REQUEST_TIMEOUT};
use super::types::*;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

pub struct SseClient {
    base: Url,
    http: reqwest::Client,
    endpoint: Arc<RwLock<Option<Url>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    tracker: Arc<RequestTracker>,
}

impl SseClient {
    pub fn new(url: &str) -> Result<Self, McpError> {
        let base = Url::parse(url)
            .map_err(|err| McpError::Transport(format!("invalid SSE URL {url}: {err}")))?;

        Ok(Self {
            base,
            http: reqwest::Client::new(),
            endpoint: Arc::new(RwLock::new(None)),
            reader: Mutex::new(None),
            tracker: Arc::new(RequestTracker::new()),
        })
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let endpoint = self
            .endpoint
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::Transport("SSE endpoint not established".to_string()))?;

        let (id, rx) = self.tracker.register().await;

        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: json!(id),
            method: method.to_string(),
            params,
        };

        let posted = self.http.post(endpoint).json(&request).send().await;
        match posted {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                self.tracker.abandon(id).await;
                return Err(McpError::Transport(format!(
                    "message endpoint returned {}",
                    response.status()
                )));
            }
            Err(err) => {
                self.tracker.abandon(id).await;
                return Err(err.into());
            }
        }

        let response = self.tracker.wait(id, rx, method).await?;
        response.into_result()
    }

    async fn send_notification(&self, method: &str) -> Result<(), McpError> {
        let endpoint = self
            .endpoint
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::Transport("SSE endpoint not established".to_string()))?;

        let notification = JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: None,
        };

        self.http
            .post(endpoint)
            .json(&notification)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[async_trait]
impl BackendClient for SseClient {
    async fn start(&self) -> Result<(), McpError> {
        debug!(target: "mcp_client", url = %self.base, "opening SSE stream");

        let response = self
            .http
            .get(self.base.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "SSE stream returned {}",
                response.status()
            )));
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let base = self.base.clone();
        let endpoint_slot = Arc::clone(&self.endpoint);
        let tracker = Arc::clone(&self.tracker);

        let handle = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let mut stream = response.bytes_stream();
            let mut parser = SseParser::default();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(target: "mcp_client", error = %err, "SSE stream error");
                        break;
                    }
                };

                for event in parser.push(&chunk) {
                    match event.name.as_str() {
                        "endpoint" => {
                            let resolved = base.join(event.data.trim());
                            match resolved {
                                Ok(url) => {
                                    *endpoint_slot.write().await = Some(url);
                                    if let Some(tx) = endpoint_tx.take() {
                                        let _ = tx.send(());
                                    }
                                }
                                Err(err) => {
                                    warn!(target: "mcp_client", error = %err, "invalid SSE endpoint");
                                }
                            }
                        }
                        "message" => match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                            Ok(response) => tracker.dispatch(response).await,
                            Err(err) => {
                                warn!(
                                    target: "mcp_client",
                                    error = %err,
                                    "failed to parse SSE message"
                                );
                            }
                        },
                        _ => {}
                    }
                }
            }

            debug!(target: "mcp_client", "SSE reader exited");
        });

        *self.reader.lock().await = Some(handle);

        timeout(REQUEST_TIMEOUT, endpoint_rx)
            .await
            .map_err(|_| McpError::Timeout)?
            .map_err(|_| McpError::Transport("SSE stream closed before endpoint".to_string()))?;

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
        let result = self.send_request("tools/call", Some(json!(params))).await?;

        serde_json::from_value(result)
            .map_err(|err| McpError::Protocol(format!("invalid tools/call result: {err}")))
    }

    async fn close(&self) -> Result<(), McpError> {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }

        *self.endpoint.write().await = None;

        Ok(())
    }
}

/// Incremental `text/event-stream` frame parser.
///
/// Feed raw bytes, get completed events back. An event ends at a blank line;
/// `event:` names it (default `message`) and `data:` lines accumulate.
#[derive(Default)]
struct SseParser {
    buffer: String,
    name: Option<String>,
    data: Vec<String>,
}

struct SseEvent {
    name: String,
    data: String,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(SseEvent {
                        name: self.name.take().unwrap_or_else(|| "message".to_string()),
                        data: self.data.drain(..).collect::<Vec<_>>().join("\n"),
                    });
                }
                self.name = None;
                continue;
            }

            if let Some(name) = line.strip_prefix("event:") {
                self.name = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
            // comment lines (":") and unknown fields are ignored
        }

        events
    }
}
