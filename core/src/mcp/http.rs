/// Streamable-HTTP backend client
///
/// One POST per JSON-RPC request. The server answers with either a plain
/// JSON body or a short event stream carrying the response; the
/// `Mcp-Session-Id` header issued at initialize is echoed on later calls.
use super::client::BackendClient;
use super::types::*;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

const SESSION_HEADER: &str = "mcp-session-id";

pub struct StreamableHttpClient {
    url: Url,
    http: reqwest::Client,
    session: RwLock<Option<HeaderValue>>,
    next_id: AtomicU64,
}

impl StreamableHttpClient {
    pub fn new(url: &str) -> Result<Self, McpError> {
        let url = Url::parse(url)
            .map_err(|err| McpError::Transport(format!("invalid HTTP URL {url}: {err}")))?;

        Ok(Self {
            url,
            http: reqwest::Client::new(),
            session: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, McpError> {
        let mut request = self
            .http
            .post(self.url.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);

        if let Some(session) = self.session.read().await.clone() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "backend returned {}",
                response.status()
            )));
        }

        if let Some(session) = response.headers().get(SESSION_HEADER) {
            *self.session.write().await = Some(session.clone());
        }

        Ok(response)
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: json!(id),
            method: method.to_string(),
            params,
        };

        let response = self.post(&json!(request)).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let decoded = if content_type.starts_with("text/event-stream") {
            let body = response.text().await?;
            response_from_event_stream(&body, id)?
        } else {
            serde_json::from_slice::<JsonRpcResponse>(&response.bytes().await?)?
        };

        decoded.into_result()
    }

    async fn send_notification(&self, method: &str) -> Result<(), McpError> {
        let notification = JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: None,
        };

        self.post(&json!(notification)).await.map(|_| ())
    }
}

/// Pick the response matching `id` out of a buffered event-stream body.
fn response_from_event_stream(body: &str, id: u64) -> Result<JsonRpcResponse, McpError> {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };

        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data.trim_start()) {
            if response.id.as_u64() == Some(id) {
                return Ok(response);
            }
        }
    }

    Err(McpError::Protocol(
        "event stream carried no matching response".to_string(),
    ))
}

#[async_trait]
impl BackendClient for StreamableHttpClient {
    async fn start(&self) -> Result<(), McpError> {
        // No standing connection; each request is its own POST.
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
        // Best-effort session teardown; servers without session state 404 this.
        if let Some(session) = self.session.write().await.take() {
            debug!(target: "mcp_client", url = %self.url, "deleting HTTP session");
            let _ = self
                .http
                .delete(self.url.clone())
                .header(SESSION_HEADER, session)
                .send()
                .await;
        }

        Ok(())
    }
}
