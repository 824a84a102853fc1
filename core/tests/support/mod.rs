//! Scripted backend standing in for a real MCP server.
#![allow(dead_code)]

use async_trait::async_trait;
use mcpblade_core::mcp::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn tool(name: &str, description: Option<&str>) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.map(str::to_string),
        input_schema: json!({
            "type": "object",
            "properties": {
                "timezone": {"type": "string"}
            }
        }),
        annotations: None,
    }
}

/// Counters and recordings that stay observable after the backend is boxed
/// and handed to the service.
#[derive(Clone, Default)]
pub struct Handles {
    pub calls: Arc<Mutex<Vec<CallToolParams>>>,
    pub pings: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl Handles {
    pub fn last_call(&self) -> Option<CallToolParams> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockBackend {
    pages: Vec<Vec<Tool>>,
    handles: Handles,
}

impl MockBackend {
    pub fn with_tools(tools: Vec<Tool>) -> Self {
        Self::with_pages(vec![tools])
    }

    pub fn with_pages(pages: Vec<Vec<Tool>>) -> Self {
        Self {
            pages,
            handles: Handles::default(),
        }
    }

    pub fn handles(&self) -> Handles {
        self.handles.clone()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn start(&self) -> Result<(), McpError> {
        Ok(())
    }

    async fn initialize(&self, _params: InitializeParams) -> Result<InitializeResult, McpError> {
        Ok(InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: Default::default(),
            server_info: Implementation {
                name: "mock".to_string(),
                version: "0.0.0".to_string(),
            },
            instructions: None,
        })
    }

    async fn ping(&self) -> Result<(), McpError> {
        self.handles.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, McpError> {
        let index = match cursor.as_deref() {
            None | Some("") => 0,
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| McpError::Protocol(format!("bad cursor {cursor:?}")))?,
        };

        let tools = self
            .pages
            .get(index)
            .cloned()
            .ok_or_else(|| McpError::Protocol(format!("no page {index}")))?;

        let next_cursor = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));

        Ok(ListToolsResult { tools, next_cursor })
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, McpError> {
        self.handles.calls.lock().unwrap().push(params.clone());

        let echo = json!({
            "tool": params.name,
            "arguments": params.arguments.unwrap_or(json!({})),
            "is_dst": false,
        });

        Ok(CallToolResult {
            content: vec![Content::Text {
                text: echo.to_string(),
            }],
            is_error: false,
        })
    }

    async fn close(&self) -> Result<(), McpError> {
        self.handles.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
