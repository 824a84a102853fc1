// MCPBlade MCP facade
// Serves the aggregated tool surface as a single MCP server: a JSON-RPC
// handler set for initialize / ping / tools/list / tools/call, plus a stdio
// serve loop.

pub mod stdio;

use mcpblade_core::mcp::{
    CallToolParams, CallToolRequest, Implementation, InitializeParams, InitializeResult,
    JsonRpcRequest, ListToolsResult, ServerCapabilities, ToolsCapability, INTERNAL_ERROR,
    INVALID_PARAMS, JSONRPC_VERSION, LATEST_PROTOCOL_VERSION, METHOD_NOT_FOUND,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use mcpblade_core::{RequestContext, Service};
use serde_json::{json, Value};
use std::sync::Arc;

pub const SERVER_NAME: &str = "mcpblade";
pub const SERVER_VERSION: &str = "1.0.0";

pub const SERVER_INSTRUCTIONS: &str = r#"MCPBlade aggregates and manages tools from multiple MCP servers, providing:

1. **Tool Discovery**: List all available tools from connected servers
2. **Semantic Search**: Find tools using natural language queries
3. **Smart Routing**: Automatically routes tool calls to the correct backend server
4. **Vector Search**: Tools are indexed for intelligent search capabilities

Available operations:
- tools/list: Get all available tools
- tools/call: Execute tools (automatically routed)
- search_tools: Find tools using semantic search

All tools are enhanced with server information and deduplicated for easy discovery."#;

/// JSON-RPC handler set over the aggregation engine.
///
/// An attached `RequestContext` scopes every dispatched call; the binary uses
/// this for its dedicated-backend mode.
pub struct McpFacade {
    svc: Arc<Service>,
    ctx: RequestContext,
}

impl McpFacade {
    pub fn new(svc: Arc<Service>) -> Self {
        Self::with_context(svc, RequestContext::default())
    }

    pub fn with_context(svc: Arc<Service>, ctx: RequestContext) -> Self {
        Self { svc, ctx }
    }

    /// Handle one request. Returns `None` for notifications (no id), which
    /// get no response by JSON-RPC rules.
    pub async fn handle(&self, req: JsonRpcRequest) -> Option<Value> {
        if req.id.is_null() {
            return None;
        }

        let response = match req.method.as_str() {
            "initialize" => self.initialize(&req),
            "ping" => ping(&req),
            "tools/list" => self.list_tools(&req).await,
            "tools/call" => self.call_tool(&req).await,
            _ => error_response(&req.id, METHOD_NOT_FOUND, "method not found"),
        };

        Some(response)
    }

    fn initialize(&self, req: &JsonRpcRequest) -> Value {
        let params = req.params.clone().unwrap_or_else(|| json!({}));
        let params: InitializeParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(err) => return error_response(&req.id, INVALID_PARAMS, &err.to_string()),
        };

        // echo the client's version when we speak it, else offer the latest
        let mut protocol_version = LATEST_PROTOCOL_VERSION.to_string();
        if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            protocol_version = params.protocol_version;
        }

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        };

        success_response(&req.id, json!(result))
    }

    async fn list_tools(&self, req: &JsonRpcRequest) -> Value {
        match self.svc.list_tools(&self.ctx).await {
            Ok(tools) => {
                let result = ListToolsResult {
                    tools,
                    next_cursor: None,
                };

                success_response(&req.id, json!(result))
            }
            Err(err) => error_response(&req.id, INTERNAL_ERROR, &err.to_string()),
        }
    }

    async fn call_tool(&self, req: &JsonRpcRequest) -> Value {
        let params = req.params.clone().unwrap_or(Value::Null);
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(err) => return error_response(&req.id, INVALID_PARAMS, &err.to_string()),
        };

        let call = CallToolRequest {
            method: req.method.clone(),
            params,
        };

        match self.svc.forward(&self.ctx, call).await {
            Ok(result) => success_response(&req.id, json!(result)),
            Err(err) => error_response(&req.id, INTERNAL_ERROR, &err.to_string()),
        }
    }
}

fn ping(req: &JsonRpcRequest) -> Value {
    success_response(&req.id, json!({}))
}

fn success_response(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

fn error_response(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    })
}
