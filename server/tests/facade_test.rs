/// Facade end-to-end: JSON-RPC in, aggregated tool surface out.
use async_trait::async_trait;
use mcpblade_core::mcp::*;
use mcpblade_core::{Config, McpServerConfig, Service};
use mcpblade_server::McpFacade;
use serde_json::{json, Value};

struct TimeBackend;

#[async_trait]
impl BackendClient for TimeBackend {
    async fn start(&self) -> Result<(), McpError> {
        Ok(())
    }

    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult, McpError> {
        Ok(InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: Default::default(),
            server_info: Implementation {
                name: "time".to_string(),
                version: "0.0.0".to_string(),
            },
            instructions: None,
        })
    }

    async fn ping(&self) -> Result<(), McpError> {
        Ok(())
    }

    async fn list_tools(&self, _: Option<String>) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: vec![Tool {
                name: "get_current_time".to_string(),
                description: Some("Get the current time".to_string()),
                input_schema: json!({"type": "object"}),
                annotations: None,
            }],
            next_cursor: None,
        })
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult {
            content: vec![Content::Text {
                text: json!({
                    "tool": params.name,
                    "arguments": params.arguments.unwrap_or(json!({})),
                })
                .to_string(),
            }],
            is_error: false,
        })
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

async fn facade() -> McpFacade {
    let svc = Service::builder(Config::default())
        .backend("time", McpServerConfig::default(), Box::new(TimeBackend))
        .start()
        .await
        .unwrap();

    McpFacade::new(svc)
}

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: json!(id),
        method: method.to_string(),
        params: Some(params),
    }
}

#[tokio::test]
async fn test_tools_list_returns_aggregated_surface() {
    let facade = facade().await;

    let response = facade
        .handle(request(1, "tools/list", json!({})))
        .await
        .unwrap();

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], json!(1));

    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "get_current_time");
    assert_eq!(
        tools[0]["description"],
        "Get the current time (provided by time)"
    );
}

#[tokio::test]
async fn test_tools_call_routes_to_backend() {
    let facade = facade().await;

    let response = facade
        .handle(request(
            2,
            "tools/call",
            json!({
                "name": "get_current_time",
                "arguments": {"timezone": "Asia/Taipei"}
            }),
        ))
        .await
        .unwrap();

    assert!(response.get("error").is_none());

    let content = &response["result"]["content"][0];
    assert_eq!(content["type"], "text");

    let echoed: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
    assert_eq!(echoed["tool"], "get_current_time");
    assert_eq!(echoed["arguments"]["timezone"], "Asia/Taipei");
}

#[tokio::test]
async fn test_tools_call_unknown_tool_is_internal_error() {
    let facade = facade().await;

    let response = facade
        .handle(request(3, "tools/call", json!({"name": "no_such_tool"})))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], json!(INTERNAL_ERROR));
    assert_eq!(response["error"]["message"], "tool not found");
}

#[tokio::test]
async fn test_full_handshake_sequence() {
    let facade = facade().await;

    let init = facade
        .handle(request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "client", "version": "1.0.0"}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");

    let ping = facade.handle(request(2, "ping", json!({}))).await.unwrap();
    assert_eq!(ping["result"], json!({}));

    let list = facade
        .handle(request(3, "tools/list", json!({})))
        .await
        .unwrap();
    assert!(list["result"]["tools"].as_array().unwrap().len() > 0);
}
