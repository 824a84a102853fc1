/// Model Context Protocol (MCP) client layer
///
/// MCP Protocol Spec: https://spec.modelcontextprotocol.io/specification/
///
/// Architecture:
/// - `types`: MCP protocol types (JSON-RPC 2.0 based)
/// - `client`: `BackendClient` trait + stdio transport
/// - `sse`: SSE transport
/// - `http`: streamable-HTTP transport
/// - `factory`: transport dispatch + initialize handshake
pub mod client;
pub mod factory;
pub mod http;
pub mod sse;
pub mod types;

pub use client::{BackendClient, StdioClient, REQUEST_TIMEOUT};
pub use factory::connect;
pub use http::StreamableHttpClient;
pub use sse::SseClient;
pub use types::{
    CallToolParams, CallToolRequest, CallToolResult, Content, Implementation, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsParams, ListToolsResult, McpError, ServerCapabilities, Tool, ToolAnnotations,
    ToolsCapability, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    LATEST_PROTOCOL_VERSION, METHOD_NOT_FOUND, PARSE_ERROR, SUPPORTED_PROTOCOL_VERSIONS,
};
