// MCPBlade Core Library
// Edge-resident aggregator for Model Context Protocol servers

pub mod config;
pub mod document;
pub mod endpoint;
pub mod instance;
pub mod mcp;
pub mod service;
pub mod vector;

// Export core types
pub use config::{Config, McpServerConfig, RestartPolicy, TransportKind};
pub use document::tool_to_document;
pub use endpoint::{Endpoints, RegisterMcpServerRequest, SearchToolsRequest};
pub use instance::McpServerInstance;
pub use mcp::{BackendClient, CallToolRequest, CallToolResult, Tool};
pub use service::{Service, ServiceBuilder};

use thiserror::Error;

/// Well-known header key transports use to carry the session-scoped server id
pub const SERVER_ID_HEADER: &str = "server_id";

/// Per-request metadata crossing the engine boundary.
///
/// A set `server_id` selects temporary-pool routing and bypasses the
/// aggregated cache and routing table entirely.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub server_id: Option<String>,
}

impl RequestContext {
    pub fn with_server(server_id: impl Into<String>) -> Self {
        Self {
            server_id: Some(server_id.into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported transport type")]
    UnsupportedTransport,

    #[error("invalid server ID")]
    InvalidServerId,

    #[error("server already exists")]
    ServerAlreadyExists,

    #[error("server not found")]
    ServerNotFound,

    #[error("no tools found")]
    NoToolsFound,

    #[error("tool not found")]
    ToolNotFound,

    #[error("vector database not set")]
    VectorDbNotSet,

    #[error("invalid tool document")]
    InvalidToolDocument,

    #[error("removal of persistent servers is not supported")]
    UnsupportedPersistentServerRemoval,

    #[error("persistent registration is not supported")]
    UnsupportedPersistentRegistration,

    #[error("client error: {0}")]
    Mcp(#[from] mcp::McpError),

    #[error("vector store error: {0}")]
    Vector(#[from] vector::VectorError),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
