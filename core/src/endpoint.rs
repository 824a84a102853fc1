/// RPC boundary
///
/// Request DTOs and the operation set exposed to remote transports. The
/// transports themselves (message bus, HTTP) live outside this crate; they
/// decode their wire format into these types and call through `Endpoints`.
use crate::config::McpServerConfig;
use crate::mcp::{CallToolRequest, CallToolResult, Tool};
use crate::service::Service;
use crate::{Error, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMcpServerRequest {
    pub server_id: String,
    pub config: McpServerConfig,
    #[serde(default)]
    pub persistent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchToolsRequest {
    pub query: String,
    #[serde(default)]
    pub k: usize,
}

/// The engine's remote-facing operation set.
pub struct Endpoints {
    svc: Arc<Service>,
}

impl Endpoints {
    pub fn new(svc: Arc<Service>) -> Self {
        Self { svc }
    }

    /// Remote callers may only attach temporary backends.
    pub async fn register_mcp_server(&self, req: RegisterMcpServerRequest) -> Result<()> {
        if req.persistent {
            return Err(Error::UnsupportedPersistentRegistration);
        }

        self.svc.register_mcp_server(&req.server_id, req.config).await
    }

    pub async fn unregister_mcp_server(&self, server_id: &str) -> Result<()> {
        self.svc.unregister_mcp_server(server_id, false).await
    }

    pub async fn list_tools(&self, ctx: &RequestContext) -> Result<Vec<Tool>> {
        self.svc.list_tools(ctx).await
    }

    pub async fn search_tools(&self, req: SearchToolsRequest) -> Result<Vec<Tool>> {
        let k = (req.k > 0).then_some(req.k);
        self.svc.search_tools(&req.query, k).await
    }

    pub async fn forward(
        &self,
        ctx: &RequestContext,
        req: CallToolRequest,
    ) -> Result<CallToolResult> {
        self.svc.forward(ctx, req).await
    }
}
