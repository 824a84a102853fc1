/// Backend-client factory
///
/// Turns a backend configuration into a started, initialized client.
use super::client::{BackendClient, StdioClient};
use super::http::StreamableHttpClient;
use super::sse::SseClient;
use super::types::{Implementation, InitializeParams, LATEST_PROTOCOL_VERSION};
use crate::config::{McpServerConfig, TransportKind};
use crate::{Error, Result};
use tracing::{debug, error};

const CLIENT_NAME: &str = "mcpblade";
const CLIENT_VERSION: &str = "1.0.0";

/// Construct, start and initialize a client for the given backend.
///
/// On initialize failure the half-open client is closed before the error is
/// returned, so callers never hold a dangling transport.
pub async fn connect(config: &McpServerConfig) -> Result<Box<dyn BackendClient>> {
    let client: Box<dyn BackendClient> = match config.transport {
        TransportKind::Stdio => Box::new(StdioClient::new(
            config.command.clone(),
            config.arguments.clone(),
            config.environment.clone(),
        )),
        TransportKind::Sse => Box::new(SseClient::new(&config.url)?),
        TransportKind::StreamableHttp => Box::new(StreamableHttpClient::new(&config.url)?),
        TransportKind::Nats => return Err(Error::UnsupportedTransport),
    };

    client.start().await?;

    let params = InitializeParams {
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
        capabilities: Default::default(),
        client_info: Implementation {
            name: CLIENT_NAME.to_string(),
            version: CLIENT_VERSION.to_string(),
        },
    };

    match client.initialize(params).await {
        Ok(result) => {
            debug!(
                target: "mcp_client",
                server_name = %result.server_info.name,
                server_version = %result.server_info.version,
                protocol_version = %result.protocol_version,
                "backend initialized"
            );
            Ok(client)
        }
        Err(err) => {
            error!(target: "mcp_client", error = %err, "initialize failed, closing client");
            let _ = client.close().await;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdio_config(command: &str) -> McpServerConfig {
        McpServerConfig {
            transport: TransportKind::Stdio,
            command: command.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_nats_transport_rejected() {
        let config = McpServerConfig {
            transport: TransportKind::Nats,
            ..Default::default()
        };

        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransport));
    }

    #[tokio::test]
    async fn test_spawn_failure_propagates() {
        let config = stdio_config("/nonexistent/mcp-server-binary");

        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Mcp(_)));
    }
}
