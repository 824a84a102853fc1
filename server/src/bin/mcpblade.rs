use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mcpblade_core::vector::LocalVectorStore;
use mcpblade_core::{Config, McpServerConfig, RequestContext, Service, TransportKind};
use mcpblade_server::{stdio, McpFacade};

#[derive(Parser, Debug)]
#[command(name = "mcpblade", about = "MCPBlade MCP server", version)]
struct Args {
    /// Directory holding config.yaml and vector data (default: ~/.mcpblade)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Attach a dedicated temporary backend and scope this session to it
    #[arg(long)]
    server_id: Option<String>,

    /// Command line for the dedicated backend (requires --server-id)
    #[arg(long)]
    cmd: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The protocol owns stdout; logs go to stderr.
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let path = match args.path {
        Some(path) => path,
        None => {
            let home = std::env::var("HOME").map_err(|_| "cannot resolve home directory")?;
            PathBuf::from(home).join(".mcpblade")
        }
    };

    let mut config = Config::load(path.join("config.yaml"))?;
    config.vector.path = path.join("vectors");

    let mut builder = Service::builder(config.clone());
    if config.vector.enabled {
        builder = builder.vector_store(Arc::new(LocalVectorStore::new(&config.vector)?));
    }

    let svc = builder.start().await?;

    let mut ctx = RequestContext::default();

    if let Some(server_id) = &args.server_id {
        let cmd = args
            .cmd
            .as_deref()
            .ok_or("server-id specified but no command provided")?;

        let mut parts = cmd.split_whitespace();
        let command = parts.next().ok_or("no command provided for MCP server")?;

        let backend = McpServerConfig {
            transport: TransportKind::Stdio,
            command: command.to_string(),
            arguments: parts.map(str::to_string).collect(),
            ..Default::default()
        };

        svc.register_mcp_server(server_id, backend).await?;
        ctx = RequestContext::with_server(server_id.clone());
    }

    let facade = McpFacade::with_context(Arc::clone(&svc), ctx);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        }
    });

    let served = stdio::serve(&facade, shutdown).await;

    if let Some(server_id) = &args.server_id {
        let _ = svc.unregister_mcp_server(server_id, false).await;
    }

    svc.close().await;
    tracing::info!(target: "mcpblade_server", "graceful shutdown");

    served.map_err(Into::into)
}
