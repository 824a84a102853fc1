/// Stdio serve loop
///
/// Line-delimited JSON-RPC on stdin/stdout: the framing MCP clients expect
/// from a child server. Blank lines, undecodable lines and id-less requests
/// are skipped; the loop ends on EOF or cancellation.
use crate::McpFacade;
use mcpblade_core::mcp::JsonRpcRequest;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub async fn serve(facade: &McpFacade, shutdown: CancellationToken) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(target: "mcpblade_server", "stdio loop cancelled");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!(target: "mcpblade_server", "stdin closed");
                    return Ok(());
                };

                if line.trim().is_empty() {
                    continue;
                }

                let request: JsonRpcRequest = match serde_json::from_str(&line) {
                    Ok(request) => request,
                    Err(err) => {
                        warn!(target: "mcpblade_server", error = %err, "skipping undecodable line");
                        continue;
                    }
                };

                let Some(response) = facade.handle(request).await else {
                    continue;
                };

                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
        }
    }
}
