/// Per-backend runtime state
use crate::config::McpServerConfig;
use crate::mcp::BackendClient;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A registered backend: immutable identity plus a heartbeat timestamp.
///
/// The heartbeat is advisory; it is read and written without a lock by the
/// health supervisor and whoever successfully talks to the backend.
pub struct McpServerInstance {
    pub id: String,
    pub config: McpServerConfig,
    pub client: Box<dyn BackendClient>,

    /// Nanoseconds since the Unix epoch; zero until the first beat
    heartbeat: AtomicU64,
}

impl McpServerInstance {
    pub fn new(id: String, config: McpServerConfig, client: Box<dyn BackendClient>) -> Self {
        Self {
            id,
            config,
            client,
            heartbeat: AtomicU64::new(0),
        }
    }

    /// Record a successful interaction with the backend.
    pub fn beat(&self) {
        self.heartbeat.store(now_ns(), Ordering::SeqCst);
    }

    /// Whether the last heartbeat is within the configured TTL.
    /// A zero TTL never expires; an instance that has never beaten is dead.
    pub fn is_alive(&self) -> bool {
        let last_beat = self.heartbeat.load(Ordering::SeqCst);
        if last_beat == 0 {
            return false;
        }

        if self.config.ttl.is_zero() {
            return true;
        }

        now_ns().saturating_sub(last_beat) < self.config.ttl.as_nanos() as u64
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}
