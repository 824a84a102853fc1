/// Service configuration
///
/// Loaded from a YAML file (`config.yaml`); backend configs also travel in
/// JSON wire form through the register RPC, so one serde shape serves both.
use crate::vector;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persistent backends, registered once at startup
    #[serde(rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,

    /// Health supervisor interval (historical name; it only paces pings)
    #[serde(rename = "cacheRefreshTTL", with = "duration_string")]
    pub cache_refresh_ttl: Duration,

    pub vector: vector::Config,
}

impl Config {
    /// Read and parse a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(Error::from)
    }
}

/// How a single backend MCP server is reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub transport: TransportKind,

    /// Executable for stdio backends
    pub command: String,

    /// Endpoint for sse / streamable-http backends
    pub url: String,

    #[serde(rename = "args")]
    pub arguments: Vec<String>,

    /// `KEY=VALUE` pairs passed to stdio backends
    #[serde(rename = "env")]
    pub environment: Vec<String>,

    #[serde(rename = "restart")]
    pub restart_policy: RestartPolicy,

    /// Heartbeat expiry horizon; zero means no expiry
    #[serde(with = "duration_string")]
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
    /// Transport-to-engine concern; never spawned by the factory
    Nats,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Stdio
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Always,
    OnFailure,
    Never,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Never
    }
}

/// Serde adapter for human duration strings ("30s", "5m", "1h30m", "0").
pub mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(raw: &str) -> Result<Duration, String> {
        let raw = raw.trim();
        if raw == "0" {
            return Ok(Duration::ZERO);
        }
        if raw.is_empty() {
            return Err("empty duration".to_string());
        }

        let mut total = Duration::ZERO;
        let mut rest = raw;

        while !rest.is_empty() {
            let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits == 0 {
                return Err(format!("invalid duration {raw:?}"));
            }

            let value: u64 = rest[..digits]
                .parse()
                .map_err(|_| format!("invalid duration {raw:?}"))?;
            rest = &rest[digits..];

            let (unit, len) = if rest.starts_with("ms") {
                (Duration::from_millis(1), 2)
            } else if rest.starts_with('h') {
                (Duration::from_secs(3600), 1)
            } else if rest.starts_with('m') {
                (Duration::from_secs(60), 1)
            } else if rest.starts_with('s') {
                (Duration::from_secs(1), 1)
            } else {
                return Err(format!("invalid duration unit in {raw:?}"));
            };

            total += unit * value as u32;
            rest = &rest[len..];
        }

        Ok(total)
    }

    pub fn format_duration(value: Duration) -> String {
        if value.is_zero() {
            return "0".to_string();
        }

        let millis = value.as_millis();
        let mut out = String::new();

        let hours = millis / 3_600_000;
        let minutes = millis % 3_600_000 / 60_000;
        let seconds = millis % 60_000 / 1000;
        let remainder = millis % 1000;

        if hours > 0 {
            out.push_str(&format!("{hours}h"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}m"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}s"));
        }
        if remainder > 0 {
            out.push_str(&format!("{remainder}ms"));
        }

        out
    }
}
