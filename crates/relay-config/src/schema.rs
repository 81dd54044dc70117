// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Top-level configuration for the relay server.
///
/// Deserialised from a deep-merge of every discovered YAML layer (see
/// [`crate::load`]), then selectively overridden by environment variables
/// for secret-bearing fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sanitize: SanitizeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Named MCP server connections, keyed by a short identifier used in
    /// logs and in the tool-name namespace.
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Tool names that must never be exposed to the model even when an MCP
    /// server advertises them (§4.3).
    #[serde(default = "default_blocklist")]
    pub tool_blocklist: Vec<String>,
}

fn default_blocklist() -> Vec<String> {
    vec![
        "Bash".into(),
        "Read".into(),
        "Write".into(),
        "Edit".into(),
        "Task".into(),
        "WebFetch".into(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP/WS listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Overridden by the LOG_LEVEL environment variable at load time.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Owning user id for the single shared namespace.
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
    /// Bearer token every HTTP/WS request must present. `None` disables
    /// auth entirely (local development). Set via `RELAY_AUTH_TOKEN`,
    /// never via a YAML layer.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}
fn default_user_id() -> String {
    "web_user".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            log_level: default_log_level(),
            default_user_id: default_user_id(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string. Overridden piecewise by POSTGRES_* env vars.
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Schema holding chat history tables.
    #[serde(default = "default_chat_schema")]
    pub chat_history_schema: String,
    #[serde(default = "default_pool_min")]
    pub pool_min: u32,
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
}

fn default_db_url() -> String {
    "postgres://localhost/relay".into()
}
fn default_chat_schema() -> String {
    "relay_chathistory".into()
}
fn default_pool_min() -> u32 {
    1
}
fn default_pool_max() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            chat_history_schema: default_chat_schema(),
            pool_min: default_pool_min(),
            pool_max: default_pool_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_qdrant_collection")]
    pub collection: String,
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".into()
}
fn default_qdrant_collection() -> String {
    "relay_memory".into()
}
fn default_vector_dim() -> usize {
    768
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection: default_qdrant_collection(),
            vector_dim: default_vector_dim(),
        }
    }
}

/// Model selection forwarded to the Agent Runtime Adapter (`relay-runtime`).
/// The concrete LLM API is an external collaborator; this struct
/// only carries the names the adapter needs to hand to that collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Overridden by RELAY_MAIN_MODEL.
    #[serde(default = "default_main_model")]
    pub main_model: String,
    /// Overridden by RELAY_SUB_MODEL.
    #[serde(default = "default_sub_model")]
    pub sub_model: String,
}

fn default_main_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_sub_model() -> String {
    "gemini-2.0-flash-lite".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            main_model: default_main_model(),
            sub_model: default_sub_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timezone used when a reminder's `remind_at` is naive.
    #[serde(default = "default_true")]
    pub naive_as_utc: bool,
    /// Synthetic session id used when a scheduled task fires with no WS
    /// clients connected.
    #[serde(default = "default_offline_session")]
    pub offline_session_id: String,
}

fn default_offline_session() -> String {
    "scheduler-offline".into()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            naive_as_utc: true,
            offline_session_id: default_offline_session(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeConfig {
    /// Maximum length, in characters, retained by `sanitize()`.
    #[serde(default = "default_sanitize_budget")]
    pub max_len: usize,
}

fn default_sanitize_budget() -> usize {
    16_384
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            max_len: default_sanitize_budget(),
        }
    }
}

/// Per-model-prefix pricing table for the telemetry accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per 1M uncached prompt tokens.
    pub input_price: f64,
    /// USD per 1M cached prompt tokens.
    pub cached_price: f64,
    /// USD per 1M output tokens.
    pub output_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Keyed by model-name prefix; resolved by longest-prefix match.
    /// A `_default` entry is used on miss.
    #[serde(default = "default_pricing_table")]
    pub pricing: HashMap<String, ModelPricing>,
}

fn default_pricing_table() -> HashMap<String, ModelPricing> {
    let mut m = HashMap::new();
    m.insert(
        "_default".to_string(),
        ModelPricing {
            input_price: 0.0,
            cached_price: 0.0,
            output_price: 0.0,
        },
    );
    m.insert(
        "gemini-2.0-flash".to_string(),
        ModelPricing {
            input_price: 0.10,
            cached_price: 0.025,
            output_price: 0.40,
        },
    );
    m
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            pricing: default_pricing_table(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Base URL of an ntfy-compatible push endpoint, e.g. `https://ntfy.sh/mytopic`.
    pub ntfy_url: Option<String>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { ntfy_url: None }
    }
}

/// How a single MCP server is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpServerConfig {
    Sse {
        url: String,
        #[serde(default)]
        auth: McpAuthConfig,
        /// Milliseconds to wait after `initialize` before the first request.
        #[serde(default)]
        post_init_delay_ms: Option<u64>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpAuthConfig {
    pub bearer_token: Option<String>,
    pub basic_user: Option<String>,
    pub basic_password: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_bind_addr() {
        let c = Config::default();
        assert_eq!(c.server.bind_addr, "0.0.0.0");
        assert_eq!(c.server.port, 8080);
    }

    #[test]
    fn default_tool_blocklist_contains_bash() {
        let c = Config::default();
        assert!(c.tool_blocklist.iter().any(|t| t == "Bash"));
    }

    #[test]
    fn default_pricing_has_fallback_entry() {
        let c = Config::default();
        assert!(c.telemetry.pricing.contains_key("_default"));
    }

    #[test]
    fn mcp_server_config_sse_round_trips() {
        let yaml = "transport: sse\nurl: http://localhost:9000/sse\n";
        let cfg: McpServerConfig = serde_yaml::from_str(yaml).unwrap();
        match cfg {
            McpServerConfig::Sse { url, .. } => assert_eq!(url, "http://localhost:9000/sse"),
            _ => panic!("expected Sse variant"),
        }
    }

    #[test]
    fn mcp_server_config_stdio_round_trips() {
        let yaml = "transport: stdio\ncommand: mcp-server-fs\nargs: [\"--root\", \".\"]\n";
        let cfg: McpServerConfig = serde_yaml::from_str(yaml).unwrap();
        match cfg {
            McpServerConfig::Stdio { command, args, .. } => {
                assert_eq!(command, "mcp-server-fs");
                assert_eq!(args, vec!["--root", "."]);
            }
            _ => panic!("expected Stdio variant"),
        }
    }

    #[test]
    fn database_defaults_match_pool_bounds_from_spec() {
        let c = DatabaseConfig::default();
        assert_eq!(c.pool_min, 1);
        assert_eq!(c.pool_max, 5);
    }
}
