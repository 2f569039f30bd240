use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectBackoff;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serializable client configuration.
///
/// The client itself never reads files or the environment; the embedding
/// application deserializes this (e.g. from TOML) and hands it to
/// [`StreamClientBuilder::from_config`](crate::StreamClientBuilder::from_config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base address, e.g. `https://push.example.com`.
    #[serde(default)]
    pub base_url: String,
    /// Path between the base address and the identity token.
    #[serde(default = "d_stream_path")]
    pub stream_path: String,
    /// Identity token placed in the last path segment.
    #[serde(default)]
    pub token: String,
    /// Secondary identity sent as a query parameter.
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "d_client_id_param")]
    pub client_id_param: String,
    /// `event:` name the server uses for liveness frames.
    #[serde(default = "d_liveness_event")]
    pub liveness_event: String,
    #[serde(default = "d_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "d_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Longest gap between two body chunks before the stream counts as failed.
    #[serde(default = "d_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "d_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Defaults to `dedup_window_ms`.
    #[serde(default)]
    pub dedup_sweep_interval_ms: Option<u64>,
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "d_true")]
    pub send_last_event_id: bool,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            stream_path: d_stream_path(),
            token: String::new(),
            client_id: String::new(),
            client_id_param: d_client_id_param(),
            liveness_event: d_liveness_event(),
            heartbeat_timeout_ms: d_heartbeat_timeout_ms(),
            connect_timeout_ms: d_connect_timeout_ms(),
            read_timeout_ms: d_read_timeout_ms(),
            dedup_window_ms: d_dedup_window_ms(),
            dedup_sweep_interval_ms: None,
            max_frame_bytes: d_max_frame_bytes(),
            send_last_event_id: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Back-off between reconnect attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "d_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "d_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: d_initial_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            backoff_factor: d_backoff_factor(),
        }
    }
}

impl From<&ReconnectConfig> for ReconnectBackoff {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            backoff_factor: cfg.backoff_factor,
        }
    }
}

fn d_stream_path() -> String {
    "stream".into()
}
fn d_client_id_param() -> String {
    "clientId".into()
}
fn d_liveness_event() -> String {
    pl_protocol::DEFAULT_LIVENESS_EVENT.into()
}
fn d_heartbeat_timeout_ms() -> u64 {
    45_000
}
fn d_connect_timeout_ms() -> u64 {
    10_000
}
fn d_read_timeout_ms() -> u64 {
    120_000
}
fn d_dedup_window_ms() -> u64 {
    300_000
}
fn d_max_frame_bytes() -> usize {
    pl_protocol::DEFAULT_MAX_FRAME_BYTES
}
fn d_true() -> bool {
    true
}
fn d_initial_delay_ms() -> u64 {
    1_000
}
fn d_max_delay_ms() -> u64 {
    30_000
}
fn d_backoff_factor() -> f64 {
    2.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
