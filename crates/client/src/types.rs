//! Public value types: errors, connection state snapshots, emitted events.

use chrono::{DateTime, Utc};
use pl_protocol::Event;
use serde::Serialize;

/// Failure to open or keep reading the event stream.
///
/// Every variant is retried by the reconnect loop; none is fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("read: {0}")]
    Read(String),
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Top-level client error.  Only construction can fail.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("config: {0}")]
    Config(String),
}

/// Where the reconnect state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    /// Not started, or stopped by `disconnect()`.
    #[default]
    Idle,
    /// A session is opening the stream.
    Connecting,
    /// The stream is open and the heartbeat watchdog is armed.
    Connected,
    /// Waiting out the back-off delay before the next attempt.
    Retrying,
}

/// Snapshot of the client's connection.
///
/// Returned by value; mutating it has no effect on the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub phase: LinkPhase,
    pub last_liveness_at: Option<DateTime<Utc>>,
    /// Reconnect cycles since the last successful connection.
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    /// Most recent server id accepted in this run.
    pub last_event_id: Option<String>,
    pub events_delivered: u64,
    pub duplicates_suppressed: u64,
}

/// What subscribers receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A de-duplicated application event.
    Event(Event),
    /// The stream was (re)established.
    Connected,
    /// The stream was lost or closed.  Reconnection follows unless the
    /// client was stopped.
    Disconnected { reason: String },
}
