//! Stream protocol: the text frame format pushed by the notification server
//! and the typed event records extracted from it.
//!
//! Frames are blocks of `field: value` lines terminated by a blank line:
//!
//! ```text
//! event: invoice.paid
//! id: 8812
//! data: {"invoice":"INV-42","amount":1200}
//!
//! event: heartbeat
//! data: {}
//!
//! ```
//!
//! Only the `event`, `data` and `id` fields carry meaning.  One distinguished
//! event name marks a liveness signal; every other frame becomes an [`Event`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod frame;

pub use frame::{FrameError, FrameParser};

/// Event name the server uses for liveness frames unless configured otherwise.
pub const DEFAULT_LIVENESS_EVENT: &str = "heartbeat";

/// Event name reported for frames that carry no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Upper bound for a single frame (all of its lines) unless configured otherwise.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Kind of an application event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Frame had no `event:` field.
    Message,
    /// Frame carried an explicit event name.
    Named(String),
}

impl EventKind {
    /// Classify a raw `event:` field value.
    pub fn from_field(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => EventKind::Message,
            Some(name) if name == DEFAULT_EVENT_NAME => EventKind::Message,
            Some(name) => EventKind::Named(name.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Message => DEFAULT_EVENT_NAME,
            EventKind::Named(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        EventKind::from_field(Some(&value))
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Message => DEFAULT_EVENT_NAME.to_owned(),
            EventKind::Named(name) => name,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application event decoded from one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned id, or a locally generated one when the frame had none.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "timestamp")]
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// `true` when `id` was generated locally.  Such events bypass dedup.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic_id: bool,
}

impl Event {
    /// The server id, if the server supplied one.
    pub fn server_id(&self) -> Option<&str> {
        (!self.synthetic_id).then_some(self.id.as_str())
    }
}

/// One complete frame, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Liveness signal.  Never surfaced to subscribers.
    Liveness,
    /// Application event.
    Event(Event),
}
