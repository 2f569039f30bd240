//! `pl-client`: resilient client for a server-pushed event stream.
//!
//! The client holds one long-lived `GET` stream open against the push
//! server, parses its text frames, and hands subscribers a de-duplicated,
//! in-order feed of events plus connection lifecycle notifications.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ StreamClient (façade)                                       │
//! │   connect() / disconnect() / connection_state() / subscribe │
//! │                                                             │
//! │   supervise loop ── ReconnectController (state machine)     │
//! │        │                 Idle → Connecting → Connected      │
//! │        ▼                        ↖ Retrying ↙                │
//! │   Session ── Transport::open ── bytes                       │
//! │        │                          │                         │
//! │        │                    FrameParser                     │
//! │        │                    ╱         ╲                     │
//! │  HeartbeatMonitor ◀── liveness     event ──▶ DedupWindow    │
//! │                                                 │           │
//! │                                       queued per subscriber │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one session is active per client.
//! - Any session ending (server close, transport error, heartbeat
//!   timeout) leads to exactly one reconnect, after an exponential back-off
//!   that resets once a connection succeeds.
//! - An event id is delivered at most once per dedup window.
//! - Every subscriber sees every event in order; a slow subscriber neither
//!   loses events nor stalls the stream.
//! - After `disconnect()` nothing from the stopped run reaches subscribers.
//! - No error crosses the subscription boundary; failures surface only as
//!   [`ConnectionState::last_error`] and [`ClientEvent::Disconnected`].

pub mod builder;
pub mod client;
pub mod config;
pub mod dedup;
pub mod heartbeat;
pub mod reconnect;
mod session;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::StreamClientBuilder;
pub use client::{StreamClient, Subscription};
pub use config::{ClientConfig, ReconnectConfig};
pub use reconnect::ReconnectBackoff;
pub use transport::{ByteStream, HttpTransport, StreamRequest, Transport};
pub use types::{ClientError, ClientEvent, ConnectionState, LinkPhase, TransportError};

// Re-export protocol types so applications never need to import pl-protocol directly.
pub use pl_protocol::{Event, EventKind};
