//! One connection attempt, from request to teardown.
//!
//! A session opens the stream, arms the heartbeat watchdog, and pumps chunks
//! through a fresh [`FrameParser`] until the stream ends, fails, times out
//! or goes silent.  All four endings are reported the same way; the caller
//! decides what happens next.  Parsed frames go to a [`SessionObserver`],
//! which owns dedup and delivery.

use std::fmt;
use std::time::Duration;

use futures_util::StreamExt;
use pl_protocol::{Event, Frame, FrameParser};
use tokio::time::Instant;

use crate::heartbeat::HeartbeatMonitor;
use crate::transport::{StreamRequest, Transport};
use crate::types::TransportError;

/// Per-session knobs, fixed at client construction.
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub liveness_event: String,
    pub heartbeat_timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_frame_bytes: usize,
}

/// Receives what a session produces.
pub(crate) trait SessionObserver: Send + Sync {
    /// The stream is open.
    fn on_open(&self);
    fn on_liveness(&self);
    fn on_event(&self, event: Event);
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The stream never opened.
    Refused(TransportError),
    /// The server ended the body.
    Closed,
    /// Read error or idle timeout after the stream opened.
    Failed(TransportError),
    /// No liveness frame within the heartbeat timeout.
    LivenessTimeout(Duration),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Refused(e) => write!(f, "connection failed: {e}"),
            SessionEnd::Closed => f.write_str("stream closed by server"),
            SessionEnd::Failed(e) => write!(f, "stream failed: {e}"),
            SessionEnd::LivenessTimeout(timeout) => {
                write!(f, "no heartbeat within {}ms", timeout.as_millis())
            }
        }
    }
}

pub(crate) async fn run_session<O>(
    transport: &dyn Transport,
    settings: &SessionSettings,
    request: StreamRequest,
    observer: &O,
) -> SessionEnd
where
    O: SessionObserver + ?Sized,
{
    tracing::info!(
        url = %request.url,
        last_event_id = ?request.last_event_id,
        "opening event stream"
    );

    let mut stream =
        match tokio::time::timeout(settings.connect_timeout, transport.open(&request)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return SessionEnd::Refused(e),
            Err(_) => {
                return SessionEnd::Refused(TransportError::Timeout(format!(
                    "no response within {}ms",
                    settings.connect_timeout.as_millis()
                )))
            }
        };

    observer.on_open();

    let mut parser = FrameParser::new(settings.liveness_event.clone())
        .with_max_frame_bytes(settings.max_frame_bytes);
    let mut heartbeat = HeartbeatMonitor::new(settings.heartbeat_timeout);
    heartbeat.arm();

    // Data already received is processed before the deadline is judged.
    let end = loop {
        tokio::select! {
            biased;

            next = tokio::time::timeout(settings.read_timeout, stream.next()) => match next {
                Err(_) => {
                    break SessionEnd::Failed(TransportError::Timeout(format!(
                        "no data within {}ms",
                        settings.read_timeout.as_millis()
                    )));
                }
                Ok(None) => break SessionEnd::Closed,
                Ok(Some(Err(e))) => break SessionEnd::Failed(e),
                Ok(Some(Ok(chunk))) => {
                    for frame in parser.push(&chunk) {
                        match frame {
                            Frame::Liveness => {
                                heartbeat.on_liveness_signal();
                                observer.on_liveness();
                            }
                            Frame::Event(event) => observer.on_event(event),
                        }
                    }
                    // A steady flow of chunks must not starve the watchdog.
                    if heartbeat.is_expired(Instant::now()) {
                        break SessionEnd::LivenessTimeout(heartbeat.timeout());
                    }
                }
            },
            _ = heartbeat.expired() => {
                break SessionEnd::LivenessTimeout(heartbeat.timeout());
            }
        }
    };

    heartbeat.disarm();
    if parser.finish() {
        tracing::debug!("discarded incomplete trailing frame");
    }
    if parser.dropped() > 0 {
        tracing::info!(dropped = parser.dropped(), "session dropped malformed frames");
    }

    end
}
