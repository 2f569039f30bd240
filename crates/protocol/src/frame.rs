//! Incremental frame parser.
//!
//! The transport hands us arbitrary byte chunks.  [`FrameParser::push`]
//! buffers them, consumes every complete line, and returns the frames closed
//! by a blank line.  Anything after the last line terminator stays buffered
//! for the next call, so a line (or a UTF-8 sequence) split across chunks
//! parses exactly as if it had arrived in one piece.
//!
//! Malformed frames never abort parsing: they are dropped at the next blank
//! line, logged, and counted in [`FrameParser::dropped`].

use chrono::Utc;

use crate::{Event, EventKind, Frame, DEFAULT_LIVENESS_EVENT, DEFAULT_MAX_FRAME_BYTES};

/// Reasons a frame is dropped.
#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("frame exceeds {max} bytes ({bytes} buffered)")]
    Oversized { bytes: usize, max: usize },
    #[error("payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Fields collected for the frame currently being read.
#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    bytes: usize,
    seen_field: bool,
    error: Option<FrameError>,
}

impl PendingFrame {
    fn ingest(&mut self, line: &[u8], max_frame_bytes: usize) {
        if self.error.is_some() {
            return;
        }

        self.bytes += line.len();
        if self.bytes > max_frame_bytes {
            self.fail(FrameError::Oversized {
                bytes: self.bytes,
                max: max_frame_bytes,
            });
            return;
        }

        let Ok(line) = std::str::from_utf8(line) else {
            self.fail(FrameError::InvalidUtf8);
            return;
        };

        // Comment line.
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            // An id with control characters could never be echoed back in
            // `Last-Event-ID`; the field is ignored.
            "id" if value.chars().any(char::is_control) => {
                tracing::debug!(id = ?value, "ignoring id with control characters");
            }
            "id" => self.id = Some(value.to_owned()),
            _ => return,
        }
        self.seen_field = true;
    }

    fn fail(&mut self, error: FrameError) {
        // Keep the byte count so the oversize guard stays engaged; release the rest.
        self.data.clear();
        self.event = None;
        self.id = None;
        self.error = Some(error);
    }
}

/// Splits a byte stream into [`Frame`]s.
///
/// One parser belongs to one connection; it is discarded with it.
#[derive(Debug)]
pub struct FrameParser {
    liveness_event: String,
    max_frame_bytes: usize,
    buffer: Vec<u8>,
    pending: PendingFrame,
    /// The head of the current line was discarded by the size guard.
    skip_line: bool,
    dropped: u64,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_EVENT)
    }
}

impl FrameParser {
    /// Create a parser that classifies `event: <liveness_event>` frames as
    /// liveness signals.
    pub fn new(liveness_event: impl Into<String>) -> Self {
        Self {
            liveness_event: liveness_event.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            buffer: Vec::new(),
            pending: PendingFrame::default(),
            skip_line: false,
            dropped: 0,
        }
    }

    /// Override the per-frame size limit.
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max.max(1);
        self
    }

    /// Frames dropped as malformed so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes held for an incomplete trailing line.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let mut line = &self.buffer[consumed..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            consumed = end + 1;

            if self.skip_line {
                self.skip_line = false;
                continue;
            }

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
            } else {
                self.pending.ingest(line, self.max_frame_bytes);
            }
        }

        self.buffer.drain(..consumed);

        // An unterminated line must not grow without bound.  A lone `\r` may
        // still be the start of the blank line, so it is never discarded.
        // A trailing `\r` is not counted: `ingest` measures lines without it.
        let tail = match self.buffer.last() {
            Some(b'\r') => self.buffer.len() - 1,
            _ => self.buffer.len(),
        };
        let buffered = self.pending.bytes + tail;
        if self.buffer.len() > 1
            && (self.pending.error.is_some() || buffered > self.max_frame_bytes)
        {
            if self.pending.error.is_none() {
                self.pending.fail(FrameError::Oversized {
                    bytes: buffered,
                    max: self.max_frame_bytes,
                });
                self.pending.bytes = buffered;
            }
            self.buffer.clear();
            self.skip_line = true;
        }

        frames
    }

    /// Discard whatever incomplete frame is buffered.  Returns `true` if
    /// anything was discarded.
    pub fn finish(&mut self) -> bool {
        let had_partial = !self.buffer.is_empty()
            || self.pending.seen_field
            || self.pending.error.is_some();
        self.buffer.clear();
        self.pending = PendingFrame::default();
        self.skip_line = false;
        had_partial
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let pending = std::mem::take(&mut self.pending);

        if let Some(error) = pending.error {
            self.dropped += 1;
            tracing::warn!(error = %error, "dropping malformed frame");
            return None;
        }
        if !pending.seen_field {
            return None;
        }

        if pending.event.as_deref().map(str::trim) == Some(self.liveness_event.as_str()) {
            return Some(Frame::Liveness);
        }

        let data = pending.data.join("\n");
        if data.trim().is_empty() {
            tracing::trace!(event = ?pending.event, "discarding frame without data");
            return None;
        }

        let payload = match serde_json::from_str(&data) {
            Ok(value) => value,
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(
                    error = %FrameError::from(e),
                    event = ?pending.event,
                    id = ?pending.id,
                    "dropping frame with undecodable payload"
                );
                return None;
            }
        };

        let (id, synthetic_id) = match pending
            .id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty())
        {
            Some(id) => (id, false),
            None => (uuid::Uuid::new_v4().to_string(), true),
        };

        Some(Frame::Event(Event {
            id,
            kind: EventKind::from_field(pending.event.as_deref()),
            received_at: Utc::now(),
            payload,
            synthetic_id,
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
