//! Time-bounded set of recently seen event ids.
//!
//! Replays after a reconnect re-send events the subscriber already saw.
//! An id is accepted once per window; repeats inside the window are
//! rejected.  Expired entries are removed by [`DedupWindow::sweep`], which
//! the client runs on a fixed interval, so memory is bounded by the arrival
//! rate over roughly two windows rather than by uptime.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    /// id -> first time it was accepted.
    seen: HashMap<String, Instant>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if the event should be delivered.
    ///
    /// `None` ids (locally generated) are always accepted and never recorded.
    /// An id whose entry has outlived the window but not yet been swept is
    /// accepted again and re-recorded.
    pub fn should_accept(&mut self, id: Option<&str>, now: Instant) -> bool {
        let Some(id) = id else {
            return true;
        };

        match self.seen.get_mut(id) {
            Some(first_seen) if now.saturating_duration_since(*first_seen) < self.window => false,
            Some(first_seen) => {
                *first_seen = now;
                true
            }
            None => {
                self.seen.insert(id.to_owned(), now);
                true
            }
        }
    }

    /// Remove entries older than the window.  Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < window);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
