//! Reconnect policy and the state machine that drives it.
//!
//! ```text
//!   Idle ──start──▶ Connecting ──on_connected──▶ Connected
//!    ▲                 │    ▲                        │
//!    │           session_ended  on_retry_due   session_ended
//!    │                 ▼    │                        │
//!    └──────stop────── Retrying ◀────────────────────┘
//! ```
//!
//! `stop` is accepted from every state.  Each transition method reports
//! whether it applied, so a late or duplicated signal (for instance a
//! heartbeat timeout racing a transport error) cannot schedule a second
//! reconnect.

use std::time::Duration;

use crate::types::LinkPhase;

/// Controls how the client backs off between reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.  Must be `>= 1.0`.
    pub backoff_factor: f64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectBackoff {
    /// Compute the delay for the given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = base_ms * self.backoff_factor.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

/// Mutable back-off position for one run of the client.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectBackoff,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectBackoff) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Delay the next failure will wait.
    pub fn current_delay(&self) -> Duration {
        self.policy.delay_for_attempt(self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consume the current delay and advance to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay();
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// The reconnect state machine.  Owns the back-off.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    phase: LinkPhase,
    backoff: Backoff,
}

impl ReconnectController {
    pub fn new(policy: ReconnectBackoff) -> Self {
        Self {
            phase: LinkPhase::Idle,
            backoff: Backoff::new(policy),
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn current_delay(&self) -> Duration {
        self.backoff.current_delay()
    }

    /// `Idle → Connecting`.  A no-op in every other phase.
    pub fn start(&mut self) -> bool {
        if self.phase != LinkPhase::Idle {
            return false;
        }
        self.backoff.reset();
        self.phase = LinkPhase::Connecting;
        true
    }

    /// `Connecting → Connected`.  Resets the back-off.
    pub fn on_connected(&mut self) -> bool {
        if self.phase != LinkPhase::Connecting {
            return false;
        }
        self.backoff.reset();
        self.phase = LinkPhase::Connected;
        true
    }

    /// `Connecting | Connected → Retrying`.  Returns the delay to wait
    /// before [`on_retry_due`](Self::on_retry_due), or `None` when the
    /// signal does not apply (stopped, or a retry is already scheduled).
    pub fn on_session_ended(&mut self) -> Option<Duration> {
        match self.phase {
            LinkPhase::Connecting | LinkPhase::Connected => {
                self.phase = LinkPhase::Retrying;
                Some(self.backoff.next_delay())
            }
            LinkPhase::Idle | LinkPhase::Retrying => None,
        }
    }

    /// `Retrying → Connecting`.
    pub fn on_retry_due(&mut self) -> bool {
        if self.phase != LinkPhase::Retrying {
            return false;
        }
        self.phase = LinkPhase::Connecting;
        true
    }

    /// Any phase `→ Idle`.  Returns `false` if already idle.
    pub fn stop(&mut self) -> bool {
        let was_running = self.phase != LinkPhase::Idle;
        self.phase = LinkPhase::Idle;
        was_running
    }
}
