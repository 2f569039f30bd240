//! Liveness watchdog for one session.
//!
//! The monitor holds a single deadline.  Each liveness frame pushes it out by
//! `timeout`; [`HeartbeatMonitor::expired`] resolves once the deadline
//! passes.  The monitor lives inside the session that armed it, so tearing
//! the session down drops the timer with it.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start the watchdog.  Called once, when the session reaches the
    /// connected state.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Reset the deadline.  Ignored while disarmed.
    pub fn on_liveness_signal(&mut self) -> bool {
        if self.deadline.is_none() {
            return false;
        }
        self.arm();
        true
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed at `now`.  Never true while disarmed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Resolves when the deadline passes.  Pends forever while disarmed.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout_without_signal() {
        let mut hb = HeartbeatMonitor::new(TIMEOUT);
        hb.arm();
        let start = Instant::now();
        hb.expired().await;
        assert_eq!(start.elapsed(), TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_pushes_deadline_out() {
        let mut hb = HeartbeatMonitor::new(TIMEOUT);
        hb.arm();
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            assert!(hb.on_liveness_signal());
        }
        // 100s have passed without firing; the next 29s still do not fire.
        let early = tokio::time::timeout(Duration::from_secs(29), hb.expired()).await;
        assert!(early.is_err());
        hb.expired().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_monitor_never_fires() {
        let mut hb = HeartbeatMonitor::new(TIMEOUT);
        hb.arm();
        hb.disarm();
        assert!(!hb.is_armed());
        let fired = tokio::time::timeout(TIMEOUT * 10, hb.expired()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_check_matches_deadline() {
        let mut hb = HeartbeatMonitor::new(TIMEOUT);
        let now = Instant::now();
        assert!(!hb.is_expired(now + TIMEOUT * 2));
        hb.arm();
        assert!(!hb.is_expired(now + TIMEOUT - Duration::from_millis(1)));
        assert!(hb.is_expired(now + TIMEOUT));
    }

    #[test]
    fn signal_before_arming_is_ignored() {
        let mut hb = HeartbeatMonitor::new(TIMEOUT);
        assert!(!hb.on_liveness_signal());
        assert!(hb.deadline().is_none());
    }
}
