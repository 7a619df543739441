//! Link-health watchdog
//!
//! RFM69 modules occasionally wedge and stop receiving without reporting an
//! error. The watchdog tracks the time since the last reception; once the
//! silence exceeds the timeout the bridge re-initializes the radio.

use std::time::Duration;
use tokio::time::Instant;

/// Link state as seen by the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// A frame arrived within the timeout
    Healthy,
    /// Nothing has arrived for longer than the timeout
    Silent,
}

/// Tracks time since the last reception
#[derive(Debug, Clone)]
pub struct LinkWatchdog {
    last_receive: Instant,
    timeout: Duration,
}

impl LinkWatchdog {
    /// Create a watchdog that starts healthy
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_receive: Instant::now(),
            timeout,
        }
    }

    /// Record a reception (or a forced re-initialization)
    pub fn reset(&mut self) {
        self.last_receive = Instant::now();
    }

    /// Time since the last reset
    pub fn silence(&self) -> Duration {
        self.last_receive.elapsed()
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current state without side effects
    pub fn state(&self) -> LinkState {
        if self.silence() > self.timeout {
            LinkState::Silent
        } else {
            LinkState::Healthy
        }
    }

    /// Check for expiry, resetting if expired
    ///
    /// Returns `true` exactly once per expiry. The caller is expected to
    /// re-initialize the radio.
    pub fn check(&mut self) -> bool {
        match self.state() {
            LinkState::Healthy => false,
            LinkState::Silent => {
                self.reset();
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_starts_healthy() {
        let mut watchdog = LinkWatchdog::new(Duration::from_secs(60));
        assert_eq!(watchdog.state(), LinkState::Healthy);
        assert!(!watchdog.check());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_once() {
        let mut watchdog = LinkWatchdog::new(Duration::from_secs(60));

        advance(Duration::from_secs(60)).await;
        // Exactly at the timeout is not yet silent
        assert!(!watchdog.check());

        advance(Duration::from_millis(1)).await;
        assert_eq!(watchdog.state(), LinkState::Silent);
        assert!(watchdog.check());
        assert!(!watchdog.check());
        assert_eq!(watchdog.state(), LinkState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reception_resets() {
        let mut watchdog = LinkWatchdog::new(Duration::from_secs(60));

        advance(Duration::from_secs(45)).await;
        watchdog.reset();
        advance(Duration::from_secs(45)).await;
        assert!(!watchdog.check());
        assert_eq!(watchdog.silence(), Duration::from_secs(45));
    }
}
