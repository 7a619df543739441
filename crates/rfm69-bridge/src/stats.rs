//! Link statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-lifetime link counters
///
/// Owned by the bridge loop and lent mutably to the acknowledgment
/// coordinator. Snapshots are available through
/// [`crate::BridgeHandle::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Packets sent over the radio (probes and relayed commands)
    pub messages_sent: u64,
    /// Frames received from the radio, decodable or not
    pub messages_received: u64,
    /// Received frames that asked for an ack addressed to this gateway
    pub ack_requested: u64,
    /// Sends that were acknowledged by the remote node
    pub ack_received: u64,
    /// Sends that went unacknowledged after all retries
    pub ack_missed: u64,
    /// Radio re-initializations forced by the link watchdog
    pub watchdog_reinits: u64,
    /// Running counter of ack opportunities, drives the probe cadence
    pub ack_count: u64,
    /// Messages published to the bus
    pub published: u64,
    /// Frames that failed to decode or had mismatched addressing
    pub decode_failures: u64,
    /// Inbound bus commands relayed to the radio
    pub inbound_commands: u64,
    /// Gateway temperature self-reports published
    pub self_reports: u64,
    /// When the bridge started
    pub started_at: DateTime<Utc>,
}

impl LinkStats {
    /// Fresh counters stamped with the current time
    pub fn new() -> Self {
        Self {
            messages_sent: 0,
            messages_received: 0,
            ack_requested: 0,
            ack_received: 0,
            ack_missed: 0,
            watchdog_reinits: 0,
            ack_count: 0,
            published: 0,
            decode_failures: 0,
            inbound_commands: 0,
            self_reports: 0,
            started_at: Utc::now(),
        }
    }

    /// Record the outcome of a send-with-retry
    pub fn record_send(&mut self, acked: bool) {
        self.messages_sent += 1;
        if acked {
            self.ack_received += 1;
        } else {
            self.ack_missed += 1;
        }
    }

    /// One-line JSON rendering for the shutdown log
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Seconds since the bridge started
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_send() {
        let mut stats = LinkStats::new();
        stats.record_send(true);
        stats.record_send(false);
        stats.record_send(false);

        assert_eq!(stats.messages_sent, 3);
        assert_eq!(stats.ack_received, 1);
        assert_eq!(stats.ack_missed, 2);
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = LinkStats::new();
        stats.watchdog_reinits = 2;

        let toml = toml::to_string(&stats).unwrap();
        assert!(toml.contains("watchdog_reinits = 2"));
        let back: LinkStats = toml::from_str(&toml).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_stats_json() {
        let mut stats = LinkStats::new();
        stats.decode_failures = 4;

        let json = stats.to_json().unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"decode_failures\":4"));
        let back: LinkStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
