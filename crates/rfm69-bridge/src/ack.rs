//! Acknowledgment coordination
//!
//! Frames that ask for an acknowledgment and are addressed to the gateway
//! are acked immediately. Every third such frame the gateway also probes
//! the sender with a test packet of its own, which exercises the reverse
//! direction of the link and feeds the ack received/missed counters.

use crate::codec::{self, Packet};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::radio::{RadioDriver, ReceivedFrame};
use crate::stats::LinkStats;
use std::time::Duration;
use tracing::{debug, warn};

/// A reverse probe is sent on every Nth ack opportunity
pub const PROBE_EVERY: u64 = 3;

/// What the coordinator did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Sender did not ask for an ack
    NotRequested,
    /// Ack requested, but the frame is addressed to another node
    NotForGateway,
    /// Ack sent, no probe this time
    Acked,
    /// Ack sent and a probe followed
    Probed {
        /// Whether the probe was acknowledged
        acked: bool,
    },
}

/// Acknowledges frames and drives the probe cadence
#[derive(Debug, Clone)]
pub struct AckCoordinator {
    gateway_node_id: u8,
    probe_delay: Duration,
    probe_retries: u8,
    probe_retry_timeout: Duration,
    probe_sequence: u8,
}

impl AckCoordinator {
    /// Create a coordinator from the gateway configuration
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            gateway_node_id: config.radio.node_id,
            probe_delay: config.bridge.probe_delay,
            probe_retries: config.bridge.probe_retries,
            probe_retry_timeout: config.bridge.probe_retry_timeout,
            probe_sequence: 0,
        }
    }

    /// Acknowledge `frame` if it warrants one, probing every third time
    pub async fn handle<R>(
        &mut self,
        radio: &mut R,
        frame: &ReceivedFrame,
        stats: &mut LinkStats,
    ) -> Result<AckOutcome>
    where
        R: RadioDriver + ?Sized,
    {
        if !frame.ack_requested {
            return Ok(AckOutcome::NotRequested);
        }
        if frame.target != self.gateway_node_id {
            debug!(
                sender = frame.sender,
                target = frame.target,
                "Ack requested for another node, not acknowledging"
            );
            return Ok(AckOutcome::NotForGateway);
        }

        stats.ack_requested += 1;
        radio.send_ack(frame.sender).await?;
        debug!(to = frame.sender, "Ack sent");

        stats.ack_count += 1;
        if stats.ack_count % PROBE_EVERY != 0 {
            return Ok(AckOutcome::Acked);
        }

        let acked = self.probe(radio, frame.sender).await;
        stats.record_send(acked);
        Ok(AckOutcome::Probed { acked })
    }

    async fn probe<R>(&mut self, radio: &mut R, target: u8) -> bool
    where
        R: RadioDriver + ?Sized,
    {
        tokio::time::sleep(self.probe_delay).await;

        let packet = Packet::test(self.gateway_node_id, target, self.probe_sequence);
        self.probe_sequence = self.probe_sequence.wrapping_add(1);

        match radio
            .send_with_retry(
                target,
                &codec::encode(&packet),
                self.probe_retries,
                self.probe_retry_timeout,
            )
            .await
        {
            Ok(true) => {
                debug!(node = target, "Probe acknowledged");
                true
            }
            Ok(false) => {
                debug!(node = target, "Probe not acknowledged");
                false
            }
            Err(e) => {
                warn!(node = target, error = %e, "Probe send failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Payload;
    use crate::test_utils::{MockRadio, RadioCall};

    fn coordinator() -> AckCoordinator {
        AckCoordinator::new(&GatewayConfig::default())
    }

    fn addressed_frame() -> ReceivedFrame {
        ReceivedFrame::new(vec![0u8; 10], 5, 1, -50).with_ack_request()
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_third_frame_probes() {
        let mut radio = MockRadio::new();
        let mut stats = LinkStats::new();
        let mut acks = coordinator();

        let mut probes = 0;
        for _ in 0..10 {
            let outcome = acks
                .handle(&mut radio, &addressed_frame(), &mut stats)
                .await
                .unwrap();
            if matches!(outcome, AckOutcome::Probed { .. }) {
                probes += 1;
            }
        }

        assert_eq!(probes, 3);
        assert_eq!(stats.ack_requested, 10);
        assert_eq!(stats.ack_count, 10);
        assert_eq!(stats.messages_sent, 3);
        assert_eq!(stats.ack_received, 3);
        assert_eq!(radio.sent_packets().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_is_test_packet_to_sender() {
        let mut radio = MockRadio::new();
        let mut stats = LinkStats::new();
        stats.ack_count = 2;

        let outcome = coordinator()
            .handle(&mut radio, &addressed_frame(), &mut stats)
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::Probed { acked: true });

        let sent = radio.sent_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 5);
        let probe = codec::decode(&sent[0].1).unwrap();
        assert_eq!(probe.source_node_id, 1);
        assert_eq!(probe.target_node_id, 5);
        assert!(matches!(probe.payload, Payload::Test { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_probe_counted() {
        let mut radio = MockRadio::new();
        radio.set_send_acked(false);
        let mut stats = LinkStats::new();
        stats.ack_count = 2;

        let outcome = coordinator()
            .handle(&mut radio, &addressed_frame(), &mut stats)
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::Probed { acked: false });
        assert_eq!(stats.ack_missed, 1);
        assert_eq!(stats.ack_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promiscuous_frame_not_acked() {
        let mut radio = MockRadio::new();
        let mut stats = LinkStats::new();
        let frame = ReceivedFrame::new(vec![0u8; 10], 5, 9, -50).with_ack_request();

        let outcome = coordinator()
            .handle(&mut radio, &frame, &mut stats)
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::NotForGateway);
        assert_eq!(stats.ack_requested, 0);
        assert!(radio.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ack_requested() {
        let mut radio = MockRadio::new();
        let mut stats = LinkStats::new();
        let frame = ReceivedFrame::new(vec![0u8; 10], 5, 1, -50);

        let outcome = coordinator()
            .handle(&mut radio, &frame, &mut stats)
            .await
            .unwrap();
        assert_eq!(outcome, AckOutcome::NotRequested);
        assert_eq!(stats.ack_count, 0);
        assert!(!radio.calls().contains(&RadioCall::SendAck(5)));
    }
}
