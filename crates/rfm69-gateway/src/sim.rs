//! Simulated RFM69 radio
//!
//! Stands in for the hardware driver so the gateway can run end-to-end
//! against a real broker without a module attached. Virtual sensor nodes
//! take turns sending temperature packets to the gateway, requesting an
//! ack, the way the battery nodes do. Occasionally a frame is corrupted in
//! flight, and sends from the gateway are acked with a configurable
//! probability.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rfm69_bridge::codec::{self, Packet};
use rfm69_bridge::{EncryptionKey, RadioDriver, RadioSettings, ReceivedFrame, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// A virtual sensor node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedNode {
    /// Node id on the network
    pub node_id: u8,
    /// Device id the node reports under
    #[serde(default)]
    pub device_id: u8,
    /// Temperature the readings wander around
    pub base_temperature: f32,
}

/// Simulated radio settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Time between transmissions
    #[serde(with = "rfm69_bridge::config::humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Chance a frame arrives corrupted
    #[serde(default = "default_corrupt_probability")]
    pub corrupt_probability: f64,

    /// Chance a single send attempt from the gateway is acked
    #[serde(default = "default_ack_probability")]
    pub ack_probability: f64,

    /// Uncalibrated temperature of the gateway's own module
    #[serde(default = "default_chip_temperature")]
    pub chip_temperature: f32,

    /// Nodes taking turns to transmit
    #[serde(default = "default_nodes")]
    pub nodes: Vec<SimulatedNode>,
}

fn default_nodes() -> Vec<SimulatedNode> {
    vec![
        SimulatedNode {
            node_id: 2,
            device_id: 0,
            base_temperature: 21.0,
        },
        SimulatedNode {
            node_id: 3,
            device_id: 0,
            base_temperature: 4.5,
        },
    ]
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_corrupt_probability() -> f64 {
    0.05
}

fn default_ack_probability() -> f64 {
    0.9
}

fn default_chip_temperature() -> f32 {
    28.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            corrupt_probability: default_corrupt_probability(),
            ack_probability: default_ack_probability(),
            chip_temperature: default_chip_temperature(),
            nodes: default_nodes(),
        }
    }
}

/// Radio driver backed by virtual nodes
pub struct SimulatedRadio {
    config: SimulationConfig,
    gateway_node_id: u8,
    sequences: Vec<u8>,
    next_node: usize,
    next_transmit: Instant,
    rng: StdRng,
}

impl SimulatedRadio {
    /// Create a simulated radio
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a simulated radio with a fixed seed
    pub fn seeded(config: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulationConfig, rng: StdRng) -> Self {
        Self {
            sequences: vec![0; config.nodes.len()],
            next_transmit: Instant::now() + config.interval,
            next_node: 0,
            gateway_node_id: 1,
            config,
            rng,
        }
    }

    fn next_frame(&mut self) -> Option<ReceivedFrame> {
        let index = self.next_node;
        let node = self.config.nodes.get(index)?.clone();
        self.next_node = (index + 1) % self.config.nodes.len();

        let sequence = self.sequences[index];
        self.sequences[index] = sequence.wrapping_add(1);

        let celsius = node.base_temperature + self.rng.gen_range(-0.5f32..0.5);
        let packet = Packet::temperature(
            node.node_id,
            self.gateway_node_id,
            node.device_id,
            sequence,
            celsius,
        );
        let mut data = codec::encode(&packet).to_vec();

        if self.rng.gen_bool(self.config.corrupt_probability.clamp(0.0, 1.0)) {
            match self.rng.gen_range(0..3) {
                0 => data.truncate(self.rng.gen_range(0..data.len())),
                1 => data[0] = self.rng.gen_range(2..=u8::MAX),
                _ => data.push(0),
            }
            debug!(node = node.node_id, "Simulating corrupted frame");
        }

        let rssi = self.rng.gen_range(-95..=-30);
        Some(ReceivedFrame::new(data, node.node_id, self.gateway_node_id, rssi).with_ack_request())
    }
}

#[async_trait]
impl RadioDriver for SimulatedRadio {
    async fn initialize(&mut self, settings: &RadioSettings) -> Result<()> {
        self.gateway_node_id = settings.node_id;
        info!(
            nodes = self.config.nodes.len(),
            interval = ?self.config.interval,
            "Simulated radio initialized"
        );
        Ok(())
    }

    async fn restart(&mut self, settings: &RadioSettings) -> Result<()> {
        self.gateway_node_id = settings.node_id;
        debug!(frequency = %settings.frequency, "Simulated radio restarted");
        Ok(())
    }

    async fn set_high_power(&mut self) -> Result<()> {
        Ok(())
    }

    async fn encrypt(&mut self, _key: Option<&EncryptionKey>) -> Result<()> {
        Ok(())
    }

    async fn promiscuous(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    async fn receive_done(&mut self) -> Result<Option<ReceivedFrame>> {
        let now = Instant::now();
        if self.config.nodes.is_empty() || now < self.next_transmit {
            return Ok(None);
        }
        self.next_transmit = now + self.config.interval;
        Ok(self.next_frame())
    }

    async fn send_ack(&mut self, to: u8) -> Result<()> {
        debug!(to, "Simulated ack");
        Ok(())
    }

    async fn send_with_retry(
        &mut self,
        target: u8,
        data: &[u8],
        retries: u8,
        retry_timeout: Duration,
    ) -> Result<bool> {
        let probability = self.config.ack_probability.clamp(0.0, 1.0);
        for attempt in 0..=retries {
            if self.rng.gen_bool(probability) {
                debug!(target, attempt, len = data.len(), "Simulated send acked");
                return Ok(true);
            }
            tokio::time::sleep(retry_timeout).await;
        }
        debug!(target, len = data.len(), "Simulated send not acked");
        Ok(false)
    }

    async fn read_temperature(&mut self, calibration: i8) -> Result<f32> {
        let jitter = self.rng.gen_range(-1.0f32..=1.0);
        Ok(self.config.chip_temperature + jitter + f32::from(calibration))
    }

    fn name(&self) -> &str {
        "SimulatedRadio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfm69_bridge::{decode, FrequencyBand, Payload};

    fn settings() -> RadioSettings {
        RadioSettings {
            frequency: FrequencyBand::Mhz433,
            node_id: 1,
            network_id: 101,
            high_power: true,
            encryption_key: None,
            promiscuous: true,
        }
    }

    fn reliable() -> SimulationConfig {
        SimulationConfig {
            corrupt_probability: 0.0,
            ack_probability: 1.0,
            ..SimulationConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_nodes_take_turns() {
        let mut radio = SimulatedRadio::seeded(reliable(), 7);
        radio.initialize(&settings()).await.unwrap();

        assert!(radio.receive_done().await.unwrap().is_none());

        let mut senders = Vec::new();
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(5)).await;
            let frame = radio.receive_done().await.unwrap().unwrap();
            assert!(frame.ack_requested);
            assert_eq!(frame.target, 1);

            let packet = decode(&frame.data).unwrap();
            assert_eq!(packet.source_node_id, frame.sender);
            assert!(matches!(packet.payload, Payload::Temperature { .. }));
            senders.push(frame.sender);
        }
        assert_eq!(senders, vec![2, 3, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupted_frames_fail_decode() {
        let config = SimulationConfig {
            corrupt_probability: 1.0,
            ..SimulationConfig::default()
        };
        let mut radio = SimulatedRadio::seeded(config, 11);

        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(5)).await;
            let frame = radio.receive_done().await.unwrap().unwrap();
            assert!(decode(&frame.data).is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ack_probability() {
        let mut radio = SimulatedRadio::seeded(reliable(), 3);
        assert!(radio
            .send_with_retry(2, &[0; 10], 2, Duration::from_millis(40))
            .await
            .unwrap());

        let never = SimulationConfig {
            ack_probability: 0.0,
            ..SimulationConfig::default()
        };
        let mut radio = SimulatedRadio::seeded(never, 3);
        assert!(!radio
            .send_with_retry(2, &[0; 10], 2, Duration::from_millis(40))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_read_temperature_calibrated() {
        let mut radio = SimulatedRadio::seeded(reliable(), 5);
        let t = radio.read_temperature(-4).await.unwrap();
        assert!((23.0..=25.0).contains(&t));
    }
}
