//! Test doubles for the radio and the message bus
//!
//! [`MockRadio`] and [`MockBus`] share their state behind an `Arc`, so a
//! test can keep a clone, hand the other to [`crate::GatewayBridge`], and
//! inspect what the bridge did afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! let radio = MockRadio::new();
//! radio.queue_frame(temperature_frame(5, 1, 2, 7, 21.5, -60));
//!
//! let bus = MockBus::new();
//! let (bridge, handle) = GatewayBridge::new(radio.clone(), bus.clone(), &config);
//! ```

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::{InboundMessage, MessageBus};
use crate::codec::{self, Packet};
use crate::error::{BridgeError, Result};
use crate::radio::{EncryptionKey, RadioDriver, RadioSettings, ReceivedFrame};

/// A driver call recorded by [`MockRadio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    /// `initialize`
    Initialize,
    /// `restart`
    Restart {
        /// Node id applied
        node_id: u8,
        /// Network id applied
        network_id: u8,
    },
    /// `set_high_power`
    SetHighPower,
    /// `encrypt`
    Encrypt {
        /// Whether a key was set
        enabled: bool,
    },
    /// `promiscuous`
    Promiscuous(bool),
    /// `send_ack`
    SendAck(u8),
    /// `send_with_retry`
    SendWithRetry {
        /// Destination node
        target: u8,
        /// Retries requested
        retries: u8,
    },
    /// `read_temperature`
    ReadTemperature(i8),
}

#[derive(Debug)]
struct MockRadioState {
    incoming: VecDeque<ReceivedFrame>,
    calls: Vec<RadioCall>,
    sent: Vec<(u8, Bytes)>,
    send_acked: bool,
    raw_temperature: f32,
    fail_receive: bool,
}

/// In-memory radio driver
#[derive(Debug, Clone)]
pub struct MockRadio {
    state: Arc<Mutex<MockRadioState>>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// Create a mock radio whose sends are acknowledged
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockRadioState {
                incoming: VecDeque::new(),
                calls: Vec::new(),
                sent: Vec::new(),
                send_acked: true,
                raw_temperature: 25.0,
                fail_receive: false,
            })),
        }
    }

    /// Queue a frame for `receive_done`
    pub fn queue_frame(&self, frame: ReceivedFrame) {
        self.state.lock().incoming.push_back(frame);
    }

    /// Frames not yet received
    pub fn pending_frames(&self) -> usize {
        self.state.lock().incoming.len()
    }

    /// Whether `send_with_retry` reports an ack
    pub fn set_send_acked(&self, acked: bool) {
        self.state.lock().send_acked = acked;
    }

    /// Uncalibrated on-chip temperature
    pub fn set_raw_temperature(&self, celsius: f32) {
        self.state.lock().raw_temperature = celsius;
    }

    /// Make `receive_done` fail
    pub fn fail_receive(&self, fail: bool) {
        self.state.lock().fail_receive = fail;
    }

    /// Recorded driver calls, excluding `receive_done`
    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    /// Number of `restart` calls
    pub fn restart_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RadioCall::Restart { .. }))
            .count()
    }

    /// Payloads passed to `send_with_retry`, with their target
    pub fn sent_packets(&self) -> Vec<(u8, Bytes)> {
        self.state.lock().sent.clone()
    }
}

#[async_trait::async_trait]
impl RadioDriver for MockRadio {
    async fn initialize(&mut self, _settings: &RadioSettings) -> Result<()> {
        self.state.lock().calls.push(RadioCall::Initialize);
        Ok(())
    }

    async fn restart(&mut self, settings: &RadioSettings) -> Result<()> {
        self.state.lock().calls.push(RadioCall::Restart {
            node_id: settings.node_id,
            network_id: settings.network_id,
        });
        Ok(())
    }

    async fn set_high_power(&mut self) -> Result<()> {
        self.state.lock().calls.push(RadioCall::SetHighPower);
        Ok(())
    }

    async fn encrypt(&mut self, key: Option<&EncryptionKey>) -> Result<()> {
        self.state.lock().calls.push(RadioCall::Encrypt {
            enabled: key.is_some(),
        });
        Ok(())
    }

    async fn promiscuous(&mut self, enabled: bool) -> Result<()> {
        self.state.lock().calls.push(RadioCall::Promiscuous(enabled));
        Ok(())
    }

    async fn receive_done(&mut self) -> Result<Option<ReceivedFrame>> {
        let mut state = self.state.lock();
        if state.fail_receive {
            return Err(BridgeError::Radio("simulated receive failure".to_string()));
        }
        Ok(state.incoming.pop_front())
    }

    async fn send_ack(&mut self, to: u8) -> Result<()> {
        self.state.lock().calls.push(RadioCall::SendAck(to));
        Ok(())
    }

    async fn send_with_retry(
        &mut self,
        target: u8,
        data: &[u8],
        retries: u8,
        _retry_timeout: Duration,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        state
            .calls
            .push(RadioCall::SendWithRetry { target, retries });
        state.sent.push((target, Bytes::copy_from_slice(data)));
        Ok(state.send_acked)
    }

    async fn read_temperature(&mut self, calibration: i8) -> Result<f32> {
        let mut state = self.state.lock();
        state.calls.push(RadioCall::ReadTemperature(calibration));
        Ok(state.raw_temperature + f32::from(calibration))
    }

    fn name(&self) -> &str {
        "MockRadio"
    }
}

#[derive(Debug, Default)]
struct MockBusState {
    inbound: VecDeque<InboundMessage>,
    published: Vec<(String, Bytes)>,
    subscriptions: Vec<String>,
    fail_publish: bool,
    disconnected: bool,
}

/// In-memory message bus
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBus {
    /// Create an empty mock bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound message for `poll`
    pub fn push_inbound(&self, topic: &str, payload: &str) {
        self.state
            .lock()
            .inbound
            .push_back(InboundMessage::new(topic, payload.to_string()));
    }

    /// Make `publish` fail
    pub fn fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    /// Every successful publish, in order
    pub fn published(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .published
            .iter()
            .map(|(t, p)| (t.clone(), String::from_utf8_lossy(p).into_owned()))
            .collect()
    }

    /// Last payload published on `topic`
    pub fn last_on(&self, topic: &str) -> Option<String> {
        self.published()
            .into_iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, p)| p)
    }

    /// Active subscriptions
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    /// Whether `disconnect` was called
    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }
}

#[async_trait::async_trait]
impl MessageBus for MockBus {
    async fn subscribe(&mut self, filter: &str) -> Result<()> {
        self.state.lock().subscriptions.push(filter.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_publish {
            return Err(BridgeError::Bus("simulated publish failure".to_string()));
        }
        state.published.push((topic.to_string(), payload));
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>> {
        let next = self.state.lock().inbound.pop_front();
        if next.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(next)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state.lock().disconnected = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "MockBus"
    }
}

/// A received temperature frame addressed to `target`, requesting an ack
pub fn temperature_frame(
    source: u8,
    target: u8,
    device_id: u8,
    sequence: u8,
    celsius: f32,
    rssi: i16,
) -> ReceivedFrame {
    let packet = Packet::temperature(source, target, device_id, sequence, celsius);
    ReceivedFrame::new(codec::encode(&packet), source, target, rssi).with_ack_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_radio_shared_state() {
        let radio = MockRadio::new();
        let mut driver = radio.clone();

        radio.queue_frame(ReceivedFrame::new(vec![1, 2, 3], 2, 1, -40));
        let frame = driver.receive_done().await.unwrap().unwrap();
        assert_eq!(frame.sender, 2);
        assert_eq!(radio.pending_frames(), 0);
        assert!(driver.receive_done().await.unwrap().is_none());

        driver
            .send_with_retry(4, &[9], 2, Duration::from_millis(40))
            .await
            .unwrap();
        assert_eq!(radio.sent_packets(), vec![(4, Bytes::from_static(&[9]))]);
    }

    #[tokio::test]
    async fn test_mock_radio_calibration() {
        let radio = MockRadio::new();
        radio.set_raw_temperature(30.0);
        let mut driver = radio.clone();
        assert_eq!(driver.read_temperature(-4).await.unwrap(), 26.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_bus() {
        let bus = MockBus::new();
        let mut client = bus.clone();

        bus.push_inbound("a/b", "1");
        let msg = client.poll(Duration::from_millis(60)).await.unwrap();
        assert_eq!(msg.unwrap().topic, "a/b");
        assert!(client
            .poll(Duration::from_millis(60))
            .await
            .unwrap()
            .is_none());

        client.publish("x/y", Bytes::from("007")).await.unwrap();
        assert_eq!(bus.last_on("x/y").as_deref(), Some("007"));

        bus.fail_publish(true);
        assert!(client.publish("x/y", Bytes::from("008")).await.is_err());
    }

    #[test]
    fn test_temperature_frame() {
        let frame = temperature_frame(5, 1, 2, 7, 21.5, -60);
        assert!(frame.ack_requested);
        assert_eq!(frame.data.len(), codec::PACKET_SIZE_V1);
    }
}
