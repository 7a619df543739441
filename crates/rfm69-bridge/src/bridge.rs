//! GatewayBridge - the gateway control loop
//!
//! A single cooperative loop owns the radio, the message bus, the link
//! watchdog, the acknowledgment coordinator and the statistics. Each
//! iteration:
//!
//! 1. Polls the bus (bounded by `mqtt.poll_timeout`) and relays at most one
//!    inbound command to the radio
//! 2. Re-initializes the radio if the link watchdog expired
//! 3. Handles at most one received frame: ack, decode, publish
//! 4. Publishes the gateway's own temperature when the self-report is due
//! 5. Services [`BridgeHandle`] commands without blocking
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        GatewayBridge                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌─────────────┐    ┌───────────────┐    ┌───────────────┐    │
//! │  │ RadioDriver │◄──►│ Bridge Loop   │◄──►│ MessageBus    │    │
//! │  │ (RFM69)     │    │               │    │ (MQTT)        │    │
//! │  └─────────────┘    │ Codec         │    └───────────────┘    │
//! │                     │ AckCoordinator│                         │
//! │                     │ LinkWatchdog  │    ┌───────────────┐    │
//! │                     │ TopicTranslator◄───│ BridgeHandle  │    │
//! │                     └───────────────┘    └───────────────┘    │
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-frame and per-command errors are logged and the loop continues.
//! Only buffer-safety violations ([`BridgeError::is_fatal`]) end it.

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::ack::{AckCoordinator, AckOutcome};
use crate::bus::{InboundMessage, MessageBus};
use crate::codec::{self, Packet, Payload};
use crate::config::GatewayConfig;
use crate::dump::log_hex_dump;
use crate::error::{BridgeError, Result};
use crate::radio::{configure_radio, RadioDriver, RadioSettings, ReceivedFrame};
use crate::stats::LinkStats;
use crate::topic::{
    format_rssi, format_sequence, format_temperature, Field, OutboundMessage, TopicTranslator,
};
use crate::watchdog::LinkWatchdog;

/// Device id the gateway reports its own temperature under
pub const GATEWAY_DEVICE_ID: u8 = 0;

/// Commands that can be sent to the bridge
#[derive(Debug)]
pub enum BridgeCommand {
    /// Get a statistics snapshot
    GetStats(oneshot::Sender<LinkStats>),
    /// Stop the loop after the current iteration
    Shutdown,
}

/// Handle for controlling a running [`GatewayBridge`]
#[derive(Clone)]
pub struct BridgeHandle {
    command_tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    /// Get bridge statistics
    pub async fn stats(&self) -> Result<LinkStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(BridgeCommand::GetStats(tx))
            .await
            .map_err(|_| BridgeError::ChannelClosed)?;
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    /// Shutdown the bridge
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(BridgeCommand::Shutdown)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

/// Result of a single loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep looping
    Continue,
    /// Shutdown was requested
    Shutdown,
}

/// The gateway bridge between an RFM69 radio and a message bus
pub struct GatewayBridge<R: RadioDriver, B: MessageBus> {
    radio: R,
    bus: B,
    config: GatewayConfig,
    settings: RadioSettings,
    translator: TopicTranslator,
    watchdog: LinkWatchdog,
    acks: AckCoordinator,
    stats: LinkStats,
    command_rx: mpsc::Receiver<BridgeCommand>,
    /// Sequence for the gateway's own temperature reports
    report_sequence: u8,
    /// Sequence for packets built from inbound commands
    command_sequence: u8,
    next_self_report: Instant,
}

impl<R: RadioDriver, B: MessageBus> GatewayBridge<R, B> {
    /// Create a new bridge and its control handle
    pub fn new(radio: R, bus: B, config: &GatewayConfig) -> (Self, BridgeHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let handle = BridgeHandle { command_tx };

        let bridge = Self {
            radio,
            bus,
            settings: config.radio_settings(),
            translator: TopicTranslator::new(&config.mqtt, config.radio.network_id),
            watchdog: LinkWatchdog::new(config.watchdog.timeout),
            acks: AckCoordinator::new(config),
            stats: LinkStats::new(),
            command_rx,
            report_sequence: 0,
            command_sequence: 0,
            next_self_report: Instant::now() + config.bridge.self_report_interval,
            config: config.clone(),
        };

        (bridge, handle)
    }

    /// Current statistics
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Initialize the radio and subscribe to inbound commands
    ///
    /// Any failure here is a startup failure.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            radio = self.radio.name(),
            bus = self.bus.name(),
            network_id = self.settings.network_id,
            node_id = self.settings.node_id,
            "Starting RFM69 gateway bridge"
        );

        self.radio.initialize(&self.settings).await?;
        configure_radio(&mut self.radio, &self.settings).await?;

        let filter = self.translator.input_filter();
        self.bus.subscribe(&filter).await?;
        info!(filter = %filter, "Subscribed to inbound commands");

        self.watchdog.reset();
        self.next_self_report = Instant::now() + self.config.bridge.self_report_interval;
        Ok(())
    }

    /// Run the bridge until shutdown or a fatal error
    ///
    /// Returns the final statistics on shutdown.
    pub async fn run(mut self) -> Result<LinkStats> {
        self.start().await?;

        let result = loop {
            match self.step().await {
                Ok(Step::Continue) => {}
                Ok(Step::Shutdown) => break Ok(()),
                Err(e) => {
                    error!(code = e.error_code(), "Fatal error, stopping bridge: {}", e);
                    break Err(e);
                }
            }
        };

        if let Err(e) = self.bus.disconnect().await {
            warn!("Error disconnecting from {}: {}", self.bus.name(), e);
        }

        info!(
            received = self.stats.messages_received,
            published = self.stats.published,
            watchdog_reinits = self.stats.watchdog_reinits,
            "RFM69 gateway bridge stopped"
        );
        match self.stats.to_json() {
            Ok(json) => info!("Final stats: {}", json),
            Err(e) => warn!("Could not render final stats: {}", e),
        }
        result.map(|()| self.stats)
    }

    /// Run one loop iteration
    ///
    /// Only fatal errors are returned.
    pub async fn step(&mut self) -> Result<Step> {
        // 1. Bus
        match self.bus.poll(self.config.mqtt.poll_timeout).await {
            Ok(Some(msg)) => {
                if let Err(e) = self.handle_inbound(&msg).await {
                    warn!(code = e.error_code(), topic = %msg.topic, "Inbound command rejected: {}", e);
                }
            }
            Ok(None) => trace!("No inbound message"),
            Err(e) => warn!("Error polling {}: {}", self.bus.name(), e),
        }

        // 2. Watchdog
        if self.watchdog.check() {
            self.stats.watchdog_reinits += 1;
            warn!(
                timeout = ?self.watchdog.timeout(),
                reinits = self.stats.watchdog_reinits,
                "No radio traffic within watchdog timeout, re-initializing radio"
            );
            if let Err(e) = configure_radio(&mut self.radio, &self.settings).await {
                error!("Radio re-initialization failed: {}", e);
            }
        }

        // 3. Radio
        match self.radio.receive_done().await {
            Ok(Some(frame)) => {
                if let Err(e) = self.handle_frame(frame).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(code = e.error_code(), "Error handling radio frame: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Error reading from {}: {}", self.radio.name(), e),
        }

        // 4. Self-report
        let now = Instant::now();
        if now >= self.next_self_report {
            self.next_self_report = now + self.config.bridge.self_report_interval;
            if let Err(e) = self.self_report().await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(code = e.error_code(), "Self-report failed: {}", e);
            }
        }

        // 5. Control commands
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                BridgeCommand::GetStats(tx) => {
                    let _ = tx.send(self.stats.clone());
                }
                BridgeCommand::Shutdown => {
                    info!("Bridge shutdown requested");
                    return Ok(Step::Shutdown);
                }
            }
        }

        Ok(Step::Continue)
    }

    /// Handle a frame received from the radio
    ///
    /// The frame is an owned copy, so acknowledging first cannot clobber it.
    async fn handle_frame(&mut self, frame: ReceivedFrame) -> Result<()> {
        self.stats.messages_received += 1;
        self.watchdog.reset();

        debug!(
            sender = frame.sender,
            target = frame.target,
            rssi = frame.rssi,
            len = frame.data.len(),
            ack_requested = frame.ack_requested,
            "Radio frame received"
        );

        match self
            .acks
            .handle(&mut self.radio, &frame, &mut self.stats)
            .await
        {
            Ok(AckOutcome::Probed { acked }) => debug!(node = frame.sender, acked, "Link probed"),
            Ok(_) => {}
            Err(e) => warn!(node = frame.sender, "Acknowledgment failed: {}", e),
        }

        let packet = match codec::decode(&frame.data) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.decode_failures += 1;
                let err = BridgeError::from(e);
                warn!(
                    code = err.error_code(),
                    sender = frame.sender,
                    rssi = frame.rssi,
                    "Undecodable frame: {}",
                    err
                );
                log_hex_dump(Some("Frame"), &frame.data, self.config.bridge.dump_width);
                return Ok(());
            }
        };

        if packet.source_node_id != frame.sender {
            self.stats.decode_failures += 1;
            let err = BridgeError::AddressMismatch {
                header: packet.source_node_id,
                sender: frame.sender,
            };
            warn!(code = err.error_code(), "Dropping frame: {}", err);
            log_hex_dump(Some("Frame"), &frame.data, self.config.bridge.dump_width);
            return Ok(());
        }

        if let Payload::Temperature { celsius, .. } = packet.payload {
            if !celsius.is_finite() {
                self.stats.decode_failures += 1;
                let err = BridgeError::NonFiniteReading {
                    node: packet.source_node_id,
                    value: celsius,
                };
                warn!(code = err.error_code(), "Dropping frame: {}", err);
                log_hex_dump(Some("Frame"), &frame.data, self.config.bridge.dump_width);
                return Ok(());
            }
        }

        self.dispatch(&packet, frame.rssi).await
    }

    async fn dispatch(&mut self, packet: &Packet, rssi: i16) -> Result<()> {
        let node = packet.source_node_id;

        match packet.payload {
            Payload::Temperature {
                device_id,
                sequence,
                celsius,
            } => {
                info!(
                    "Received Temperature, Node ID = {:03} Device ID = {:03} Seq = {:03} RSSI = {} Temp = {}C",
                    node,
                    device_id,
                    sequence,
                    format_rssi(rssi),
                    format_temperature(celsius)
                );

                // Build everything before publishing anything
                let messages = [
                    self.translator
                        .outbound(node, device_id, Field::Rssi, format_rssi(rssi))?,
                    self.translator.outbound(
                        node,
                        device_id,
                        Field::Sequence,
                        format_sequence(sequence),
                    )?,
                    self.translator.outbound(
                        node,
                        device_id,
                        Field::TemperatureC,
                        format_temperature(celsius),
                    )?,
                ];
                self.publish_all(messages).await;
            }
            Payload::Test { sequence } => {
                info!(
                    node,
                    target = packet.target_node_id,
                    sequence,
                    rssi,
                    "Link test packet observed"
                );
            }
        }

        Ok(())
    }

    /// Relay an inbound bus message to the radio
    async fn handle_inbound(&mut self, msg: &InboundMessage) -> Result<()> {
        let cmd = self.translator.parse_inbound(msg)?;

        let sequence = self.command_sequence;
        self.command_sequence = self.command_sequence.wrapping_add(1);
        let packet = cmd.to_packet(self.settings.node_id, sequence);

        debug!(
            node = cmd.node_id,
            device = cmd.device_id,
            kind = ?cmd.kind,
            "Relaying inbound command"
        );

        self.stats.inbound_commands += 1;
        let sent = self
            .radio
            .send_with_retry(
                cmd.node_id,
                &codec::encode(&packet),
                self.config.bridge.command_retries,
                self.config.bridge.command_retry_timeout,
            )
            .await;

        match sent {
            Ok(acked) => {
                self.stats.record_send(acked);
                if !acked {
                    warn!(node = cmd.node_id, "Command not acknowledged");
                }
                Ok(())
            }
            Err(e) => {
                self.stats.record_send(false);
                Err(e)
            }
        }
    }

    /// Publish the gateway's own temperature
    async fn self_report(&mut self) -> Result<()> {
        let celsius = self
            .radio
            .read_temperature(self.config.radio.temperature_calibration)
            .await?;

        let node = self.settings.node_id;
        if !celsius.is_finite() {
            return Err(BridgeError::NonFiniteReading {
                node,
                value: celsius,
            });
        }
        let sequence = self.report_sequence;
        self.report_sequence = self.report_sequence.wrapping_add(1);

        let messages = [
            self.translator.outbound(
                node,
                GATEWAY_DEVICE_ID,
                Field::Sequence,
                format_sequence(sequence),
            )?,
            self.translator.outbound(
                node,
                GATEWAY_DEVICE_ID,
                Field::TemperatureC,
                format_temperature(celsius),
            )?,
        ];
        self.publish_all(messages).await;
        self.stats.self_reports += 1;

        debug!(
            sequence,
            celsius = %format_temperature(celsius),
            "Gateway temperature reported"
        );
        Ok(())
    }

    async fn publish_all<const N: usize>(&mut self, messages: [OutboundMessage; N]) {
        for msg in messages {
            match self.bus.publish(&msg.topic, msg.payload).await {
                Ok(()) => self.stats.published += 1,
                Err(e) => warn!(topic = %msg.topic, "Publish failed: {}", e),
            }
        }
    }
}

/// Create a test bridge over mock collaborators
#[cfg(test)]
pub fn create_test_bridge() -> (
    GatewayBridge<crate::test_utils::MockRadio, crate::test_utils::MockBus>,
    BridgeHandle,
    crate::test_utils::MockRadio,
    crate::test_utils::MockBus,
) {
    use crate::config::GatewayConfigBuilder;
    use crate::test_utils::{MockBus, MockRadio};

    let config = GatewayConfigBuilder::new().build();
    let radio = MockRadio::new();
    let bus = MockBus::new();
    let (bridge, handle) = GatewayBridge::new(radio.clone(), bus.clone(), &config);
    (bridge, handle, radio, bus)
}
