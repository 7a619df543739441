//! RFM69 Packet-Radio to MQTT Bridge
//!
//! This crate bridges a network of battery-powered RFM69 sensor nodes to an
//! MQTT broker. Nodes transmit small fixed-format binary packets; the
//! gateway validates and decodes them, publishes the readings under a
//! hierarchical topic tree, and relays commands published on the broker
//! back to the nodes over the radio.
//!
//! # Architecture
//!
//! The bridge is built from small single-purpose parts driven by one loop:
//!
//! 1. **Packet Codec** ([`codec`]) - fixed-size little-endian wire format
//! 2. **Link Watchdog** ([`watchdog`]) - re-initializes a silent radio
//! 3. **Ack Coordinator** ([`ack`]) - acks frames, probes the reverse link
//! 4. **Topic Translator** ([`topic`]) - packets ↔ MQTT topics and payloads
//! 5. **Bridge Loop** ([`bridge`]) - polls radio and bus, dispatches
//!
//! The radio and the broker are reached through the [`RadioDriver`] and
//! [`MessageBus`] traits, so the loop runs unchanged against hardware,
//! a simulator, or the mocks in [`test_utils`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rfm69_bridge::{GatewayBridge, GatewayConfigBuilder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfigBuilder::new()
//!         .network_id(101)
//!         .node_id(1)
//!         .broker("localhost", 1883)
//!         .build();
//!     config.validate()?;
//!
//!     let radio = MyRfm69Driver::open("/dev/spidev0.0")?;
//!     let bus = MyMqttBus::connect(&config.mqtt).await?;
//!
//!     let (bridge, handle) = GatewayBridge::new(radio, bus, &config);
//!     let stats = bridge.run().await?;
//!     println!("received {} frames", stats.messages_received);
//!     Ok(())
//! }
//! ```
//!
//! # Message Flow
//!
//! ## Radio → MQTT
//!
//! 1. `RadioDriver::receive_done` returns an owned frame
//! 2. The watchdog is reset and the frame acknowledged if addressed to us
//! 3. The codec validates length, protocol version and data type
//! 4. Temperature readings publish `RSSI`, `Sequence` and `TemperatureC`
//!
//! ## MQTT → Radio
//!
//! 1. A message arrives under `<root>/INPUT/Network<NNN>/...`
//! 2. The translator parses node, device and field into a command
//! 3. The codec encodes the packet; the radio sends it with retries
//!
//! # Topic Layout
//!
//! ```text
//! RFM69HomeAutomation/OUTPUT/Network101/Node005/Device002/TemperatureC  +023.46
//! RFM69HomeAutomation/OUTPUT/Network101/Node005/Device002/Sequence      007
//! RFM69HomeAutomation/OUTPUT/Network101/Node005/Device002/RSSI          -045
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Core modules
pub mod config;
pub mod error;
pub mod stats;

// Collaborator seams
pub mod bus;
pub mod radio;

// Protocol components
pub mod ack;
pub mod codec;
pub mod dump;
pub mod topic;
pub mod watchdog;

// Control loop
pub mod bridge;

// Testing utilities
pub mod test_utils;

// Re-exports for convenience
pub use config::{
    BridgeConfig, GatewayConfig, GatewayConfigBuilder, MqttConfig, RadioConfig, WatchdogConfig,
};
pub use error::{BridgeError, DecodeError, Result};
pub use stats::LinkStats;

pub use bus::{InboundMessage, MessageBus};
pub use radio::{
    configure_radio, EncryptionKey, FrequencyBand, RadioDriver, RadioSettings, ReceivedFrame,
};

pub use ack::{AckCoordinator, AckOutcome};
pub use codec::{decode, encode, DataType, Packet, Payload, ProtocolVersion};
pub use dump::{hex_dump, log_hex_dump};
pub use topic::{CommandKind, Field, InboundCommand, TopicTranslator};
pub use watchdog::{LinkState, LinkWatchdog};

pub use bridge::{BridgeCommand, BridgeHandle, GatewayBridge, Step};

pub use test_utils::{MockBus, MockRadio, RadioCall};

// Protocol constants re-exports
pub use codec::PACKET_SIZE_V1;
pub use config::{
    DEFAULT_CLIENT_ID, DEFAULT_GATEWAY_NODE_ID, DEFAULT_NETWORK_ID, DEFAULT_TOPIC_ROOT,
    MAX_CLIENT_ID_LEN,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current wire protocol version
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::V1;
