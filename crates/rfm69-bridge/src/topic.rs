//! Mapping between radio packets and MQTT topics
//!
//! Outbound readings go to
//! `<root>/OUTPUT/Network<NNN>/Node<NNN>/Device<NNN>/<Field>`, one message
//! per field. Commands arrive on the mirror `INPUT` tree for this gateway's
//! network and are turned back into packets.
//!
//! Payload formats are fixed so existing dashboards keep parsing them:
//!
//! | Field          | Example   |
//! |----------------|-----------|
//! | `RSSI`         | `-045`    |
//! | `Sequence`     | `007`     |
//! | `TemperatureC` | `+023.46` |

use crate::bus::InboundMessage;
use crate::codec::Packet;
use crate::config::MqttConfig;
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use std::fmt;

/// A published field under a node/device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Received signal strength of the frame carrying the reading
    Rssi,
    /// Sender's packet sequence number
    Sequence,
    /// Temperature in Celsius
    TemperatureC,
    /// Link test command
    Test,
}

impl Field {
    /// Topic segment for this field
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Rssi => "RSSI",
            Field::Sequence => "Sequence",
            Field::TemperatureC => "TemperatureC",
            Field::Test => "Test",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "RSSI" => Some(Field::Rssi),
            "Sequence" => Some(Field::Sequence),
            "TemperatureC" => Some(Field::TemperatureC),
            "Test" => Some(Field::Test),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `RSSI` payload: signed, zero-padded to width 4
pub fn format_rssi(rssi: i16) -> String {
    format!("{:+04}", rssi)
}

/// `Sequence` payload: zero-padded to width 3
pub fn format_sequence(sequence: u8) -> String {
    format!("{:03}", sequence)
}

/// `TemperatureC` payload: signed, two decimals, zero-padded to width 7
///
/// NaN and infinities are space-padded instead (`   +nan`, `   -inf`).
pub fn format_temperature(celsius: f32) -> String {
    if celsius.is_finite() {
        return format!("{:+07.2}", celsius);
    }
    let word = if celsius.is_nan() { "nan" } else { "inf" };
    let sign = if celsius.is_sign_negative() { '-' } else { '+' };
    format!("{:>7}", format!("{}{}", sign, word))
}

/// A ready-to-publish topic and payload, both within the length limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Topic
    pub topic: String,
    /// Payload
    pub payload: Bytes,
}

/// What an inbound message asks the gateway to send
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandKind {
    /// Push a temperature value to a device
    Temperature(f32),
    /// Link test, with an explicit sequence or the gateway's next one
    Test(Option<u8>),
}

/// A parsed inbound command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InboundCommand {
    /// Destination node
    pub node_id: u8,
    /// Destination device on that node
    pub device_id: u8,
    /// Requested action
    pub kind: CommandKind,
}

impl InboundCommand {
    /// Build the packet to send, drawing on `sequence` when the command has none
    pub fn to_packet(&self, source: u8, sequence: u8) -> Packet {
        match self.kind {
            CommandKind::Temperature(celsius) => {
                Packet::temperature(source, self.node_id, self.device_id, sequence, celsius)
            }
            CommandKind::Test(explicit) => {
                Packet::test(source, self.node_id, explicit.unwrap_or(sequence))
            }
        }
    }
}

/// Builds outbound topics and parses inbound ones for one network
#[derive(Debug, Clone)]
pub struct TopicTranslator {
    root: String,
    network_id: u8,
    max_topic_length: usize,
    max_message_length: usize,
}

impl TopicTranslator {
    /// Create a translator for `network_id`
    pub fn new(mqtt: &MqttConfig, network_id: u8) -> Self {
        Self {
            root: mqtt.topic_root.clone(),
            network_id,
            max_topic_length: mqtt.max_topic_length,
            max_message_length: mqtt.max_message_length,
        }
    }

    /// Outbound topic for a node/device/field
    ///
    /// Fails with [`BridgeError::TopicTooLong`] past the configured maximum.
    pub fn output_topic(&self, node_id: u8, device_id: u8, field: Field) -> Result<String> {
        let topic = format!(
            "{}/OUTPUT/Network{:03}/Node{:03}/Device{:03}/{}",
            self.root, self.network_id, node_id, device_id, field
        );
        if topic.len() > self.max_topic_length {
            return Err(BridgeError::TopicTooLong {
                len: topic.len(),
                max: self.max_topic_length,
                topic,
            });
        }
        Ok(topic)
    }

    /// Topic plus payload, with both length limits enforced
    pub fn outbound(
        &self,
        node_id: u8,
        device_id: u8,
        field: Field,
        payload: String,
    ) -> Result<OutboundMessage> {
        let topic = self.output_topic(node_id, device_id, field)?;
        if payload.len() > self.max_message_length {
            return Err(BridgeError::MessageTooLong {
                len: payload.len(),
                max: self.max_message_length,
            });
        }
        Ok(OutboundMessage {
            topic,
            payload: Bytes::from(payload),
        })
    }

    /// Subscription filter for commands to this network
    pub fn input_filter(&self) -> String {
        format!("{}/INPUT/Network{:03}/#", self.root, self.network_id)
    }

    /// Parse `<root>/INPUT/Network<NNN>/Node<NNN>/Device<NNN>/<Field>`
    pub fn parse_inbound(&self, msg: &InboundMessage) -> Result<InboundCommand> {
        let invalid = || BridgeError::InvalidTopic(msg.topic.clone());

        let rest = msg
            .topic
            .strip_prefix(self.root.as_str())
            .and_then(|r| r.strip_prefix("/INPUT/"))
            .ok_or_else(invalid)?;

        let segments: Vec<&str> = rest.split('/').collect();
        let [network, node, device, field] = segments.as_slice() else {
            return Err(invalid());
        };

        let network = numbered(network, "Network").ok_or_else(invalid)?;
        if network != u16::from(self.network_id) {
            return Err(BridgeError::WrongNetwork {
                expected: self.network_id,
                got: network,
            });
        }

        let node_id = numbered(node, "Node")
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(invalid)?;
        let device_id = numbered(device, "Device")
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(invalid)?;

        let payload = msg.payload_str();
        let bad_payload = || BridgeError::InvalidPayload {
            field: field.to_string(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
        };

        let kind = match Field::from_segment(field) {
            Some(Field::TemperatureC) => {
                let celsius = payload
                    .and_then(|p| p.parse::<f32>().ok())
                    .filter(|c| c.is_finite())
                    .ok_or_else(bad_payload)?;
                CommandKind::Temperature(celsius)
            }
            Some(Field::Test) | Some(Field::Sequence) => match payload {
                Some("") => CommandKind::Test(None),
                Some(p) => CommandKind::Test(Some(p.parse::<u8>().map_err(|_| bad_payload())?)),
                None => return Err(bad_payload()),
            },
            Some(Field::Rssi) | None => {
                return Err(BridgeError::UnsupportedField(field.to_string()));
            }
        };

        Ok(InboundCommand {
            node_id,
            device_id,
            kind,
        })
    }
}

/// Parse `<prefix><digits>`, e.g. `Node005`
fn numbered(segment: &str, prefix: &str) -> Option<u16> {
    let digits = segment.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Payload;

    fn translator() -> TopicTranslator {
        TopicTranslator::new(&MqttConfig::default(), 101)
    }

    #[test]
    fn test_output_topic() {
        assert_eq!(
            translator().output_topic(5, 2, Field::TemperatureC).unwrap(),
            "RFM69HomeAutomation/OUTPUT/Network101/Node005/Device002/TemperatureC"
        );
        assert_eq!(
            translator().output_topic(1, 0, Field::Rssi).unwrap(),
            "RFM69HomeAutomation/OUTPUT/Network101/Node001/Device000/RSSI"
        );
    }

    #[test]
    fn test_payload_formats() {
        assert_eq!(format_rssi(-45), "-045");
        assert_eq!(format_rssi(12), "+012");
        assert_eq!(format_rssi(-100), "-100");
        assert_eq!(format_sequence(7), "007");
        assert_eq!(format_sequence(255), "255");
        assert_eq!(format_temperature(23.456), "+023.46");
        assert_eq!(format_temperature(-4.5), "-004.50");
        assert_eq!(format_temperature(0.0), "+000.00");
    }

    #[test]
    fn test_format_non_finite_temperature() {
        assert_eq!(format_temperature(f32::NAN), "   +nan");
        assert_eq!(format_temperature(f32::INFINITY), "   +inf");
        assert_eq!(format_temperature(f32::NEG_INFINITY), "   -inf");
        assert_eq!(format_temperature(f32::NAN).len(), 7);
    }

    #[test]
    fn test_topic_too_long() {
        let mut mqtt = MqttConfig::default();
        mqtt.topic_root = "x".repeat(120);
        let translator = TopicTranslator::new(&mqtt, 101);

        let err = translator
            .output_topic(5, 2, Field::TemperatureC)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.error_code(), "TOPIC_TOO_LONG");
    }

    #[test]
    fn test_message_too_long() {
        let mut mqtt = MqttConfig::default();
        mqtt.max_message_length = 4;
        let translator = TopicTranslator::new(&mqtt, 101);

        assert!(translator
            .outbound(5, 2, Field::Sequence, format_sequence(7))
            .is_ok());
        let err = translator
            .outbound(5, 2, Field::TemperatureC, format_temperature(21.0))
            .unwrap_err();
        assert!(matches!(err, BridgeError::MessageTooLong { len: 7, max: 4 }));
    }

    #[test]
    fn test_input_filter() {
        assert_eq!(
            translator().input_filter(),
            "RFM69HomeAutomation/INPUT/Network101/#"
        );
    }

    #[test]
    fn test_parse_temperature_command() {
        let msg = InboundMessage::new(
            "RFM69HomeAutomation/INPUT/Network101/Node002/Device010/TemperatureC",
            "99.0",
        );
        let cmd = translator().parse_inbound(&msg).unwrap();
        assert_eq!(cmd.node_id, 2);
        assert_eq!(cmd.device_id, 10);
        assert_eq!(cmd.kind, CommandKind::Temperature(99.0));

        let packet = cmd.to_packet(1, 100);
        assert_eq!(packet.source_node_id, 1);
        assert_eq!(packet.target_node_id, 2);
        assert_eq!(
            packet.payload,
            Payload::Temperature {
                device_id: 10,
                sequence: 100,
                celsius: 99.0
            }
        );
    }

    #[test]
    fn test_parse_test_command() {
        let t = translator();
        let explicit = InboundMessage::new(
            "RFM69HomeAutomation/INPUT/Network101/Node003/Device000/Test",
            "42",
        );
        let cmd = t.parse_inbound(&explicit).unwrap();
        assert_eq!(cmd.kind, CommandKind::Test(Some(42)));
        assert_eq!(cmd.to_packet(1, 9).payload, Payload::Test { sequence: 42 });

        let empty = InboundMessage::new(
            "RFM69HomeAutomation/INPUT/Network101/Node003/Device000/Sequence",
            "",
        );
        let cmd = t.parse_inbound(&empty).unwrap();
        assert_eq!(cmd.kind, CommandKind::Test(None));
        assert_eq!(cmd.to_packet(1, 9).payload, Payload::Test { sequence: 9 });
    }

    #[test]
    fn test_parse_rejects() {
        let t = translator();
        let cases = [
            ("Other/INPUT/Network101/Node002/Device001/TemperatureC", "1.0", "INVALID_TOPIC"),
            ("RFM69HomeAutomation/OUTPUT/Network101/Node002/Device001/TemperatureC", "1.0", "INVALID_TOPIC"),
            ("RFM69HomeAutomation/INPUT/Network102/Node002/Device001/TemperatureC", "1.0", "WRONG_NETWORK"),
            ("RFM69HomeAutomation/INPUT/Network101/Node2x/Device001/TemperatureC", "1.0", "INVALID_TOPIC"),
            ("RFM69HomeAutomation/INPUT/Network101/Node256/Device001/TemperatureC", "1.0", "INVALID_TOPIC"),
            ("RFM69HomeAutomation/INPUT/Network101/Node002/Device001", "1.0", "INVALID_TOPIC"),
            ("RFM69HomeAutomation/INPUT/Network101/Node002/Device001/Humidity", "1.0", "UNSUPPORTED_FIELD"),
            ("RFM69HomeAutomation/INPUT/Network101/Node002/Device001/RSSI", "-40", "UNSUPPORTED_FIELD"),
            ("RFM69HomeAutomation/INPUT/Network101/Node002/Device001/TemperatureC", "warm", "INVALID_PAYLOAD"),
            ("RFM69HomeAutomation/INPUT/Network101/Node002/Device001/TemperatureC", "NaN", "INVALID_PAYLOAD"),
            ("RFM69HomeAutomation/INPUT/Network101/Node002/Device001/Test", "300", "INVALID_PAYLOAD"),
        ];

        for (topic, payload, code) in cases {
            let err = t
                .parse_inbound(&InboundMessage::new(topic, payload.to_string()))
                .unwrap_err();
            assert_eq!(err.error_code(), code, "topic {}", topic);
            assert!(err.is_recoverable());
        }
    }
}
