//! Error types for RFM69 gateway bridge operations
//!
//! Errors fall into three groups, and the bridge loop treats them
//! differently:
//!
//! - **Recoverable**: bad radio data, failed acknowledgments, transient bus
//!   failures, malformed inbound commands. Logged; the loop continues.
//! - **Fatal**: a formatted topic or message exceeding its maximum length.
//!   The loop stops before anything is published.
//! - **Startup**: invalid configuration or an unreachable broker. Returned
//!   before the loop is entered.

use thiserror::Error;

/// Reasons a received buffer is not a valid packet
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer length does not match any recognized fixed packet size
    #[error("Length mismatch: got {len} bytes, expected {expected}")]
    LengthMismatch {
        /// Received length
        len: usize,
        /// Fixed size of the recognized packet shape
        expected: usize,
    },

    /// Protocol version tag outside the recognized set
    #[error("Unknown protocol version: {0:03}")]
    UnknownProtocolVersion(u8),

    /// Data type tag outside the recognized set for this version
    #[error("Unknown data type {data_type:03} for protocol version {version:03}")]
    UnknownDataType {
        /// Protocol version the packet claimed
        version: u8,
        /// Unrecognized data type tag
        data_type: u8,
    },
}

/// Main error type for gateway bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Packet Errors =====
    /// Received buffer failed to decode
    #[error("Packet decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Packet header disagrees with the link-layer addressing
    #[error("Address mismatch: header source {header:03}, radio sender {sender:03}")]
    AddressMismatch {
        /// Source node id carried in the packet header
        header: u8,
        /// Sender id reported by the radio
        sender: u8,
    },

    /// Temperature reading is NaN or infinite
    #[error("Non-finite temperature {value} from node {node:03}")]
    NonFiniteReading {
        /// Node the reading belongs to
        node: u8,
        /// The reading
        value: f32,
    },

    // ===== Buffer Safety (fatal) =====
    /// Formatted topic exceeds the maximum topic length
    #[error("MQTT topic too large ({len} > {max}), probable buffer overflow: {topic}")]
    TopicTooLong {
        /// The offending topic
        topic: String,
        /// Its length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Formatted message exceeds the maximum message length
    #[error("MQTT message too large ({len} > {max}), probable buffer overflow")]
    MessageTooLong {
        /// Its length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    // ===== Inbound Command Errors =====
    /// Inbound topic does not follow the input topic grammar
    #[error("Invalid inbound topic: {0}")]
    InvalidTopic(String),

    /// Inbound topic addresses another network
    #[error("Inbound topic for network {got:03}, this gateway is on {expected:03}")]
    WrongNetwork {
        /// Gateway network id
        expected: u8,
        /// Network id in the topic
        got: u16,
    },

    /// Inbound field is not a command the gateway can encode
    #[error("Unsupported inbound field: {0}")]
    UnsupportedField(String),

    /// Inbound payload could not be parsed for its field
    #[error("Invalid payload for {field}: {payload:?}")]
    InvalidPayload {
        /// Field name from the topic
        field: String,
        /// Raw payload (lossy UTF-8)
        payload: String,
    },

    // ===== Collaborator Errors =====
    /// Radio driver failure
    #[error("Radio error: {0}")]
    Radio(String),

    /// Message bus failure
    #[error("Message bus error: {0}")]
    Bus(String),

    /// Could not connect to the message bus
    #[error("Message bus connection failed: {0}")]
    BusConnect(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== General Errors =====
    /// Bridge command channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

impl BridgeError {
    /// Buffer-safety violations that must end the process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::TopicTooLong { .. } | BridgeError::MessageTooLong { .. }
        )
    }

    /// Errors confined to a single loop iteration
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::Decode(_)
                | BridgeError::AddressMismatch { .. }
                | BridgeError::NonFiniteReading { .. }
                | BridgeError::InvalidTopic(_)
                | BridgeError::WrongNetwork { .. }
                | BridgeError::UnsupportedField(_)
                | BridgeError::InvalidPayload { .. }
                | BridgeError::Radio(_)
                | BridgeError::Bus(_)
        )
    }

    /// Check if this came from bad radio data
    pub fn is_packet_error(&self) -> bool {
        matches!(
            self,
            BridgeError::Decode(_)
                | BridgeError::AddressMismatch { .. }
                | BridgeError::NonFiniteReading { .. }
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::Decode(DecodeError::LengthMismatch { .. }) => "LENGTH_MISMATCH",
            BridgeError::Decode(DecodeError::UnknownProtocolVersion(_)) => "UNKNOWN_VERSION",
            BridgeError::Decode(DecodeError::UnknownDataType { .. }) => "UNKNOWN_DATA_TYPE",
            BridgeError::AddressMismatch { .. } => "ADDRESS_MISMATCH",
            BridgeError::NonFiniteReading { .. } => "NON_FINITE_READING",
            BridgeError::TopicTooLong { .. } => "TOPIC_TOO_LONG",
            BridgeError::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            BridgeError::InvalidTopic(_) => "INVALID_TOPIC",
            BridgeError::WrongNetwork { .. } => "WRONG_NETWORK",
            BridgeError::UnsupportedField(_) => "UNSUPPORTED_FIELD",
            BridgeError::InvalidPayload { .. } => "INVALID_PAYLOAD",
            BridgeError::Radio(_) => "RADIO_ERROR",
            BridgeError::Bus(_) => "BUS_ERROR",
            BridgeError::BusConnect(_) => "BUS_CONNECT_FAILED",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::ChannelClosed => "CHANNEL_CLOSED",
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = BridgeError::from(DecodeError::LengthMismatch {
            len: 7,
            expected: 10,
        });
        assert_eq!(err.error_code(), "LENGTH_MISMATCH");
        assert_eq!(
            BridgeError::from(DecodeError::UnknownProtocolVersion(9)).error_code(),
            "UNKNOWN_VERSION"
        );
    }

    #[test]
    fn test_buffer_safety_is_fatal() {
        let err = BridgeError::TopicTooLong {
            topic: "x".repeat(200),
            len: 200,
            max: 128,
        };
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert!(BridgeError::MessageTooLong { len: 200, max: 128 }.is_fatal());
    }

    #[test]
    fn test_packet_errors_are_recoverable() {
        let err = BridgeError::from(DecodeError::UnknownDataType {
            version: 1,
            data_type: 42,
        });
        assert!(err.is_recoverable());
        assert!(err.is_packet_error());
        assert!(!err.is_fatal());
        assert!(BridgeError::Bus("timeout".to_string()).is_recoverable());
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::LengthMismatch {
            len: 7,
            expected: 10,
        };
        assert!(err.to_string().contains('7'));
        assert!(err.to_string().contains("10"));
        assert_eq!(
            DecodeError::UnknownProtocolVersion(2).to_string(),
            "Unknown protocol version: 002"
        );
    }

    #[test]
    fn test_non_finite_reading_is_packet_error() {
        let err = BridgeError::NonFiniteReading {
            node: 5,
            value: f32::NAN,
        };
        assert_eq!(err.error_code(), "NON_FINITE_READING");
        assert!(err.is_packet_error());
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_startup_errors_are_neither() {
        let err = BridgeError::BusConnect("refused".to_string());
        assert!(!err.is_fatal());
        assert!(!err.is_recoverable());
    }
}
