//! Binary wire format for RFM69 sensor packets
//!
//! Packets are fixed-size, packed, little-endian records. There is no
//! length field: the buffer size alone decides whether a buffer can be a
//! packet of a given protocol version, so the length is validated before
//! any tag is read.
//!
//! ## Protocol version 1 (10 bytes)
//!
//! | offset | field |
//! |--------|-------|
//! | 0      | protocol version (`1`) |
//! | 1      | data type (`1` = Temperature, `2` = Test) |
//! | 2      | source node id |
//! | 3      | target node id |
//! | 4      | Temperature: device id / Test: sequence |
//! | 5      | Temperature: sequence / Test: padding |
//! | 6..10  | Temperature: celsius (`f32`) / Test: padding |

use crate::error::DecodeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encoded size of every protocol version 1 packet
pub const PACKET_SIZE_V1: usize = 10;

/// Protocol version tag, selecting the layout table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolVersion {
    /// Original fixed 10-byte layout
    V1 = 1,
}

impl ProtocolVersion {
    /// Fixed packet size for this version
    pub const fn packet_size(self) -> usize {
        match self {
            ProtocolVersion::V1 => PACKET_SIZE_V1,
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProtocolVersion::V1),
            other => Err(DecodeError::UnknownProtocolVersion(other)),
        }
    }
}

/// Data type tag, selecting the payload shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Temperature reading from a device on a node
    Temperature = 1,
    /// Link test probe
    Test = 2,
}

impl DataType {
    fn from_tag(version: ProtocolVersion, tag: u8) -> Result<Self, DecodeError> {
        match (version, tag) {
            (ProtocolVersion::V1, 1) => Ok(DataType::Temperature),
            (ProtocolVersion::V1, 2) => Ok(DataType::Test),
            (version, data_type) => Err(DecodeError::UnknownDataType {
                version: version as u8,
                data_type,
            }),
        }
    }
}

/// Packet payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    /// Temperature reading
    Temperature {
        /// Device on the source node that took the reading
        device_id: u8,
        /// Sender's wrapping sequence number
        sequence: u8,
        /// Reading in degrees Celsius
        celsius: f32,
    },
    /// Link test probe
    Test {
        /// Sender's wrapping sequence number
        sequence: u8,
    },
}

impl Payload {
    /// Data type tag for this payload
    pub fn data_type(&self) -> DataType {
        match self {
            Payload::Temperature { .. } => DataType::Temperature,
            Payload::Test { .. } => DataType::Test,
        }
    }
}

/// A decoded radio packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packet {
    /// Protocol version the packet was (or will be) encoded with
    pub version: ProtocolVersion,
    /// Node that built the packet
    pub source_node_id: u8,
    /// Node the packet is addressed to
    pub target_node_id: u8,
    /// Typed payload
    pub payload: Payload,
}

impl Packet {
    /// Build a version 1 temperature packet
    pub fn temperature(source: u8, target: u8, device_id: u8, sequence: u8, celsius: f32) -> Self {
        Self {
            version: ProtocolVersion::V1,
            source_node_id: source,
            target_node_id: target,
            payload: Payload::Temperature {
                device_id,
                sequence,
                celsius,
            },
        }
    }

    /// Build a version 1 test packet
    pub fn test(source: u8, target: u8, sequence: u8) -> Self {
        Self {
            version: ProtocolVersion::V1,
            source_node_id: source,
            target_node_id: target,
            payload: Payload::Test { sequence },
        }
    }

    /// Data type tag for this packet
    pub fn data_type(&self) -> DataType {
        self.payload.data_type()
    }
}

/// Recognized fixed packet sizes, one per protocol version
const KNOWN_SIZES: [usize; 1] = [ProtocolVersion::V1.packet_size()];

/// Decode and validate a received buffer
///
/// Checks are ordered: length, then protocol version, then data type.
/// Nothing is read from a buffer whose length does not match.
pub fn decode(data: &[u8]) -> Result<Packet, DecodeError> {
    if !KNOWN_SIZES.contains(&data.len()) {
        return Err(DecodeError::LengthMismatch {
            len: data.len(),
            expected: PACKET_SIZE_V1,
        });
    }

    let mut buf = data;
    let version = ProtocolVersion::try_from(buf.get_u8())?;
    if data.len() != version.packet_size() {
        return Err(DecodeError::LengthMismatch {
            len: data.len(),
            expected: version.packet_size(),
        });
    }

    let data_type = DataType::from_tag(version, buf.get_u8())?;
    let source_node_id = buf.get_u8();
    let target_node_id = buf.get_u8();

    let payload = match data_type {
        DataType::Temperature => Payload::Temperature {
            device_id: buf.get_u8(),
            sequence: buf.get_u8(),
            celsius: buf.get_f32_le(),
        },
        DataType::Test => Payload::Test {
            sequence: buf.get_u8(),
        },
    };

    Ok(Packet {
        version,
        source_node_id,
        target_node_id,
        payload,
    })
}

/// Encode a packet into its fixed-size wire form
pub fn encode(packet: &Packet) -> Bytes {
    let size = packet.version.packet_size();
    let mut buf = BytesMut::with_capacity(size);

    buf.put_u8(packet.version as u8);
    buf.put_u8(packet.data_type() as u8);
    buf.put_u8(packet.source_node_id);
    buf.put_u8(packet.target_node_id);

    match packet.payload {
        Payload::Temperature {
            device_id,
            sequence,
            celsius,
        } => {
            buf.put_u8(device_id);
            buf.put_u8(sequence);
            buf.put_f32_le(celsius);
        }
        Payload::Test { sequence } => {
            buf.put_u8(sequence);
        }
    }

    // Pad to the fixed size
    buf.resize(size, 0);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_round_trip() {
        let packet = Packet::temperature(2, 1, 10, 255, -17.125);
        let encoded = encode(&packet);
        assert_eq!(encoded.len(), PACKET_SIZE_V1);

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.source_node_id, 2);
        assert_eq!(decoded.target_node_id, 1);
        match decoded.payload {
            Payload::Temperature {
                device_id,
                sequence,
                celsius,
            } => {
                assert_eq!(device_id, 10);
                assert_eq!(sequence, 255);
                assert_eq!(celsius.to_bits(), (-17.125f32).to_bits());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_temperature_wire_layout() {
        let encoded = encode(&Packet::temperature(5, 1, 2, 7, 1.0));
        assert_eq!(
            encoded.as_ref(),
            &[1, 1, 5, 1, 2, 7, 0x00, 0x00, 0x80, 0x3F]
        );
    }

    #[test]
    fn test_test_packet_padded() {
        let encoded = encode(&Packet::test(1, 2, 42));
        assert_eq!(encoded.as_ref(), &[1, 2, 1, 2, 42, 0, 0, 0, 0, 0]);
        assert_eq!(
            decode(&encoded).unwrap().payload,
            Payload::Test { sequence: 42 }
        );
    }

    #[test]
    fn test_length_mismatch() {
        for len in [0usize, 1, 9, 11, 61] {
            let buf = vec![1u8; len];
            assert_eq!(
                decode(&buf),
                Err(DecodeError::LengthMismatch {
                    len,
                    expected: PACKET_SIZE_V1
                })
            );
        }
    }

    #[test]
    fn test_length_checked_before_tags() {
        // Bad version and bad length: length wins
        let buf = [9u8, 9, 0, 0];
        assert!(matches!(
            decode(&buf),
            Err(DecodeError::LengthMismatch { len: 4, .. })
        ));
    }

    #[test]
    fn test_unknown_version() {
        let mut buf = encode(&Packet::test(1, 2, 0)).to_vec();
        buf[0] = 7;
        assert_eq!(decode(&buf), Err(DecodeError::UnknownProtocolVersion(7)));
    }

    #[test]
    fn test_unknown_data_type() {
        let mut buf = encode(&Packet::test(1, 2, 0)).to_vec();
        buf[1] = 3;
        assert_eq!(
            decode(&buf),
            Err(DecodeError::UnknownDataType {
                version: 1,
                data_type: 3
            })
        );
    }

    #[test]
    fn test_tag_conversions() {
        assert_eq!(ProtocolVersion::try_from(1), Ok(ProtocolVersion::V1));
        assert!(ProtocolVersion::try_from(0).is_err());
        assert_eq!(DataType::Temperature as u8, 1);
        assert_eq!(DataType::Test as u8, 2);
    }
}
