//! Radio transceiver abstraction
//!
//! The bridge never touches SPI or registers. It talks to an RFM69 driver
//! through [`RadioDriver`], which a hardware backend, a simulator, or a test
//! mock implements.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Length of an RFM69 AES key in bytes
pub const ENCRYPTION_KEY_LEN: usize = 16;

/// Trait for RFM69 radio drivers
#[async_trait]
pub trait RadioDriver: Send {
    /// First-time initialization with frequency, node and network
    async fn initialize(&mut self, settings: &RadioSettings) -> Result<()>;

    /// Reset the chip and reapply frequency, node and network
    async fn restart(&mut self, settings: &RadioSettings) -> Result<()>;

    /// Enable the high-power amplifier (RFM69HW/HCW only)
    async fn set_high_power(&mut self) -> Result<()>;

    /// Set or clear the AES key
    async fn encrypt(&mut self, key: Option<&EncryptionKey>) -> Result<()>;

    /// Receive frames regardless of target address
    async fn promiscuous(&mut self, enabled: bool) -> Result<()>;

    /// Poll for a completed reception
    ///
    /// Returns an owned copy of the receive buffer, so later sends (such as
    /// the acknowledgment) cannot overwrite it.
    async fn receive_done(&mut self) -> Result<Option<ReceivedFrame>>;

    /// Acknowledge the most recent reception from `to`
    async fn send_ack(&mut self, to: u8) -> Result<()>;

    /// Send with acknowledgment request, retrying until acked
    ///
    /// Returns `Ok(false)` when every attempt went unacknowledged.
    async fn send_with_retry(
        &mut self,
        target: u8,
        data: &[u8],
        retries: u8,
        retry_timeout: Duration,
    ) -> Result<bool>;

    /// Read the on-chip temperature sensor, in Celsius, with a calibration offset
    async fn read_temperature(&mut self, calibration: i8) -> Result<f32>;

    /// Get the driver name (for logging)
    fn name(&self) -> &str;
}

/// A frame returned by [`RadioDriver::receive_done`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFrame {
    /// Payload bytes
    pub data: Bytes,
    /// Link-layer sender node id
    pub sender: u8,
    /// Link-layer target node id
    pub target: u8,
    /// Whether the sender asked for an acknowledgment
    pub ack_requested: bool,
    /// Received signal strength in dBm
    pub rssi: i16,
}

impl ReceivedFrame {
    /// Create a frame without an ack request
    pub fn new(data: impl Into<Bytes>, sender: u8, target: u8, rssi: i16) -> Self {
        Self {
            data: data.into(),
            sender,
            target,
            ack_requested: false,
            rssi,
        }
    }

    /// Mark the frame as requesting an acknowledgment
    pub fn with_ack_request(mut self) -> Self {
        self.ack_requested = true;
        self
    }
}

/// Carrier frequency band of the module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum FrequencyBand {
    /// 315 MHz
    Mhz315,
    /// 433 MHz
    #[default]
    Mhz433,
    /// 868 MHz
    Mhz868,
    /// 915 MHz
    Mhz915,
}

impl FrequencyBand {
    /// Band center in MHz
    pub fn mhz(&self) -> u16 {
        match self {
            FrequencyBand::Mhz315 => 315,
            FrequencyBand::Mhz433 => 433,
            FrequencyBand::Mhz868 => 868,
            FrequencyBand::Mhz915 => 915,
        }
    }
}

impl TryFrom<u16> for FrequencyBand {
    type Error = BridgeError;

    fn try_from(mhz: u16) -> Result<Self> {
        match mhz {
            315 => Ok(FrequencyBand::Mhz315),
            433 => Ok(FrequencyBand::Mhz433),
            868 => Ok(FrequencyBand::Mhz868),
            915 => Ok(FrequencyBand::Mhz915),
            other => Err(BridgeError::InvalidConfig(format!(
                "unsupported frequency band {} MHz (expected 315, 433, 868 or 915)",
                other
            ))),
        }
    }
}

impl From<FrequencyBand> for u16 {
    fn from(band: FrequencyBand) -> u16 {
        band.mhz()
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MHz", self.mhz())
    }
}

/// 16-byte AES key shared by every node on the network
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_LEN]);

impl EncryptionKey {
    /// Create a key from a 16-byte string
    pub fn new(key: &str) -> Result<Self> {
        let bytes: [u8; ENCRYPTION_KEY_LEN] = key.as_bytes().try_into().map_err(|_| {
            BridgeError::InvalidConfig(format!(
                "encryption key must be exactly {} bytes, got {}",
                ENCRYPTION_KEY_LEN,
                key.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_LEN] {
        &self.0
    }
}

impl TryFrom<String> for EncryptionKey {
    type Error = BridgeError;

    fn try_from(key: String) -> Result<Self> {
        Self::new(&key)
    }
}

impl From<EncryptionKey> for String {
    fn from(key: EncryptionKey) -> String {
        String::from_utf8_lossy(&key.0).into_owned()
    }
}

// Keys never end up in logs
impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Everything needed to (re)initialize the radio
#[derive(Debug, Clone, PartialEq)]
pub struct RadioSettings {
    /// Frequency band
    pub frequency: FrequencyBand,
    /// This node's id
    pub node_id: u8,
    /// Network id
    pub network_id: u8,
    /// Enable the high-power amplifier
    pub high_power: bool,
    /// AES key, `None` for unencrypted operation
    pub encryption_key: Option<EncryptionKey>,
    /// Receive frames addressed to other nodes
    pub promiscuous: bool,
}

/// Full radio configuration sequence
///
/// Restart, high power (if enabled), encryption, promiscuous mode. Used at
/// startup after [`RadioDriver::initialize`] and whenever the link watchdog
/// fires.
pub async fn configure_radio<R>(radio: &mut R, settings: &RadioSettings) -> Result<()>
where
    R: RadioDriver + ?Sized,
{
    debug!(radio = radio.name(), "Configuring radio");

    radio.restart(settings).await?;
    if settings.high_power {
        radio.set_high_power().await?;
    }
    radio.encrypt(settings.encryption_key.as_ref()).await?;
    radio.promiscuous(settings.promiscuous).await?;

    info!(
        radio = radio.name(),
        frequency = %settings.frequency,
        node_id = settings.node_id,
        network_id = settings.network_id,
        encrypted = settings.encryption_key.is_some(),
        promiscuous = settings.promiscuous,
        "Radio configured"
    );
    Ok(())
}
