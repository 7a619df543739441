//! Configuration types for the RFM69 gateway bridge
//!
//! The configuration is split by collaborator: radio, link watchdog,
//! MQTT broker, and bridge loop behavior. Every field has a default, so a
//! TOML file only needs the settings that differ.

use crate::error::{BridgeError, Result};
use crate::radio::{EncryptionKey, FrequencyBand, RadioSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default network id
pub const DEFAULT_NETWORK_ID: u8 = 101;

/// Default node id of the gateway on its network
pub const DEFAULT_GATEWAY_NODE_ID: u8 = 1;

/// RFM69 broadcast address, never a valid node id
pub const BROADCAST_NODE_ID: u8 = 255;

/// Default on-chip temperature calibration offset
pub const DEFAULT_TEMPERATURE_CALIBRATION: i8 = -4;

/// Default silence before the radio is re-initialized
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT topic root
pub const DEFAULT_TOPIC_ROOT: &str = "RFM69HomeAutomation";

/// Default MQTT client id
pub const DEFAULT_CLIENT_ID: &str = "RFM69HomePiGateway";

/// Longest client id an MQTT 3.1 broker must accept
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Default maximum topic and message length
pub const DEFAULT_MAX_MQTT_LENGTH: usize = 128;

/// Shortest keepalive the MQTT client accepts
pub const MIN_KEEPALIVE: Duration = Duration::from_secs(5);

/// Default dump width
pub const DEFAULT_DUMP_WIDTH: usize = 16;

/// Main configuration for the gateway bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Radio settings
    #[serde(default)]
    pub radio: RadioConfig,

    /// Link watchdog settings
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Bridge loop settings
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Radio and network identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Network id shared by all nodes
    #[serde(default = "default_network_id")]
    pub network_id: u8,

    /// This gateway's node id
    #[serde(default = "default_gateway_node_id")]
    pub node_id: u8,

    /// Module frequency band in MHz (315, 433, 868 or 915)
    #[serde(default)]
    pub frequency: FrequencyBand,

    /// 16-character AES key; omit to disable encryption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<EncryptionKey>,

    /// Module is a high-power variant (RFM69HW/HCW)
    #[serde(default = "default_true")]
    pub high_power: bool,

    /// Listen to frames addressed to other nodes
    #[serde(default = "default_true")]
    pub promiscuous: bool,

    /// Offset added to on-chip temperature readings
    #[serde(default = "default_temperature_calibration")]
    pub temperature_calibration: i8,
}

fn default_network_id() -> u8 {
    DEFAULT_NETWORK_ID
}

fn default_gateway_node_id() -> u8 {
    DEFAULT_GATEWAY_NODE_ID
}

fn default_true() -> bool {
    true
}

fn default_temperature_calibration() -> i8 {
    DEFAULT_TEMPERATURE_CALIBRATION
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            network_id: DEFAULT_NETWORK_ID,
            node_id: DEFAULT_GATEWAY_NODE_ID,
            frequency: FrequencyBand::default(),
            encryption_key: None,
            high_power: true,
            promiscuous: true,
            temperature_calibration: DEFAULT_TEMPERATURE_CALIBRATION,
        }
    }
}

/// Link watchdog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Silence after which the radio is re-initialized
    #[serde(with = "humantime_serde", default = "default_watchdog_timeout")]
    pub timeout: Duration,
}

fn default_watchdog_timeout() -> Duration {
    DEFAULT_WATCHDOG_TIMEOUT
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WATCHDOG_TIMEOUT,
        }
    }
}

/// MQTT broker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Keepalive interval
    #[serde(with = "humantime_serde", default = "default_keepalive")]
    pub keepalive: Duration,

    /// Client id presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// First topic level of every published and subscribed topic
    #[serde(default = "default_topic_root")]
    pub topic_root: String,

    /// Upper bound on each bus poll
    #[serde(with = "humantime_serde", default = "default_poll_timeout")]
    pub poll_timeout: Duration,

    /// Longest topic the bridge will publish
    #[serde(default = "default_max_length")]
    pub max_topic_length: usize,

    /// Longest message the bridge will publish
    #[serde(default = "default_max_length")]
    pub max_message_length: usize,

    /// Wait between broker reconnection attempts
    #[serde(with = "humantime_serde", default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_keepalive() -> Duration {
    Duration::from_secs(60)
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_topic_root() -> String {
    DEFAULT_TOPIC_ROOT.to_string()
}

fn default_poll_timeout() -> Duration {
    Duration::from_millis(60)
}

fn default_max_length() -> usize {
    DEFAULT_MAX_MQTT_LENGTH
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_MQTT_PORT,
            keepalive: default_keepalive(),
            client_id: default_client_id(),
            topic_root: default_topic_root(),
            poll_timeout: default_poll_timeout(),
            max_topic_length: DEFAULT_MAX_MQTT_LENGTH,
            max_message_length: DEFAULT_MAX_MQTT_LENGTH,
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

/// Bridge loop behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interval between gateway temperature self-reports
    #[serde(with = "humantime_serde", default = "default_self_report_interval")]
    pub self_report_interval: Duration,

    /// Half-duplex turnaround before a link probe is sent
    #[serde(with = "humantime_serde", default = "default_probe_delay")]
    pub probe_delay: Duration,

    /// Retries for a link probe
    #[serde(default = "default_retries")]
    pub probe_retries: u8,

    /// Wait for an ack between probe retries
    #[serde(with = "humantime_serde", default = "default_retry_timeout")]
    pub probe_retry_timeout: Duration,

    /// Retries for a command relayed from the bus
    #[serde(default = "default_retries")]
    pub command_retries: u8,

    /// Wait for an ack between command retries
    #[serde(with = "humantime_serde", default = "default_retry_timeout")]
    pub command_retry_timeout: Duration,

    /// Values per line in diagnostic dumps (max 16)
    #[serde(default = "default_dump_width")]
    pub dump_width: usize,
}

fn default_self_report_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_probe_delay() -> Duration {
    Duration::from_millis(3)
}

fn default_retries() -> u8 {
    2
}

fn default_retry_timeout() -> Duration {
    Duration::from_millis(40)
}

fn default_dump_width() -> usize {
    DEFAULT_DUMP_WIDTH
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            self_report_interval: default_self_report_interval(),
            probe_delay: default_probe_delay(),
            probe_retries: default_retries(),
            probe_retry_timeout: default_retry_timeout(),
            command_retries: default_retries(),
            command_retry_timeout: default_retry_timeout(),
            dump_width: DEFAULT_DUMP_WIDTH,
        }
    }
}

impl GatewayConfig {
    /// Settings handed to the radio on every (re)initialization
    pub fn radio_settings(&self) -> RadioSettings {
        RadioSettings {
            frequency: self.radio.frequency,
            node_id: self.radio.node_id,
            network_id: self.radio.network_id,
            high_power: self.radio.high_power,
            encryption_key: self.radio.encryption_key.clone(),
            promiscuous: self.radio.promiscuous,
        }
    }

    /// Reject configurations the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: impl Into<String>) -> Result<()> {
            Err(BridgeError::InvalidConfig(msg.into()))
        }

        if self.radio.node_id == BROADCAST_NODE_ID {
            return invalid("radio.node_id 255 is the broadcast address");
        }
        if self.watchdog.timeout.is_zero() {
            return invalid("watchdog.timeout must be greater than zero");
        }

        let mqtt = &self.mqtt;
        if mqtt.host.trim().is_empty() {
            return invalid("mqtt.host must not be empty");
        }
        if mqtt.port == 0 {
            return invalid("mqtt.port must not be zero");
        }
        if mqtt.keepalive < MIN_KEEPALIVE {
            return invalid(format!(
                "mqtt.keepalive must be at least {}s",
                MIN_KEEPALIVE.as_secs()
            ));
        }
        if mqtt.client_id.is_empty() {
            return invalid("mqtt.client_id must not be empty");
        }
        if mqtt.client_id.len() > MAX_CLIENT_ID_LEN {
            return invalid(format!(
                "mqtt.client_id is {} characters, brokers only accept {}",
                mqtt.client_id.len(),
                MAX_CLIENT_ID_LEN
            ));
        }
        if mqtt.topic_root.is_empty() {
            return invalid("mqtt.topic_root must not be empty");
        }
        if mqtt.topic_root.contains(&['#', '+'][..]) || mqtt.topic_root.ends_with('/') {
            return invalid(format!(
                "mqtt.topic_root {:?} must not contain wildcards or a trailing '/'",
                mqtt.topic_root
            ));
        }
        if mqtt.poll_timeout.is_zero() {
            return invalid("mqtt.poll_timeout must be greater than zero");
        }
        if mqtt.max_topic_length == 0 || mqtt.max_message_length == 0 {
            return invalid("mqtt maximum topic and message lengths must be non-zero");
        }

        if self.bridge.self_report_interval.is_zero() {
            return invalid("bridge.self_report_interval must be greater than zero");
        }

        Ok(())
    }
}

/// Builder for GatewayConfig
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set network id
    pub fn network_id(mut self, id: u8) -> Self {
        self.config.radio.network_id = id;
        self
    }

    /// Set the gateway's node id
    pub fn node_id(mut self, id: u8) -> Self {
        self.config.radio.node_id = id;
        self
    }

    /// Set frequency band
    pub fn frequency(mut self, band: FrequencyBand) -> Self {
        self.config.radio.frequency = band;
        self
    }

    /// Set or clear the encryption key
    pub fn encryption_key(mut self, key: Option<EncryptionKey>) -> Self {
        self.config.radio.encryption_key = key;
        self
    }

    /// Enable or disable promiscuous reception
    pub fn promiscuous(mut self, enabled: bool) -> Self {
        self.config.radio.promiscuous = enabled;
        self
    }

    /// Set temperature calibration offset
    pub fn temperature_calibration(mut self, offset: i8) -> Self {
        self.config.radio.temperature_calibration = offset;
        self
    }

    /// Set watchdog timeout
    pub fn watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.config.watchdog.timeout = timeout;
        self
    }

    /// Set broker host and port
    pub fn broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.mqtt.host = host.into();
        self.config.mqtt.port = port;
        self
    }

    /// Set MQTT client id
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.mqtt.client_id = id.into();
        self
    }

    /// Set topic root
    pub fn topic_root(mut self, root: impl Into<String>) -> Self {
        self.config.mqtt.topic_root = root.into();
        self
    }

    /// Set bus poll timeout
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.mqtt.poll_timeout = timeout;
        self
    }

    /// Set maximum topic and message length
    pub fn max_mqtt_lengths(mut self, topic: usize, message: usize) -> Self {
        self.config.mqtt.max_topic_length = topic;
        self.config.mqtt.max_message_length = message;
        self
    }

    /// Set self-report interval
    pub fn self_report_interval(mut self, interval: Duration) -> Self {
        self.config.bridge.self_report_interval = interval;
        self
    }

    /// Build the configuration
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

/// Humantime serialization for Duration
///
/// Use as `#[serde(with = "rfm69_bridge::config::humantime_serde")]`.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as a humantime string such as `"30m"`
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    /// Parse a humantime string such as `"60ms"`
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.radio.network_id, 101);
        assert_eq!(config.radio.node_id, 1);
        assert_eq!(config.radio.temperature_calibration, -4);
        assert_eq!(config.watchdog.timeout, Duration::from_millis(1_800_000));
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.poll_timeout, Duration::from_millis(60));
        assert_eq!(config.bridge.self_report_interval, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = GatewayConfigBuilder::new()
            .network_id(7)
            .node_id(3)
            .broker("mqtt.lan", 1884)
            .topic_root("Home")
            .watchdog_timeout(Duration::from_secs(60))
            .build();

        assert_eq!(config.radio.network_id, 7);
        assert_eq!(config.radio.node_id, 3);
        assert_eq!(config.mqtt.host, "mqtt.lan");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.topic_root, "Home");

        let settings = config.radio_settings();
        assert_eq!(settings.node_id, 3);
        assert_eq!(settings.network_id, 7);
    }

    #[test]
    fn test_validate_rejects() {
        let zero_watchdog = GatewayConfigBuilder::new()
            .watchdog_timeout(Duration::ZERO)
            .build();
        assert!(zero_watchdog.validate().is_err());

        let empty_root = GatewayConfigBuilder::new().topic_root("").build();
        assert!(empty_root.validate().is_err());

        let wildcard_root = GatewayConfigBuilder::new().topic_root("home/#").build();
        assert!(wildcard_root.validate().is_err());

        let long_id = GatewayConfigBuilder::new()
            .client_id("a-client-id-that-is-way-too-long")
            .build();
        assert!(long_id.validate().is_err());

        let broadcast = GatewayConfigBuilder::new().node_id(255).build();
        assert!(broadcast.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [radio]
            network_id = 42
            frequency = 868
            encryption_key = "sampleEncryptKey"

            [watchdog]
            timeout = "10m"

            [mqtt]
            host = "broker.local"
            poll_timeout = "100ms"
        "#;

        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.radio.network_id, 42);
        assert_eq!(config.radio.node_id, DEFAULT_GATEWAY_NODE_ID);
        assert_eq!(config.radio.frequency, FrequencyBand::Mhz868);
        assert!(config.radio.encryption_key.is_some());
        assert_eq!(config.watchdog.timeout, Duration::from_secs(600));
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.mqtt.topic_root, DEFAULT_TOPIC_ROOT);
    }

    #[test]
    fn test_config_toml_rejects_bad_values() {
        assert!(toml::from_str::<GatewayConfig>("[radio]\nfrequency = 900").is_err());
        assert!(toml::from_str::<GatewayConfig>("[radio]\nencryption_key = \"short\"").is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = GatewayConfigBuilder::new()
            .encryption_key(Some(EncryptionKey::new("sampleEncryptKey").unwrap()))
            .build();
        let text = toml::to_string(&config).unwrap();
        let back: GatewayConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
