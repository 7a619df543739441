//! Gateway configuration file

use crate::sim::SimulationConfig;
use anyhow::{anyhow, Result};
use rfm69_bridge::{BridgeConfig, GatewayConfig, MqttConfig, RadioConfig, WatchdogConfig};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Contents of the TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Values given on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub network_id: Option<u8>,
    pub node_id: Option<u8>,
    pub broker: Option<String>,
    pub broker_port: Option<u16>,
    pub topic_root: Option<String>,
}

impl FileConfig {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        Self::parse(&content).map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = Self::default().to_toml()?;
        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| anyhow!("Failed to serialize config: {}", e))
    }

    /// Apply command line overrides
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(id) = overrides.network_id {
            self.radio.network_id = id;
        }
        if let Some(id) = overrides.node_id {
            self.radio.node_id = id;
        }
        if let Some(host) = &overrides.broker {
            self.mqtt.host = host.clone();
        }
        if let Some(port) = overrides.broker_port {
            self.mqtt.port = port;
        }
        if let Some(root) = &overrides.topic_root {
            self.mqtt.topic_root = root.clone();
        }
    }

    /// The bridge's part of the configuration
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            radio: self.radio.clone(),
            watchdog: self.watchdog.clone(),
            mqtt: self.mqtt.clone(),
            bridge: self.bridge.clone(),
        }
    }
}
