//! RFM69 Gateway - packet radio to MQTT bridge daemon
//!
//! This binary runs the bridge loop with:
//! - An MQTT connection via rumqttc
//! - A simulated RFM69 radio with virtual sensor nodes
//! - Graceful shutdown on Ctrl-C or SIGTERM

mod config;
mod mqtt;
mod sim;

use anyhow::Context;
use clap::Parser;
use rfm69_bridge::{BridgeHandle, GatewayBridge};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{FileConfig, Overrides};
use crate::mqtt::MqttBus;
use crate::sim::SimulatedRadio;

#[derive(Parser)]
#[command(name = "rfm69-gateway")]
#[command(about = "Bridge an RFM69 sensor network to an MQTT broker")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Write a default configuration file to this path and exit
    #[arg(long)]
    init_config: Option<String>,

    /// Radio network id
    #[arg(long)]
    network_id: Option<u8>,

    /// Gateway node id on the radio network
    #[arg(long)]
    node_id: Option<u8>,

    /// MQTT broker host
    #[arg(long, short)]
    broker: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    broker_port: Option<u16>,

    /// Root of the MQTT topic tree
    #[arg(long)]
    topic_root: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            network_id: self.network_id,
            node_id: self.node_id,
            broker: self.broker.clone(),
            broker_port: self.broker_port,
            topic_root: self.topic_root.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG takes precedence over --verbose
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.init_config {
        FileConfig::create_default(path).await?;
        info!("Wrote default configuration to {}", path);
        return Ok(());
    }

    let mut file_config = match &args.config {
        Some(path) => FileConfig::load(path).await?,
        None => FileConfig::default(),
    };
    file_config.apply(&args.overrides());

    if args.print_config {
        print!("{}", file_config.to_toml()?);
        return Ok(());
    }

    let config = file_config.gateway();
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting RFM69 gateway {} (network {:03}, node {:03}, {})",
        rfm69_bridge::VERSION,
        config.radio.network_id,
        config.radio.node_id,
        config.radio.frequency
    );

    let bus = MqttBus::connect(&config.mqtt)
        .await
        .context("Failed to connect to MQTT broker")?;
    let radio = SimulatedRadio::new(file_config.simulation.clone());

    let (bridge, handle) = GatewayBridge::new(radio, bus, &config);
    tokio::spawn(shutdown_on_signal(handle));

    let stats = bridge.run().await.context("Gateway stopped")?;
    info!(
        "Gateway stopped after {}s: {} received, {} published, {} decode failures",
        stats.uptime_secs(),
        stats.messages_received,
        stats.published,
        stats.decode_failures
    );
    Ok(())
}

async fn shutdown_on_signal(handle: BridgeHandle) {
    wait_for_signal().await;
    info!("Received shutdown signal");
    if let Err(e) = handle.shutdown().await {
        warn!("Failed to signal shutdown: {}", e);
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
