//! MQTT message bus backed by rumqttc
//!
//! The rumqttc event loop runs as its own task. It forwards inbound
//! publishes to the bridge over a channel, and after every reconnect it
//! re-subscribes the filters the bridge asked for.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rfm69_bridge::{BridgeError, InboundMessage, MessageBus, MqttConfig, Result};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Requests queued between the client and the event loop
const CLIENT_CAPACITY: usize = 10;

/// Inbound publishes buffered for the bridge
const INBOUND_CAPACITY: usize = 64;

/// Time allowed for the initial CONNACK
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// MQTT client implementing [`MessageBus`]
pub struct MqttBus {
    client: AsyncClient,
    inbound_rx: mpsc::Receiver<InboundMessage>,
    filters: Arc<Mutex<Vec<String>>>,
    driver: JoinHandle<()>,
    name: String,
}

impl MqttBus {
    /// Connect to the broker and wait for it to accept the session
    pub async fn connect(config: &MqttConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keepalive);

        let (client, mut eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
        let name = format!("mqtt://{}:{}", config.host, config.port);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                BridgeError::BusConnect(format!("no CONNACK from {} within {:?}", name, CONNECT_TIMEOUT))
            })??;
        info!(broker = %name, client_id = %config.client_id, "Connected to MQTT broker");

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let filters = Arc::new(Mutex::new(Vec::new()));
        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            inbound_tx,
            filters.clone(),
            config.reconnect_delay,
        ));

        Ok(Self::from_parts(client, inbound_rx, filters, driver, name))
    }

    fn from_parts(
        client: AsyncClient,
        inbound_rx: mpsc::Receiver<InboundMessage>,
        filters: Arc<Mutex<Vec<String>>>,
        driver: JoinHandle<()>,
        name: String,
    ) -> Self {
        Self {
            client,
            inbound_rx,
            filters,
            driver,
            name,
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BridgeError::BusConnect(format!(
                        "broker refused connection: {:?}",
                        code
                    ))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(BridgeError::BusConnect(e.to_string())),
        }
    }
}

/// Event loop task: forward publishes, resubscribe after reconnects
async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbound_tx: mpsc::Sender<InboundMessage>,
    filters: Arc<Mutex<Vec<String>>>,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(topic = %publish.topic, len = publish.payload.len(), "MQTT message received");
                let msg = InboundMessage::new(publish.topic, publish.payload);
                if inbound_tx.send(msg).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Reconnected to MQTT broker");
                let filters = filters.lock().clone();
                for filter in filters {
                    if let Err(e) = client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                        warn!(filter = %filter, "Resubscribe failed: {}", e);
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT connection error: {}, retrying in {:?}", e, reconnect_delay);
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn subscribe(&mut self, filter: &str) -> Result<()> {
        self.client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(|e| BridgeError::Bus(e.to_string()))?;
        self.filters.lock().push(filter.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish_bytes(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BridgeError::Bus(e.to_string()))
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>> {
        match tokio::time::timeout(timeout, self.inbound_rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => {
                // Event loop gone; keep the caller's pacing
                tokio::time::sleep(timeout).await;
                Err(BridgeError::Bus("MQTT event loop stopped".to_string()))
            }
            Err(_) => Ok(None),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| BridgeError::Bus(e.to_string()));

        if tokio::time::timeout(Duration::from_secs(1), &mut self.driver)
            .await
            .is_err()
        {
            self.driver.abort();
        }
        info!(broker = %self.name, "Disconnected from MQTT broker");
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
