//! Message bus abstraction
//!
//! The bridge publishes readings and receives commands through
//! [`MessageBus`]. The gateway binary implements it over an MQTT client;
//! tests use [`crate::test_utils::MockBus`].

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Trait for publish/subscribe message buses
///
/// Publishes are fire-and-forget (QoS 0, not retained).
#[async_trait]
pub trait MessageBus: Send {
    /// Subscribe to a topic filter
    async fn subscribe(&mut self, filter: &str) -> Result<()>;

    /// Publish a payload on a topic
    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<()>;

    /// Wait up to `timeout` for an inbound message
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>>;

    /// Disconnect from the bus
    async fn disconnect(&mut self) -> Result<()>;

    /// Get the bus name (for logging)
    fn name(&self) -> &str;
}

/// A message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full topic the message arrived on
    pub topic: String,
    /// Raw payload
    pub payload: Bytes,
}

impl InboundMessage {
    /// Create a new inbound message
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as trimmed UTF-8, if it is valid UTF-8
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok().map(str::trim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_str() {
        let msg = InboundMessage::new("a/b", " +21.50\n");
        assert_eq!(msg.payload_str(), Some("+21.50"));

        let binary = InboundMessage::new("a/b", vec![0xFF, 0xFE]);
        assert_eq!(binary.payload_str(), None);
    }
}
