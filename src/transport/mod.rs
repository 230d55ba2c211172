//! Transport layer for receiving requests
//!
//! This module provides the transport abstraction and its MQTT implementation.

use crate::protocol::InboundMessage;

pub mod mqtt;

/// Transport trait for the agent's inbound message source
///
/// This trait provides an abstraction over the broker connection
/// to enable dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker; resolves once the broker acknowledged the session
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe to a topic filter at the given QoS level (0, 1 or 2)
    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> Option<crate::transport::mqtt::ConnectionState>;

    /// Check if the connection is permanently disconnected
    fn is_permanently_disconnected(&self) -> bool;

    /// Install the channel that receives every inbound message
    async fn set_message_sender(&self, sender: tokio::sync::mpsc::Sender<InboundMessage>);
}
