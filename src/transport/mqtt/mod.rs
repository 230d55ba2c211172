//! MQTT client implementation on top of `rumqttc`
//!
//! The client is split into focused sub-modules that separate pure
//! decisions from I/O:
//!
//! - [`connection`] - Connection state, options and QoS conversion
//! - [`message_handler`] - Event routing and message forwarding
//! - [`health_monitor`] - Reconnection decisions and state transitions
//! - [`client`] - The event-loop supervisor and broker operations
//!
//! # Usage
//!
//! ```rust,no_run
//! use minecraft_agent::config::AgentConfig;
//! use minecraft_agent::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let config = AgentConfig::default();
//!
//! let mut client = MqttClient::new(&config)?;
//! client.connect().await?;
//! client.subscribe(&config.mqtt.topic, config.mqtt.qos).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{
    configure_mqtt_options, parse_broker_address, qos_from_level, qos_level, ConnectionState,
    MqttError, ReconnectConfig,
};
pub use health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageForwarder, MessageHandler};
