//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management,
//! configuration handling, and QoS conversion.

use crate::config::AgentConfig;
use rumqttc::{MqttOptions, QoS, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Attempting to reconnect (attempt count)
    Reconnecting(u32),
    /// Permanently disconnected - reconnection attempts exhausted
    PermanentlyDisconnected(String),
}

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Number of reconnection attempts after a lost connection (0 = give up at once)
    pub max_attempts: u32,
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Calculate the maximum total time spent sleeping across all attempts
    pub fn calculate_max_total_time(&self) -> u64 {
        (1..=self.max_attempts)
            .map(|attempt| self.calculate_backoff_delay(attempt))
            .sum()
    }

    /// Calculate backoff delay for given attempt using custom pattern
    /// Pattern: 25ms, 50ms, 100ms, 250ms, then sustain at 250ms
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = (attempt.saturating_sub(1)) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid QoS level: {0}")]
    InvalidQos(u8),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Map a numeric QoS level onto the rumqttc enum
pub fn qos_from_level(level: u8) -> Result<QoS, MqttError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::InvalidQos(other)),
    }
}

pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

/// Whether the URL scheme asks for TLS
pub fn is_tls_scheme(scheme: &str) -> bool {
    matches!(scheme, "ssl" | "mqtts")
}

/// Extract host and port from a broker URL such as `tcp://localhost:1883`
pub fn parse_broker_address(broker_url: &str) -> Result<(String, u16, bool), MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = is_tls_scheme(url.scheme());
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok((host.to_string(), port, tls))
}

/// Pure function to configure MQTT options from config
pub fn configure_mqtt_options(config: &AgentConfig) -> Result<MqttOptions, MqttError> {
    let (host, port, tls) = parse_broker_address(&config.mqtt.broker_url)?;

    let mut mqtt_options = MqttOptions::new(config.agent.client_id.clone(), host, port);

    if tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some((username, password)) = config.mqtt_credentials() {
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_clean_session(config.mqtt.clean_session);
    mqtt_options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));

    Ok(mqtt_options)
}
