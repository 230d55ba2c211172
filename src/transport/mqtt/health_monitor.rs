//! Pure health monitoring and reconnection logic for MQTT client
//!
//! This module contains pure functions for reconnection decision making
//! and connection state tracking.

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// How long `connect()` waits for a ConnAck on top of any backoff sleeps
pub const CONNACK_TIMEOUT_BUFFER: Duration = Duration::from_secs(30);

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Determine if reconnection should be attempted (pure function)
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if current_attempts >= config.max_attempts {
            return ReconnectionDecision::AbortMaxAttemptsExceeded;
        }

        let backoff_delay = config.calculate_backoff_delay(current_attempts + 1);
        ReconnectionDecision::Proceed {
            attempt: current_attempts + 1,
            delay_ms: backoff_delay,
        }
    }

    /// Calculate connection timeout based on reconnection configuration (pure function)
    pub fn calculate_connection_timeout(config: &ReconnectConfig) -> Duration {
        Duration::from_millis(config.calculate_max_total_time()) + CONNACK_TIMEOUT_BUFFER
    }

    /// Determine next state after connection event (pure function)
    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnAckReceived => ConnectionState::Connected,
            ConnectionEvent::DisconnectedByBroker => {
                ConnectionState::Disconnected("Broker disconnected".to_string())
            }
            ConnectionEvent::NetworkError(error) => ConnectionState::Disconnected(error),
            ConnectionEvent::ReconnectionStarted(attempt) => ConnectionState::Reconnecting(attempt),
            ConnectionEvent::PermanentFailure(reason) => {
                ConnectionState::PermanentlyDisconnected(reason)
            }
        }
    }

    /// Check if connection state allows subscribing (pure function)
    pub fn can_subscribe(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Calculate health metrics for connection (pure function)
    pub fn calculate_health_metrics(
        connect_time: Option<Instant>,
        last_message_time: Option<Instant>,
        reconnect_count: u32,
    ) -> HealthMetrics {
        let now = Instant::now();

        HealthMetrics {
            uptime: connect_time.map(|t| now.duration_since(t)),
            time_since_last_message: last_message_time.map(|t| now.duration_since(t)),
            reconnect_count,
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState, broker_url: &str) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("MQTT connection to {} established", broker_url);
            }
            // Quiet mode hides this; a permanent loss is still reported as an error
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                info!("Connection to {} lost! {}", broker_url, reason);
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                info!("Starting reconnection attempt {} to {}", attempt, broker_url);
            }
            (ConnectionState::Reconnecting(_), ConnectionState::Connected) => {
                info!("Reconnection to {} successful", broker_url);
            }
            (_, ConnectionState::PermanentlyDisconnected(reason)) => {
                error!("Connection to {} permanently lost: {}", broker_url, reason);
            }
            _ => {
                info!("MQTT connection state: {:?} -> {:?}", from, to);
            }
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Proceed with reconnection attempt
    Proceed { attempt: u32, delay_ms: u64 },
    /// Abort reconnection - shutdown requested
    AbortShutdownRequested,
    /// Abort reconnection - max attempts exceeded
    AbortMaxAttemptsExceeded,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// ConnAck received from broker
    ConnAckReceived,
    /// Broker initiated disconnect
    DisconnectedByBroker,
    /// Network or protocol error
    NetworkError(String),
    /// Reconnection attempt started
    ReconnectionStarted(u32),
    /// Permanent failure - no more retries
    PermanentFailure(String),
}

/// Health metrics for connection monitoring
#[derive(Debug, Clone)]
pub struct HealthMetrics {
    /// Time since connection established
    pub uptime: Option<Duration>,
    /// Time since last message received
    pub time_since_last_message: Option<Duration>,
    /// Number of reconnections since start
    pub reconnect_count: u32,
}
