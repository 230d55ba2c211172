//! Integration Tests for Agent Startup When Broker is Down
//!
//! Nothing listens on port 1 of the loopback interface, so every
//! connection attempt is refused immediately.

use minecraft_agent::config::AgentConfig;
use minecraft_agent::dispatch::LoggingHandler;
use minecraft_agent::transport::mqtt::{ConnectionState, MqttClient};
use minecraft_agent::transport::Transport;
use minecraft_agent::{LifecycleError, MinecraftAgent};
use std::time::{Duration, Instant};
use tokio::time::timeout;

fn unreachable_config(max_reconnect_attempts: u32) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.agent.client_id = "broker-down-agent".to_string();
    config.mqtt.broker_url = "tcp://127.0.0.1:1".to_string();
    config.mqtt.max_reconnect_attempts = max_reconnect_attempts;
    config
}

#[tokio::test]
async fn test_connect_fails_fast_without_reconnection() {
    let mut client = MqttClient::new(&unreachable_config(0))
        .expect("Client creation should succeed even if broker is down");

    let connect_result = timeout(Duration::from_secs(10), client.connect())
        .await
        .expect("connect() must give up on its own");

    assert!(connect_result.is_err());
    assert!(client.is_permanently_disconnected());
    assert!(!Transport::is_connected(&client));
    assert!(matches!(
        client.connection_state(),
        Some(ConnectionState::PermanentlyDisconnected(_))
    ));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_retries_with_backoff_then_gives_up() {
    let mut client = MqttClient::new(&unreachable_config(3)).unwrap();

    let start = Instant::now();
    let connect_result = timeout(Duration::from_secs(10), client.connect())
        .await
        .expect("connect() must give up on its own");

    assert!(connect_result.is_err());
    assert!(client.is_permanently_disconnected());
    // 25ms + 50ms + 100ms of backoff between the four attempts
    assert!(start.elapsed() >= Duration::from_millis(175));
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let mut client = MqttClient::new(&unreachable_config(0)).unwrap();
    let _ = client.connect().await;
    assert!(client.connect().await.is_err());
}

#[tokio::test]
async fn test_agent_start_reports_transport_error() {
    let config = unreachable_config(0);
    let transport = MqttClient::new(&config).unwrap();
    let mut agent = MinecraftAgent::new(config, transport, LoggingHandler::new());

    let result = agent.start().await;

    assert!(matches!(result, Err(LifecycleError::TransportError(_))));
    assert!(agent.is_permanently_disconnected());
    assert!(!agent.is_running());
    agent.shutdown().await.unwrap();
}
