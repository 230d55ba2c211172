//! Agent configuration
//!
//! Every field has a default matching the agent's historical fixed setup
//! (`tcp://localhost:1883`, client `MinecraftAgent`, topic `minecraft`, QoS 2),
//! so a TOML file only needs to list what it changes.

use crate::protocol::topics::validate_topic_filter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub mqtt: MqttSection,
}

/// Agent section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// MQTT client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Suppress informational logging
    #[serde(default)]
    pub quiet: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            quiet: false,
        }
    }
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Non durable subscriptions when true
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Literal username (takes precedence over `username_env`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Literal password (takes precedence over `password_env`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Environment variable containing username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_env: Option<String>,
    /// Environment variable containing password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    /// Topic filter to subscribe to (may contain wildcards)
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Maximum QoS the broker delivers at for the subscription
    #[serde(default = "default_qos")]
    pub qos: u8,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Reconnection attempts after a lost connection before giving up
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            clean_session: default_clean_session(),
            username: None,
            password: None,
            username_env: None,
            password_env: None,
            topic: default_topic(),
            qos: default_qos(),
            keep_alive_secs: default_keep_alive(),
            max_reconnect_attempts: 0,
        }
    }
}

fn default_client_id() -> String {
    "MinecraftAgent".to_string()
}

fn default_broker_url() -> String {
    "tcp://localhost:1883".to_string()
}

fn default_clean_session() -> bool {
    true
}

fn default_topic() -> String {
    "minecraft".to_string()
}

fn default_qos() -> u8 {
    2
}

fn default_keep_alive() -> u64 {
    60
}

/// URL schemes accepted for the broker
pub const SUPPORTED_SCHEMES: [&str; 4] = ["tcp", "mqtt", "ssl", "mqtts"];

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid client ID: {0}")]
    InvalidClientId(String),
    #[error("Invalid QoS level {0}: must be 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Invalid topic filter: {0}")]
    InvalidTopic(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

impl AgentConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field that the broker or the subscription would reject
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_client_id(&self.agent.client_id)?;

        if self.mqtt.qos > 2 {
            return Err(ConfigError::InvalidQos(self.mqtt.qos));
        }

        validate_topic_filter(&self.mqtt.topic)
            .map_err(|e| ConfigError::InvalidTopic(format!("'{}': {e}", self.mqtt.topic)))?;

        validate_broker_url(&self.mqtt.broker_url)?;
        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// MQTT username: literal value first, then the named environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        self.mqtt
            .username
            .clone()
            .or_else(|| Self::get_env_var_optional(self.mqtt.username_env.as_ref()))
    }

    /// MQTT password: literal value first, then the named environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        self.mqtt
            .password
            .clone()
            .or_else(|| Self::get_env_var_optional(self.mqtt.password_env.as_ref()))
    }

    /// Resolved credentials for the CONNECT packet
    ///
    /// MQTT 3.1.1 cannot carry a password without a username, so a lone
    /// password is dropped.
    pub fn mqtt_credentials(&self) -> Option<(String, String)> {
        match (self.get_mqtt_username(), self.get_mqtt_password()) {
            (Some(username), password) => Some((username, password.unwrap_or_default())),
            (None, Some(_)) => {
                warn!("MQTT password configured without a username, ignoring it");
                None
            }
            (None, None) => None,
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[agent]
client_id = "test-agent"

[mqtt]
broker_url = "tcp://localhost:1883"
topic = "minecraft"
qos = 2
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Client identifiers go on the wire as an MQTT UTF-8 string
fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    if client_id.is_empty() {
        return Err(ConfigError::InvalidClientId(
            "client ID cannot be empty".to_string(),
        ));
    }

    if client_id.len() > u16::MAX as usize {
        return Err(ConfigError::InvalidClientId(format!(
            "client ID is {} bytes, maximum is {}",
            client_id.len(),
            u16::MAX
        )));
    }

    if let Some(c) = client_id
        .chars()
        .find(|c| c.is_whitespace() || c.is_control())
    {
        return Err(ConfigError::InvalidClientId(format!(
            "client ID '{client_id}' contains invalid character {c:?}"
        )));
    }

    Ok(())
}

fn validate_broker_url(broker_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(broker_url)
        .map_err(|e| ConfigError::InvalidBrokerUrl(format!("'{broker_url}': {e}")))?;

    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(ConfigError::InvalidBrokerUrl(format!(
            "'{broker_url}': unsupported scheme '{}', expected one of {}",
            url.scheme(),
            SUPPORTED_SCHEMES.join(", ")
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidBrokerUrl(format!(
            "'{broker_url}': missing host"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_setup() {
        let config = AgentConfig::default();
        assert_eq!(config.mqtt.broker_url, "tcp://localhost:1883");
        assert_eq!(config.agent.client_id, "MinecraftAgent");
        assert!(config.mqtt.clean_session);
        assert!(!config.agent.quiet);
        assert_eq!(config.mqtt.username, None);
        assert_eq!(config.mqtt.password, None);
        assert_eq!(config.mqtt.topic, "minecraft");
        assert_eq!(config.mqtt.qos, 2);
        assert_eq!(config.mqtt.max_reconnect_attempts, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = AgentConfig::from_toml_str("").unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://broker.example.com:1884"
qos = 1
"#;

        let config = AgentConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.agent.client_id, "MinecraftAgent");
        assert_eq!(config.mqtt.broker_url, "mqtt://broker.example.com:1884");
        assert_eq!(config.mqtt.qos, 1);
        assert_eq!(config.mqtt.topic, "minecraft");
    }

    #[test]
    fn test_test_config_parses() {
        let config = AgentConfig::test_config();
        assert_eq!(config.agent.client_id, "test-agent");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_qos() {
        let result = AgentConfig::from_toml_str("[mqtt]\nqos = 3\n");
        assert!(matches!(result, Err(ConfigError::InvalidQos(3))));
    }

    #[test]
    fn test_invalid_client_id() {
        assert!(validate_client_id("").is_err());
        assert!(validate_client_id("has space").is_err());
        assert!(validate_client_id("tab\there").is_err());
        assert!(validate_client_id("MinecraftAgent").is_ok());
        assert!(validate_client_id("agent-1.2_b").is_ok());
    }

    #[test]
    fn test_invalid_topic() {
        let result = AgentConfig::from_toml_str("[mqtt]\ntopic = \"mine#craft\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidTopic(_))));

        let result = AgentConfig::from_toml_str("[mqtt]\ntopic = \"\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidTopic(_))));
    }

    #[test]
    fn test_wildcard_topic_accepted() {
        let config = AgentConfig::from_toml_str("[mqtt]\ntopic = \"minecraft/+/requests/#\"\n");
        assert!(config.is_ok());
    }

    #[test]
    fn test_broker_url_validation() {
        assert!(validate_broker_url("tcp://localhost:1883").is_ok());
        assert!(validate_broker_url("mqtt://localhost").is_ok());
        assert!(validate_broker_url("ssl://broker:8883").is_ok());
        assert!(validate_broker_url("mqtts://broker").is_ok());

        assert!(matches!(
            validate_broker_url("http://localhost:1883"),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            validate_broker_url("invalid-url"),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_literal_credentials_win_over_env() {
        std::env::set_var("CONFIG_TEST_MQTT_USER_A", "from-env");

        let mut config = AgentConfig::default();
        config.mqtt.username = Some("literal".to_string());
        config.mqtt.username_env = Some("CONFIG_TEST_MQTT_USER_A".to_string());
        config.mqtt.password = Some("pw".to_string());

        assert_eq!(
            config.mqtt_credentials(),
            Some(("literal".to_string(), "pw".to_string()))
        );

        std::env::remove_var("CONFIG_TEST_MQTT_USER_A");
    }

    #[test]
    fn test_credentials_from_env() {
        std::env::set_var("CONFIG_TEST_MQTT_USER_B", "steve");
        std::env::set_var("CONFIG_TEST_MQTT_PASS_B", "diamond");

        let mut config = AgentConfig::default();
        config.mqtt.username_env = Some("CONFIG_TEST_MQTT_USER_B".to_string());
        config.mqtt.password_env = Some("CONFIG_TEST_MQTT_PASS_B".to_string());

        assert_eq!(
            config.mqtt_credentials(),
            Some(("steve".to_string(), "diamond".to_string()))
        );

        std::env::remove_var("CONFIG_TEST_MQTT_USER_B");
        std::env::remove_var("CONFIG_TEST_MQTT_PASS_B");
    }

    #[test]
    fn test_password_without_username_is_dropped() {
        let mut config = AgentConfig::default();
        config.mqtt.password = Some("orphan".to_string());
        assert_eq!(config.mqtt_credentials(), None);
    }

    #[test]
    fn test_username_without_password() {
        let mut config = AgentConfig::default();
        config.mqtt.username = Some("alex".to_string());
        assert_eq!(
            config.mqtt_credentials(),
            Some(("alex".to_string(), String::new()))
        );
    }

    #[test]
    fn test_serialized_config_round_trips_through_validation() {
        let config = AgentConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("broker_url"));
        assert!(!text.contains("password"));
        assert_eq!(AgentConfig::from_toml_str(&text).unwrap(), config);
    }
}
