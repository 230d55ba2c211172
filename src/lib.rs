//! minecraft-agent
//!
//! An MQTT agent that listens on a Minecraft topic and dispatches each
//! message to a request handler by its keyword prefix.
//!
//! # Overview
//!
//! - Configuration with TOML files, environment credentials and validation
//! - MQTT transport on `rumqttc` with ConnAck/SubAck confirmation
//! - Payload grammar `<keyword>:<argument>` and keyword dispatch
//! - Agent lifecycle wiring the transport to the dispatcher
//!
//! # Quick Start
//!
//! ```rust
//! use minecraft_agent::protocol::{InboundMessage, Request};
//!
//! let message = InboundMessage::new("minecraft", "fb:hello", 2);
//! assert_eq!(
//!     message.request(),
//!     Request::Facebook { argument: "hello".to_string() }
//! );
//!
//! assert!(!Request::parse("other:x").is_known());
//! ```

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use agent::{LifecycleError, MinecraftAgent};
pub use config::{AgentConfig, ConfigError};
pub use dispatch::{Dispatcher, LoggingHandler, RequestHandler};
pub use error::{AgentError, AgentResult};
pub use protocol::{InboundMessage, Request};
pub use transport::mqtt::MqttClient;
pub use transport::Transport;
