//! Inbound message model and request grammar
//!
//! Payloads are plain UTF-8 text of the form `<keyword>:<argument>`.

pub mod messages;
pub mod topics;

pub use messages::{InboundMessage, Request};
pub use topics::{topic_matches, validate_topic_filter, TopicError};
