//! Observability: structured logging for the agent

pub mod logging;

// Re-export for convenience
pub use logging::{effective_level, init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{lifecycle_span, mqtt_span, request_span};
