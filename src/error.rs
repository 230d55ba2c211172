//! Error types for the agent
//!
//! Library layers return typed errors; the binary turns any of them into a
//! sanitized diagnostic line before exiting.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Request handler failed: {message}")]
    HandlerFailed { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Transport error: {0}")]
    TransportError(#[from] crate::transport::mqtt::MqttError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Lifecycle error: {0}")]
    LifecycleError(#[from] crate::agent::LifecycleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create handler failure error
    pub fn handler_failed<S: Into<String>>(message: S) -> Self {
        Self::HandlerFailed {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Full error chain, sanitized for logs and console output
    pub fn diagnostic(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !message.contains(&cause_text) {
                message.push_str(": ");
                message.push_str(&cause_text);
            }
            source = cause.source();
        }
        sanitize_error_message(&message)
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|token|key|secret)[=:]\s*\S+")
        .expect("secret pattern is a valid regex")
});

static URL_USERINFO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([a-z][a-z0-9+.-]*://)[^/@\s]+@").expect("userinfo pattern is a valid regex")
});

/// Redact credentials so diagnostics can be printed safely
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = URL_USERINFO_PATTERN
        .replace_all(&sanitized, "${1}***@")
        .to_string();

    // Truncate very long messages - ensure total length is <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for Agent operations
pub type AgentResult<T> = Result<T, AgentError>;
