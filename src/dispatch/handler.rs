//! Request handler seam
//!
//! The dispatcher selects a branch from the payload keyword and calls the
//! matching method. Handlers own what a request actually does.

use crate::error::AgentError;
use async_trait::async_trait;
use tracing::info;

/// Receives parsed requests, one call per inbound message
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// `facebook:<argument>` or `fb:<argument>`
    async fn handle_facebook(&self, argument: &str) -> Result<(), AgentError>;

    /// `twitter:<argument>` or `tw:<argument>`
    async fn handle_twitter(&self, argument: &str) -> Result<(), AgentError>;

    /// Any other keyword, including payloads without a colon
    async fn handle_unknown(&self, keyword: &str) -> Result<(), AgentError>;
}

/// Stub handler that only reports which branch was taken
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RequestHandler for LoggingHandler {
    async fn handle_facebook(&self, argument: &str) -> Result<(), AgentError> {
        info!(request = "facebook", "Processing Facebook request: {}", argument);
        Ok(())
    }

    async fn handle_twitter(&self, argument: &str) -> Result<(), AgentError> {
        info!(request = "twitter", "Processing Twitter request: {}", argument);
        Ok(())
    }

    async fn handle_unknown(&self, keyword: &str) -> Result<(), AgentError> {
        info!(request = "unknown", keyword = %keyword, "Unknown request");
        Ok(())
    }
}

/// Lets a shared handler be used where an owned one is expected
#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for std::sync::Arc<H> {
    async fn handle_facebook(&self, argument: &str) -> Result<(), AgentError> {
        (**self).handle_facebook(argument).await
    }

    async fn handle_twitter(&self, argument: &str) -> Result<(), AgentError> {
        (**self).handle_twitter(argument).await
    }

    async fn handle_unknown(&self, keyword: &str) -> Result<(), AgentError> {
        (**self).handle_unknown(keyword).await
    }
}
