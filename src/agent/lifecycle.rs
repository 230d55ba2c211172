//! Agent lifecycle management
//!
//! Startup connects the transport, installs the message channel, subscribes
//! to the configured topic and spawns the processing task. Shutdown reverses
//! that.

use crate::config::AgentConfig;
use crate::dispatch::{Dispatcher, RequestHandler};
use crate::protocol::InboundMessage;
use crate::transport::Transport;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

/// Bound of the channel between the transport and the processing task
pub const MESSAGE_CHANNEL_CAPACITY: usize = 100;

/// The agent: one transport feeding one dispatcher
pub struct MinecraftAgent<T, H>
where
    T: Transport + 'static,
    H: RequestHandler + 'static,
{
    config: AgentConfig,
    transport: T,
    dispatcher: Arc<Dispatcher<H>>,
    processing_handle: Option<JoinHandle<()>>,
}

impl<T, H> MinecraftAgent<T, H>
where
    T: Transport + 'static,
    H: RequestHandler + 'static,
{
    /// Create an agent with injected transport and handler
    pub fn new(config: AgentConfig, transport: T, handler: H) -> Self {
        Self {
            config,
            transport,
            dispatcher: Arc::new(Dispatcher::new(handler)),
            processing_handle: None,
        }
    }

    fn create_message_channel() -> (
        mpsc::Sender<InboundMessage>,
        mpsc::Receiver<InboundMessage>,
    ) {
        mpsc::channel(MESSAGE_CHANNEL_CAPACITY)
    }

    /// Drain the channel into the dispatcher, one message at a time
    fn spawn_processing_task(
        dispatcher: Arc<Dispatcher<H>>,
        mut receiver: mpsc::Receiver<InboundMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if let Err(e) = dispatcher.dispatch(&message).await {
                    // A failed request never stops the agent
                    error!(topic = %message.topic, "Request handling failed: {}", e.diagnostic());
                }
            }
            debug!("Message channel closed, processing task stopped");
        })
    }

    /// Connect, subscribe and start processing
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        if self.processing_handle.is_some() {
            return Err(LifecycleError::AlreadyStarted);
        }

        let span = crate::lifecycle_span!(
            event = "start",
            client_id = %self.config.agent.client_id
        );

        async {
            self.transport
                .connect()
                .await
                .map_err(|e| LifecycleError::TransportError(Box::new(e)))?;
            info!(
                "Connected to {} with client ID {}",
                self.config.mqtt.broker_url, self.config.agent.client_id
            );

            // The sender goes in before subscribing so retained messages are not lost
            let (sender, receiver) = Self::create_message_channel();
            self.transport.set_message_sender(sender).await;

            info!(
                "Subscribing to topic \"{}\" qos {}",
                self.config.mqtt.topic, self.config.mqtt.qos
            );
            self.transport
                .subscribe(&self.config.mqtt.topic, self.config.mqtt.qos)
                .await
                .map_err(|e| LifecycleError::TransportError(Box::new(e)))?;

            self.processing_handle = Some(Self::spawn_processing_task(
                self.dispatcher.clone(),
                receiver,
            ));
            debug!("Processing task started");
            Ok::<(), LifecycleError>(())
        }
        .instrument(span)
        .await
    }

    /// Disconnect the transport and stop the processing task
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down agent: {}", self.config.agent.client_id);

        let disconnect_result = self
            .transport
            .disconnect()
            .await
            .map_err(|e| LifecycleError::TransportError(Box::new(e)));

        if let Some(handle) = self.processing_handle.take() {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Processing task shutdown error: {}", e);
                }
            }
        }

        disconnect_result?;
        info!("Agent shutdown complete");
        Ok(())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn handler(&self) -> &H {
        self.dispatcher.handler()
    }

    /// Whether the processing task is running
    pub fn is_running(&self) -> bool {
        self.processing_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Check if the transport connection is permanently lost
    pub fn is_permanently_disconnected(&self) -> bool {
        self.transport.is_permanently_disconnected()
    }
}

/// Agent lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Transport error")]
    TransportError(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Agent already started")]
    AlreadyStarted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{HandlerCall, MockTransport, RecordingHandler};
    use std::time::Duration;

    fn agent(transport: MockTransport) -> MinecraftAgent<MockTransport, RecordingHandler> {
        MinecraftAgent::new(AgentConfig::test_config(), transport, RecordingHandler::new())
    }

    #[tokio::test]
    async fn test_start_subscribes_to_configured_topic() {
        let transport = MockTransport::new();
        let mut agent = agent(transport.clone());

        agent.start().await.unwrap();

        assert!(agent.is_running());
        assert_eq!(
            transport.get_subscriptions().await,
            vec![("minecraft".to_string(), 2)]
        );
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_messages_reach_handler_in_order() {
        let transport = MockTransport::new();
        let mut agent = agent(transport.clone());
        agent.start().await.unwrap();

        transport.inject_payload("minecraft", "fb:hello").await.unwrap();
        transport.inject_payload("minecraft", "tw:world").await.unwrap();
        transport.inject_payload("minecraft", "other:x").await.unwrap();

        let calls = agent
            .handler()
            .wait_for_calls(3, Duration::from_secs(2))
            .await;
        assert_eq!(
            calls,
            vec![
                HandlerCall::Facebook("hello".to_string()),
                HandlerCall::Twitter("world".to_string()),
                HandlerCall::Unknown("other".to_string()),
            ]
        );
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_processing() {
        let transport = MockTransport::new();
        let mut agent = MinecraftAgent::new(
            AgentConfig::test_config(),
            transport.clone(),
            RecordingHandler::failing(),
        );
        agent.start().await.unwrap();

        transport.inject_payload("minecraft", "fb:one").await.unwrap();
        transport.inject_payload("minecraft", "fb:two").await.unwrap();

        let calls = agent
            .handler()
            .wait_for_calls(2, Duration::from_secs(2))
            .await;
        assert_eq!(calls.len(), 2);
        assert!(agent.is_running());
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut agent = agent(MockTransport::new());
        agent.start().await.unwrap();
        assert!(matches!(
            agent.start().await,
            Err(LifecycleError::AlreadyStarted)
        ));
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let mut agent = agent(MockTransport::with_failure());
        let result = agent.start().await;

        assert!(matches!(result, Err(LifecycleError::TransportError(_))));
        assert!(!agent.is_running());
        assert!(agent.is_permanently_disconnected());
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_reported() {
        let mut agent = agent(MockTransport::with_subscribe_failure());
        assert!(matches!(
            agent.start().await,
            Err(LifecycleError::TransportError(_))
        ));
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_and_stops() {
        let transport = MockTransport::new();
        let mut agent = agent(transport.clone());
        agent.start().await.unwrap();

        agent.shutdown().await.unwrap();

        assert!(!agent.is_running());
        assert_eq!(transport.disconnect_count(), 1);
        assert!(!agent.transport().is_connected());
    }
}
