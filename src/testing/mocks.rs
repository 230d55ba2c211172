//! Mock implementations for testing
//!
//! Provides a mock Transport and a recording RequestHandler so the agent can
//! be exercised end to end without an MQTT broker.

use crate::dispatch::RequestHandler;
use crate::error::AgentError;
use crate::protocol::InboundMessage;
use crate::transport::{mqtt::ConnectionState, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub type RecordedSubscription = (String, u8);

/// Mock transport for testing
///
/// Clones share state, so a test can keep a handle after moving one clone
/// into the agent.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub subscriptions: Arc<Mutex<Vec<RecordedSubscription>>>,
    pub message_sender: Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>,
    pub should_fail: bool,
    pub fail_subscribe: bool,
    state: Arc<StdMutex<Option<ConnectionState>>>,
    disconnect_calls: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose `connect()` fails
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Transport that connects but rejects every subscription
    pub fn with_subscribe_failure() -> Self {
        Self {
            fail_subscribe: true,
            ..Default::default()
        }
    }

    pub async fn get_subscriptions(&self) -> Vec<RecordedSubscription> {
        self.subscriptions.lock().await.clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Deliver a message as if it arrived from the broker
    pub async fn inject(&self, message: InboundMessage) -> Result<(), AgentError> {
        let sender = self
            .message_sender
            .lock()
            .await
            .clone()
            .ok_or_else(|| AgentError::internal_error("No message sender installed"))?;

        sender
            .send(message)
            .await
            .map_err(|e| AgentError::internal_error(format!("Mock delivery failed: {e}")))
    }

    /// Deliver a text payload on a topic at QoS 2
    pub async fn inject_payload(&self, topic: &str, payload: &str) -> Result<(), AgentError> {
        self.inject(InboundMessage::new(topic, payload.to_string(), 2))
            .await
    }

    /// Simulate the broker connection being lost for good
    pub fn lose_connection(&self, reason: &str) {
        self.set_state(ConnectionState::PermanentlyDisconnected(reason.to_string()));
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = Some(state);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = AgentError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            self.set_state(ConnectionState::PermanentlyDisconnected(
                "Mock connection failure".to_string(),
            ));
            return Err(AgentError::internal_error("Mock connection failure"));
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), Self::Error> {
        if self.fail_subscribe {
            return Err(AgentError::internal_error("Mock subscription rejected"));
        }
        self.subscriptions.lock().await.push((topic.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected(
            "Client disconnected".to_string(),
        ));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        self.state.lock().ok().and_then(|state| state.clone())
    }

    fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        *self.message_sender.lock().await = Some(sender);
    }
}

/// One handler invocation, with the argument or keyword it received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    Facebook(String),
    Twitter(String),
    Unknown(String),
}

/// Request handler that records every call
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<StdMutex<Vec<HandlerCall>>>,
    should_fail: bool,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that records the call and then returns an error
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Poll until at least `count` calls were recorded or the timeout passes
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> Vec<HandlerCall> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let calls = self.calls();
            if calls.len() >= count || tokio::time::Instant::now() >= deadline {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn record(&self, call: HandlerCall) -> Result<(), AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.should_fail {
            return Err(AgentError::handler_failed("Mock handler failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestHandler for RecordingHandler {
    async fn handle_facebook(&self, argument: &str) -> Result<(), AgentError> {
        self.record(HandlerCall::Facebook(argument.to_string()))
    }

    async fn handle_twitter(&self, argument: &str) -> Result<(), AgentError> {
        self.record(HandlerCall::Twitter(argument.to_string()))
    }

    async fn handle_unknown(&self, keyword: &str) -> Result<(), AgentError> {
        self.record(HandlerCall::Unknown(keyword.to_string()))
    }
}
