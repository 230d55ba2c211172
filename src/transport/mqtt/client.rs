//! Impure I/O operations for MQTT client
//!
//! This module handles network communication, async coordination, and
//! integration with the rumqttc event loop.

use super::connection::{
    configure_mqtt_options, qos_from_level, qos_level, ConnectionState, MqttError,
    ReconnectConfig,
};
use super::health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageForwarder, MessageHandler};
use crate::config::AgentConfig;
use crate::protocol::InboundMessage;
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, QoS, SubscribeReasonCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the request channel between `AsyncClient` and `EventLoop`
const REQUEST_CHANNEL_CAPACITY: usize = 10;
/// How long `subscribe()` waits for the broker's SubAck
const SUBACK_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the supervisor keeps polling to flush the Disconnect packet
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);
/// How long `disconnect()` waits for the supervisor task to finish
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

type SubAckSender = mpsc::UnboundedSender<Vec<SubscribeReasonCode>>;
type SubAckReceiver = mpsc::UnboundedReceiver<Vec<SubscribeReasonCode>>;

/// A topic filter this client is subscribed to
#[derive(Debug, Clone, PartialEq)]
struct Subscription {
    topic: String,
    qos: QoS,
}

/// MQTT transport client for the agent
pub struct MqttClient {
    client_id: String,
    broker_url: String,
    client: AsyncClient,
    // Taken by connect(); the mutex keeps the client Sync
    event_loop: std::sync::Mutex<Option<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnect_config: ReconnectConfig,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    suback_tx: SubAckSender,
    suback_rx: SubAckReceiver,
    message_forwarder: Arc<Mutex<MessageForwarder>>,
    connect_time: Option<Instant>,
    last_message_time: Arc<std::sync::Mutex<Option<Instant>>>,
    reconnect_count: Arc<AtomicU32>,
}

impl MqttClient {
    /// Build a client from the agent configuration without touching the network
    pub fn new(config: &AgentConfig) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (suback_tx, suback_rx) = mpsc::unbounded_channel();

        Ok(MqttClient {
            client_id: config.agent.client_id.clone(),
            broker_url: config.mqtt.broker_url.clone(),
            client,
            event_loop: std::sync::Mutex::new(Some(event_loop)),
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::with_max_attempts(
                config.mqtt.max_reconnect_attempts,
            ),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            suback_tx,
            suback_rx,
            message_forwarder: Arc::new(Mutex::new(MessageForwarder::new())),
            connect_time: None,
            last_message_time: Arc::new(std::sync::Mutex::new(None)),
            reconnect_count: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    /// Set the sender that receives every accepted inbound message
    pub async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        let mut forwarder = self.message_forwarder.lock().await;
        forwarder.set_message_sender(sender);
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait until the supervisor reports a ConnAck, or gives up
    ///
    /// A transient `Disconnected` state is not final: the supervisor either
    /// moves on to `Reconnecting` or to `PermanentlyDisconnected`.
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
                match *state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::PermanentlyDisconnected(ref reason) => {
                        return Err(MqttError::ConnectionFailedStr(reason.clone()));
                    }
                    ConnectionState::Disconnected(ref reason) => {
                        debug!("Connection attempt failed: {}", reason);
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => {}
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    /// Connect to the broker
    ///
    /// Spawns the event-loop supervisor and resolves only once the broker
    /// acknowledged the connection. Fails when the connection is refused
    /// and no reconnection attempts remain.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .get_mut()
            .ok()
            .and_then(Option::take)
            .ok_or_else(|| {
                MqttError::ConnectionFailedStr("Event loop already started".to_string())
            })?;

        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let supervisor = EventLoopSupervisor {
            broker_url: self.broker_url.clone(),
            client: self.client.clone(),
            state_tx,
            shutdown_rx: shutdown_rx.clone(),
            reconnect_config: self.reconnect_config.clone(),
            reconnect_attempts: 0,
            subscriptions: self.subscriptions.clone(),
            suback_tx: self.suback_tx.clone(),
            message_forwarder: self.message_forwarder.clone(),
            last_message_time: self.last_message_time.clone(),
            reconnect_count: self.reconnect_count.clone(),
        };

        let span = crate::mqtt_span!(broker = %self.broker_url, client_id = %self.client_id);
        let handle = tokio::spawn(supervisor.run(event_loop, shutdown_rx).instrument(span));
        self.event_loop_handle = Some(handle);

        let connection_timeout =
            HealthMonitor::calculate_connection_timeout(&self.reconnect_config);
        Self::wait_for_connection_confirmation(state_rx, connection_timeout).await?;

        self.connect_time = Some(Instant::now());
        Ok(())
    }

    /// Subscribe to a topic filter and wait for the broker's SubAck
    pub async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), MqttError> {
        let requested = qos_from_level(qos)?;
        self.check_connection_state()?;

        // Register first so retained messages sent right after the SubAck are accepted
        self.track_subscription(topic, requested).await;

        match self.request_subscription(topic, requested).await {
            Ok(granted) => {
                if granted != requested {
                    warn!(
                        "Broker granted QoS {} for {} (requested {})",
                        qos_level(granted),
                        topic,
                        qos
                    );
                }
                info!("Successfully subscribed to: {}", topic);
                Ok(())
            }
            Err(e) => {
                self.subscriptions.lock().await.retain(|s| s.topic != topic);
                Err(e)
            }
        }
    }

    async fn track_subscription(&self, topic: &str, qos: QoS) {
        let mut subscriptions = self.subscriptions.lock().await;
        subscriptions.retain(|s| s.topic != topic);
        subscriptions.push(Subscription {
            topic: topic.to_string(),
            qos,
        });
    }

    async fn request_subscription(&mut self, topic: &str, qos: QoS) -> Result<QoS, MqttError> {
        // Acks from earlier re-subscriptions are stale
        while self.suback_rx.try_recv().is_ok() {}

        self.client
            .subscribe(topic, qos)
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        let return_codes = match tokio::time::timeout(SUBACK_TIMEOUT, self.suback_rx.recv()).await
        {
            Ok(Some(codes)) => codes,
            Ok(None) => {
                return Err(MqttError::ConnectionFailedStr(
                    "Event loop stopped before the subscription was acknowledged".to_string(),
                ))
            }
            Err(_) => {
                return Err(MqttError::SubscriptionFailed(
                    format!("No SubAck received for {topic} within {SUBACK_TIMEOUT:?}").into(),
                ))
            }
        };

        let granted = MessageHandler::validate_subscription_success(&return_codes)
            .map_err(MqttError::SubscriptionRejected)?;

        granted.first().copied().ok_or_else(|| {
            MqttError::SubscriptionRejected(format!("Empty SubAck for {topic}"))
        })
    }

    /// Disconnect from the broker and stop the supervisor
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(handle) = self.event_loop_handle.take() else {
            debug!("MQTT client was never connected, nothing to disconnect");
            return Ok(());
        };

        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
            info!("Sent shutdown signal to MQTT event loop");
        }

        // Fails when the supervisor already stopped after a permanent loss
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request not delivered: {}", e);
        }

        if let Some(state_tx) = &self.state_tx {
            state_tx.send_if_modified(|state| {
                if matches!(state, ConnectionState::PermanentlyDisconnected(_)) {
                    return false;
                }
                *state = ConnectionState::Disconnected("Client disconnected".to_string());
                true
            });
        }

        match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, handle).await {
            Ok(Ok(())) => {
                debug!("Event loop task shut down gracefully");
            }
            Ok(Err(e)) if !e.is_cancelled() => {
                warn!("Event loop task ended with error: {}", e);
            }
            Err(_) => {
                warn!("Event loop task didn't shut down gracefully, abandoning it");
            }
            _ => {}
        }

        let metrics = self.health_metrics();
        info!(
            uptime = ?metrics.uptime,
            reconnects = metrics.reconnect_count,
            "MQTT client disconnected"
        );
        Ok(())
    }

    /// Get current connection state
    /// Returns None if `connect()` hasn't been called yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    /// Get health metrics for the connection
    pub fn health_metrics(&self) -> HealthMetrics {
        let last_message_time = self.last_message_time.lock().ok().and_then(|time| *time);
        HealthMonitor::calculate_health_metrics(
            self.connect_time,
            last_message_time,
            self.reconnect_count.load(Ordering::Relaxed),
        )
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state_rx = self.state_rx.as_ref().ok_or_else(|| MqttError::NotConnected {
            state: ConnectionState::Disconnected("connect() was not called".to_string()),
        })?;

        let current_state = state_rx.borrow().clone();
        if !HealthMonitor::can_subscribe(&current_state) {
            return Err(MqttError::NotConnected {
                state: current_state,
            });
        }

        Ok(())
    }
}

/// Owns the rumqttc event loop and drives it until shutdown or permanent loss
struct EventLoopSupervisor {
    broker_url: String,
    client: AsyncClient,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    reconnect_attempts: u32,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    suback_tx: SubAckSender,
    message_forwarder: Arc<Mutex<MessageForwarder>>,
    last_message_time: Arc<std::sync::Mutex<Option<Instant>>>,
    reconnect_count: Arc<AtomicU32>,
}

impl EventLoopSupervisor {
    async fn run(mut self, mut event_loop: EventLoop, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Starting MQTT event loop for {}", self.broker_url);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT event loop");
                        Self::flush_disconnect(&mut event_loop).await;
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    let keep_running = match event_result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            self.process_event_route(route).await
                        }
                        Err(e) => self.handle_event_loop_error(e).await,
                    };
                    if !keep_running {
                        break;
                    }
                }
            }
        }

        info!("MQTT event loop stopped for {}", self.broker_url);
    }

    /// Keep polling until the queued Disconnect packet went out
    async fn flush_disconnect(event_loop: &mut EventLoop) {
        let flushed = tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;

        if flushed.is_err() {
            debug!("Disconnect packet not flushed within {:?}", DISCONNECT_FLUSH_TIMEOUT);
        }
    }

    fn transition(&self, event: ConnectionEvent) {
        let new_state = HealthMonitor::determine_next_state(event);
        let old_state = self.state_tx.borrow().clone();
        HealthMonitor::log_state_transition(&old_state, &new_state, &self.broker_url);
        let _ = self.state_tx.send(new_state);
    }

    /// Returns true to keep polling, false to stop the supervisor
    async fn process_event_route(&mut self, route: EventRoute) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged { session_present } => {
                self.transition(ConnectionEvent::ConnAckReceived);
                if self.reconnect_attempts > 0 {
                    self.reconnect_count.fetch_add(1, Ordering::Relaxed);
                }
                self.reconnect_attempts = 0;
                if !session_present {
                    self.resubscribe().await;
                }
                true
            }
            EventRoute::MessageReceived(message) => {
                self.handle_message_received(message).await;
                true
            }
            EventRoute::Disconnected => {
                self.transition(ConnectionEvent::DisconnectedByBroker);
                self.attempt_reconnection().await
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                return_codes,
            } => {
                debug!("SubAck {} received: {:?}", packet_id, return_codes);
                let _ = self.suback_tx.send(return_codes);
                true
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!("MQTT event: {}", event);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    async fn handle_event_loop_error(&mut self, error: ConnectionError) -> bool {
        if *self.shutdown_rx.borrow() {
            return false;
        }

        error!("MQTT event loop error: {}", error);
        self.transition(ConnectionEvent::NetworkError(error.to_string()));
        self.attempt_reconnection().await
    }

    async fn handle_message_received(&self, message: InboundMessage) {
        debug!("Received MQTT message on topic: {}", message.topic);

        if let Ok(mut last) = self.last_message_time.lock() {
            *last = Some(Instant::now());
        }

        let filters: Vec<String> = self
            .subscriptions
            .lock()
            .await
            .iter()
            .map(|s| s.topic.clone())
            .collect();
        if !MessageHandler::should_process_message(&message.topic, &filters) {
            return;
        }

        // Not held across the send: a full backlog must not block set_message_sender()
        let forwarder = self.message_forwarder.lock().await.clone();
        if let Err(e) = forwarder.forward_message(message).await {
            error!("Failed to forward message: {}", e);
        }
    }

    /// The broker dropped the session, so restore every subscription
    async fn resubscribe(&self) {
        let subscriptions = self.subscriptions.lock().await;
        for subscription in subscriptions.iter() {
            // try_subscribe: the event loop is not polled while we are here
            match self
                .client
                .try_subscribe(subscription.topic.clone(), subscription.qos)
            {
                Ok(()) => debug!("Re-subscribed to: {}", subscription.topic),
                Err(e) => error!("Failed to re-subscribe to {}: {}", subscription.topic, e),
            }
        }
    }

    /// Sleep that returns false as soon as shutdown is requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    /// Returns true when the next poll should reconnect
    async fn attempt_reconnection(&mut self) -> bool {
        let decision = HealthMonitor::should_attempt_reconnection(
            self.reconnect_attempts,
            &self.reconnect_config,
            *self.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.reconnect_attempts = attempt;
                self.transition(ConnectionEvent::ReconnectionStarted(attempt));
                info!(
                    "Attempting reconnection {}/{} after {}ms delay",
                    attempt, self.reconnect_config.max_attempts, delay_ms
                );

                // rumqttc reconnects on the next poll
                Self::interruptible_sleep(self.shutdown_rx.clone(), delay_ms).await
            }
            ReconnectionDecision::AbortShutdownRequested => {
                info!("Shutdown signal received, stopping reconnection");
                false
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                let reason = if self.reconnect_config.max_attempts == 0 {
                    "Connection lost and reconnection is disabled".to_string()
                } else {
                    format!(
                        "Max reconnection attempts ({}) exceeded",
                        self.reconnect_config.max_attempts
                    )
                };
                self.transition(ConnectionEvent::PermanentFailure(reason));
                false
            }
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), Self::Error> {
        MqttClient::subscribe(self, topic, qos).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn is_permanently_disconnected(&self) -> bool {
        MqttClient::is_permanently_disconnected(self)
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        MqttClient::set_message_sender(self, sender).await
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        // No async in Drop; callers wanting a clean Disconnect use disconnect()
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
