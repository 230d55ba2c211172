//! Pure message routing and processing logic for MQTT events
//!
//! This module contains pure functions for handling MQTT events,
//! converting publishes into inbound messages, and routing decisions.

use super::connection::qos_level;
use crate::protocol::{topic_matches, InboundMessage};
use chrono::Local;
use rumqttc::{Event, Packet, Publish, QoS, SubscribeReasonCode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Convert an incoming publish into an inbound message stamped now
    pub fn to_inbound_message(publish: &Publish) -> InboundMessage {
        InboundMessage {
            topic: publish.topic.clone(),
            payload: publish.payload.clone(),
            qos: qos_level(publish.qos),
            retain: publish.retain,
            received_at: Local::now(),
        }
    }

    /// Determine if a message arrived on one of our subscriptions (pure function)
    pub fn should_process_message(topic: &str, filters: &[String]) -> bool {
        if filters.iter().any(|filter| topic_matches(filter, topic)) {
            return true;
        }

        debug!(
            "Topic {} matches none of the subscriptions {:?}",
            topic, filters
        );
        false
    }

    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    session_present: connack.session_present,
                },
                Packet::Publish(publish) => {
                    EventRoute::MessageReceived(Self::to_inbound_message(publish))
                }
                Packet::Disconnect => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    return_codes: suback.return_codes.clone(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Validate subscription success from SubAck (pure function)
    ///
    /// Returns the granted QoS per filter; the broker may grant less than
    /// requested, and messages are then delivered at the lower level.
    pub fn validate_subscription_success(
        return_codes: &[SubscribeReasonCode],
    ) -> Result<Vec<QoS>, String> {
        return_codes
            .iter()
            .map(|code| match code {
                SubscribeReasonCode::Success(qos) => Ok(*qos),
                SubscribeReasonCode::Failure => Err(format!(
                    "Subscription failed with return codes: {return_codes:?}"
                )),
            })
            .collect()
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged - ready to subscribe
    ConnectionAcknowledged { session_present: bool },
    /// Message received on subscribed topic
    MessageReceived(InboundMessage),
    /// MQTT broker disconnected
    Disconnected,
    /// Subscription confirmed with return codes
    SubscriptionConfirmed {
        packet_id: u16,
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// Infrastructure event (PingResp, PubRel, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Message forwarding operations (impure I/O)
///
/// Cheap to clone; callers clone it out of any lock before forwarding.
#[derive(Clone)]
pub struct MessageForwarder {
    message_sender: Option<mpsc::Sender<InboundMessage>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self {
            message_sender: None,
        }
    }

    pub fn set_message_sender(&mut self, sender: mpsc::Sender<InboundMessage>) {
        self.message_sender = Some(sender);
    }

    /// Forward an inbound message to the processing task (impure I/O)
    pub async fn forward_message(&self, message: InboundMessage) -> Result<(), String> {
        if let Some(ref sender) = self.message_sender {
            debug!("Forwarding message from {} to dispatcher", message.topic);

            let message = match sender.try_send(message) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(message)) => {
                    warn!(
                        "Dispatcher backlog full ({} messages), waiting for space",
                        sender.max_capacity()
                    );
                    message
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err("Failed to forward message to dispatcher: channel closed".to_string())
                }
            };

            sender
                .send(message)
                .await
                .map_err(|e| format!("Failed to forward message to dispatcher: {e}"))
        } else {
            warn!("Received MQTT message but no message sender configured - message dropped");
            Err("No message sender configured".to_string())
        }
    }
}

impl Default for MessageForwarder {
    fn default() -> Self {
        Self::new()
    }
}
