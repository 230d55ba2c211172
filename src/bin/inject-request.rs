//! Request Injection Utility
//!
//! Publishes one `<keyword>:<argument>` request to the agent topic so a
//! running agent can be exercised by hand.
//!
//! ## Usage
//!
//! ```bash
//! # Facebook request
//! inject-request --keyword fb --argument hello
//!
//! # Twitter request to another broker and topic
//! inject-request --broker tcp://broker.local:1883 --topic minecraft/server1 \
//!   --keyword twitter --argument world
//!
//! # Raw payload, e.g. to see the unknown-request path
//! inject-request --payload "other:x"
//! ```

use clap::Parser;
use minecraft_agent::transport::mqtt::{parse_broker_address, qos_from_level};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::time::{timeout, Duration};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "inject-request",
    about = "Publish a test request to a running minecraft-agent"
)]
struct Args {
    /// Request keyword (facebook, fb, twitter, tw, or anything else)
    #[arg(long, conflicts_with = "payload", required_unless_present = "payload")]
    keyword: Option<String>,

    /// Request argument
    #[arg(long, default_value = "", conflicts_with = "payload")]
    argument: String,

    /// Raw payload, sent unchanged
    #[arg(long)]
    payload: Option<String>,

    /// MQTT broker URL
    #[arg(long, default_value = "tcp://localhost:1883", env = "MQTT_BROKER_URL")]
    broker: String,

    /// Topic the agent listens on
    #[arg(long, default_value = "minecraft")]
    topic: String,

    /// Publish QoS (0, 1 or 2)
    #[arg(long, default_value_t = 2)]
    qos: u8,
}

/// Build the wire payload from either a raw payload or keyword and argument
fn build_payload(
    keyword: Option<&str>,
    argument: &str,
    payload: Option<&str>,
) -> Result<String, String> {
    match (payload, keyword) {
        (Some(raw), _) => Ok(raw.to_string()),
        (None, Some(keyword)) if keyword.contains(':') => {
            Err(format!("Keyword must not contain ':' (got {keyword:?})"))
        }
        (None, Some(keyword)) => Ok(format!("{keyword}:{argument}")),
        (None, None) => Err("Either --keyword or --payload is required".to_string()),
    }
}

/// Whether this event completes delivery of our single publish
fn is_delivery_complete(event: &Event, qos: QoS) -> bool {
    match event {
        Event::Incoming(Packet::PubAck(_)) => qos == QoS::AtLeastOnce,
        Event::Incoming(Packet::PubComp(_)) => qos == QoS::ExactlyOnce,
        Event::Outgoing(Outgoing::Publish(_)) => qos == QoS::AtMostOnce,
        _ => false,
    }
}

async fn inject(args: &Args, payload: String) -> Result<(), Box<dyn std::error::Error>> {
    let (host, port, tls) = parse_broker_address(&args.broker)?;
    let qos = qos_from_level(args.qos)?;

    let client_id = format!("inject-request-{}", chrono::Local::now().timestamp_millis());
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(Duration::from_secs(60));
    if tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    let (client, mut event_loop) = AsyncClient::new(options, 10);

    println!("Connecting to MQTT broker {}...", args.broker);

    // Queued now, sent by the event loop right after the ConnAck
    client
        .publish(args.topic.as_str(), qos, false, payload.clone())
        .await?;

    let delivery = timeout(DELIVERY_TIMEOUT, async {
        loop {
            let event = match event_loop.poll().await {
                Ok(event) => event,
                Err(e) => return Err(e),
            };
            if let Event::Incoming(Packet::ConnAck(_)) = event {
                println!("Connected");
            }
            if is_delivery_complete(&event, qos) {
                return Ok(());
            }
        }
    })
    .await;

    match delivery {
        Ok(result) => result?,
        Err(_) => return Err(format!("Request not delivered within {DELIVERY_TIMEOUT:?}").into()),
    }

    println!("✓ Published {:?} to {} (QoS {})", payload, args.topic, args.qos);

    client.disconnect().await?;
    let _ = timeout(DISCONNECT_TIMEOUT, async {
        while let Ok(event) = event_loop.poll().await {
            if let Event::Outgoing(Outgoing::Disconnect) = event {
                break;
            }
        }
    })
    .await;

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let payload = match build_payload(
        args.keyword.as_deref(),
        &args.argument,
        args.payload.as_deref(),
    ) {
        Ok(payload) => payload,
        Err(e) => {
            eprintln!("✗ {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = inject(&args, payload).await {
        eprintln!("✗ Failed to inject request: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{PubAck, PubComp, Publish};

    #[test]
    fn test_build_payload_from_keyword() {
        assert_eq!(build_payload(Some("fb"), "hello", None).unwrap(), "fb:hello");
        assert_eq!(build_payload(Some("twitter"), "", None).unwrap(), "twitter:");
    }

    #[test]
    fn test_build_payload_raw_wins() {
        assert_eq!(
            build_payload(None, "", Some("other:x")).unwrap(),
            "other:x"
        );
    }

    #[test]
    fn test_build_payload_errors() {
        assert!(build_payload(None, "", None).is_err());
        assert!(build_payload(Some("fb:x"), "y", None).is_err());
    }

    #[test]
    fn test_delivery_completion_per_qos() {
        let puback = Event::Incoming(Packet::PubAck(PubAck::new(1)));
        let pubcomp = Event::Incoming(Packet::PubComp(PubComp::new(1)));
        let sent = Event::Outgoing(Outgoing::Publish(1));

        assert!(is_delivery_complete(&sent, QoS::AtMostOnce));
        assert!(is_delivery_complete(&puback, QoS::AtLeastOnce));
        assert!(is_delivery_complete(&pubcomp, QoS::ExactlyOnce));

        assert!(!is_delivery_complete(&puback, QoS::ExactlyOnce));
        assert!(!is_delivery_complete(&sent, QoS::ExactlyOnce));

        let incoming = Event::Incoming(Packet::Publish(Publish::new(
            "minecraft",
            QoS::ExactlyOnce,
            "fb:x",
        )));
        assert!(!is_delivery_complete(&incoming, QoS::ExactlyOnce));
    }
}
