//! Message types carried from the broker to the request handlers

use bytes::Bytes;
use chrono::{DateTime, Local};
use std::borrow::Cow;
use std::fmt;

/// Delimiter between the request keyword and its argument
pub const REQUEST_DELIMITER: char = ':';

/// A message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    /// QoS level the message was delivered at (0, 1 or 2)
    pub qos: u8,
    pub retain: bool,
    pub received_at: DateTime<Local>,
}

impl InboundMessage {
    /// Create a message stamped with the current local time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: u8) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
            received_at: Local::now(),
        }
    }

    /// Payload decoded as text; invalid UTF-8 sequences are replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// One-line arrival summary
    pub fn summary(&self) -> String {
        format!(
            "Time:\t{}  Topic:\t{}  Message:\t{}  QoS:\t{}",
            self.received_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.topic,
            self.text(),
            self.qos
        )
    }

    /// Parse the payload into a request
    pub fn request(&self) -> Request {
        Request::parse(&self.text())
    }
}

/// A request parsed from a message payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `facebook:<argument>` or `fb:<argument>`
    Facebook { argument: String },
    /// `twitter:<argument>` or `tw:<argument>`
    Twitter { argument: String },
    /// Anything else; `keyword` is the lowercased first token
    Unknown { keyword: String },
}

impl Request {
    /// Split `text` on `:` and select a request by its first token
    ///
    /// The keyword match is case-insensitive. The argument is the second
    /// token only, so `fb:a:b` carries `a`. A recognized keyword without an
    /// argument carries an empty one.
    pub fn parse(text: &str) -> Self {
        let mut tokens = text.split(REQUEST_DELIMITER);
        let keyword = tokens.next().unwrap_or_default().to_lowercase();
        let argument = tokens.next().unwrap_or_default().to_string();

        match keyword.as_str() {
            "facebook" | "fb" => Request::Facebook { argument },
            "twitter" | "tw" => Request::Twitter { argument },
            _ => Request::Unknown { keyword },
        }
    }

    /// Short name of the request kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Facebook { .. } => "facebook",
            Request::Twitter { .. } => "twitter",
            Request::Unknown { .. } => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Request::Unknown { .. })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Facebook { argument } => write!(f, "facebook:{argument}"),
            Request::Twitter { argument } => write!(f, "twitter:{argument}"),
            Request::Unknown { keyword } => write!(f, "unknown({keyword})"),
        }
    }
}
