use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the topic and queue segments of a destination.
pub const QUEUE_SEPARATOR: &str = "::";

/// A broker-addressable destination, either a bare topic or `topic::queue`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(String);

impl Destination {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The topic segment (everything before the separator).
    pub fn topic(&self) -> &str {
        match self.0.split_once(QUEUE_SEPARATOR) {
            Some((topic, _)) => topic,
            None => &self.0,
        }
    }

    /// The queue segment, when the destination carries one.
    pub fn queue(&self) -> Option<&str> {
        self.0.split_once(QUEUE_SEPARATOR).map(|(_, queue)| queue)
    }

    /// Whether the name is fully qualified as `topic::queue`.
    pub fn is_qualified(&self) -> bool {
        self.0.contains(QUEUE_SEPARATOR)
    }

    /// Destination name with separators dotted, for derived event names.
    pub fn dotted(&self) -> String {
        self.0.replace(QUEUE_SEPARATOR, ".")
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Destination {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Broker acknowledgment mode for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    /// Broker acknowledges implicitly on delivery.
    Auto,
    /// Consumer must send an explicit ACK frame.
    Client,
}

impl AckMode {
    /// Value of the `ack` header on SUBSCRIBE frames.
    pub fn as_header(self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
        }
    }
}

impl Default for AckMode {
    fn default() -> Self {
        AckMode::Client
    }
}

#[cfg(test)]
mod tests {
    use super::{AckMode, Destination};

    #[test]
    fn destination_splits_topic_and_queue() {
        let dest = Destination::new("orders::svc1_ab12c");
        assert_eq!(dest.topic(), "orders");
        assert_eq!(dest.queue(), Some("svc1_ab12c"));
        assert!(dest.is_qualified());
    }

    #[test]
    fn bare_topic_has_no_queue() {
        let dest = Destination::new("orders");
        assert_eq!(dest.topic(), "orders");
        assert_eq!(dest.queue(), None);
        assert!(!dest.is_qualified());
    }

    #[test]
    fn dotted_replaces_every_separator() {
        let dest = Destination::new("orders::svc1::sub");
        assert_eq!(dest.dotted(), "orders.svc1.sub");
    }

    #[test]
    fn ack_mode_headers_are_stable() {
        assert_eq!(AckMode::Auto.as_header(), "auto");
        assert_eq!(AckMode::Client.as_header(), "client");
    }
}
