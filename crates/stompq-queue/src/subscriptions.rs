//! Subscription registry for the current session.
//!
//! Tracks which destinations are live, replays nothing on its own: after a
//! session is replaced the registry is reset and repopulated lazily before
//! the next read.

use tracing::info;

use stompq_codec::frame::commands;
use stompq_codec::Frame;
use stompq_core::{headers, AckMode, Destination};
use stompq_transport::FrameTransport;

use crate::error::QueueError;
use crate::session::Session;

#[derive(Debug)]
struct SubscriptionEntry {
    id: String,
    destination: Destination,
}

/// Destination -> subscription bookkeeping, scoped to one session.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<SubscriptionEntry>,
    // Monotonic across sessions so stale ids can never alias fresh ones.
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self, destination: &Destination) -> bool {
        self.entries
            .iter()
            .any(|entry| &entry.destination == destination)
    }

    /// Subscribes every destination not yet live in this session.
    ///
    /// Idempotent: repeated calls with the same set send nothing new. A
    /// non-positive window size is sent as `-1` (unbounded); some brokers
    /// deliver only a single message without it.
    pub fn ensure_subscribed<T: FrameTransport>(
        &mut self,
        session: &mut Session<T>,
        destinations: &[Destination],
        ack_mode: AckMode,
        window_size: i64,
    ) -> Result<(), QueueError> {
        for destination in destinations {
            if self.is_subscribed(destination) {
                continue;
            }
            let id = format!("sub-{}", self.next_id);
            let window = if window_size <= 0 {
                "-1".to_string()
            } else {
                window_size.to_string()
            };
            let frame = Frame::new(commands::SUBSCRIBE)
                .with_header("id", id.as_str())
                .with_header("destination", destination.as_str())
                .with_header("ack", ack_mode.as_header())
                .with_header(headers::CONSUMER_WINDOW_SIZE, window);
            session.send(&frame)?;
            info!(subscription = %id, destination = %destination, "subscribed");
            self.next_id += 1;
            self.entries.push(SubscriptionEntry {
                id,
                destination: destination.clone(),
            });
        }
        Ok(())
    }

    /// Destination a MESSAGE frame was delivered on, via its subscription id.
    pub fn destination_for(&self, frame: &Frame) -> Option<&Destination> {
        let id = frame.header(headers::SUBSCRIPTION)?;
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.destination)
    }

    /// Forgets all subscriptions without wire traffic; used once the
    /// session they belonged to is gone.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use stompq_codec::frame::commands;
    use stompq_codec::Frame;
    use stompq_core::{headers, AckMode, Destination};
    use stompq_transport::mem::{ScriptedConnector, TransportHandle};

    use super::SubscriptionRegistry;
    use crate::config::StompConfig;
    use crate::session::Session;

    fn session() -> (
        Session<stompq_transport::mem::InMemoryTransport>,
        TransportHandle,
    ) {
        let (mut connector, handle) = ScriptedConnector::new();
        let transport = handle.push_transport();
        transport.push_frame(Frame::new(commands::CONNECTED).with_header("session", "s-1"));
        let session = Session::connect(&mut connector, &StompConfig::default()).expect("connect");
        (session, transport)
    }

    fn destinations() -> Vec<Destination> {
        vec![
            Destination::new("orders::svc1_a"),
            Destination::new("billing::svc1_b"),
        ]
    }

    #[test]
    fn ensure_subscribed_is_idempotent() {
        let (mut session, transport) = session();
        let mut registry = SubscriptionRegistry::new();
        let dests = destinations();

        registry
            .ensure_subscribed(&mut session, &dests, AckMode::Client, -1)
            .expect("subscribe");
        registry
            .ensure_subscribed(&mut session, &dests, AckMode::Client, -1)
            .expect("subscribe again");

        assert_eq!(transport.sent_count(commands::SUBSCRIBE), 2);
        let sent = transport.sent();
        let subscribe = sent
            .iter()
            .find(|frame| frame.is(commands::SUBSCRIBE))
            .expect("subscribe frame");
        assert_eq!(subscribe.header("ack"), Some("client"));
        assert_eq!(subscribe.header(headers::CONSUMER_WINDOW_SIZE), Some("-1"));
    }

    #[test]
    fn positive_window_size_is_forwarded_verbatim() {
        let (mut session, transport) = session();
        let mut registry = SubscriptionRegistry::new();
        registry
            .ensure_subscribed(
                &mut session,
                &[Destination::new("orders::q")],
                AckMode::Auto,
                1_048_576,
            )
            .expect("subscribe");
        let sent = transport.sent();
        let subscribe = sent.last().expect("frame");
        assert_eq!(
            subscribe.header(headers::CONSUMER_WINDOW_SIZE),
            Some("1048576")
        );
        assert_eq!(subscribe.header("ack"), Some("auto"));
    }

    #[test]
    fn destination_resolution_follows_the_subscription_id() {
        let (mut session, _transport) = session();
        let mut registry = SubscriptionRegistry::new();
        let dests = destinations();
        registry
            .ensure_subscribed(&mut session, &dests, AckMode::Client, -1)
            .expect("subscribe");

        let frame = Frame::new(commands::MESSAGE).with_header(headers::SUBSCRIPTION, "sub-1");
        assert_eq!(registry.destination_for(&frame), Some(&dests[1]));

        let unknown = Frame::new(commands::MESSAGE).with_header(headers::SUBSCRIPTION, "sub-9");
        assert_eq!(registry.destination_for(&unknown), None);

        let missing = Frame::new(commands::MESSAGE);
        assert_eq!(registry.destination_for(&missing), None);
    }

    #[test]
    fn reset_forgets_subscriptions_but_keeps_ids_monotonic() {
        let (mut session, transport) = session();
        let mut registry = SubscriptionRegistry::new();
        let dests = destinations();
        registry
            .ensure_subscribed(&mut session, &dests, AckMode::Client, -1)
            .expect("subscribe");
        registry.reset();
        assert!(!registry.is_subscribed(&dests[0]));

        registry
            .ensure_subscribed(&mut session, &dests, AckMode::Client, -1)
            .expect("resubscribe");
        // Fresh ids after reset: sub-2, sub-3.
        let sent = transport.sent();
        let last = sent.last().expect("frame");
        assert_eq!(last.header("id"), Some("sub-3"));
    }
}
