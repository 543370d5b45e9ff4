//! Publish path: fan one encoded message out to every write destination.

use tracing::{error, info, warn};

use stompq_codec::envelope::OutboundMessage;
use stompq_codec::Frame;
use stompq_core::Destination;
use stompq_transport::Connector;

use crate::destinations::resolve_write_destinations;
use crate::error::QueueError;
use crate::queue::StompQueue;

/// Result of one publish call across all target destinations.
///
/// Partial failure is data, not an exception: `all_sent` is the logical
/// AND of the individual sends, with per-destination detail alongside.
#[derive(Debug)]
pub struct PublishOutcome {
    pub all_sent: bool,
    pub failures: Vec<(Destination, QueueError)>,
}

impl PublishOutcome {
    fn from_failures(failures: Vec<(Destination, QueueError)>) -> Self {
        Self {
            all_sent: failures.is_empty(),
            failures,
        }
    }
}

impl<C: Connector> StompQueue<C> {
    /// Encodes a raw JSON payload and publishes it.
    ///
    /// The payload's inline `_headers` are split out, a missing `uuid` is
    /// generated, and a correlation id is injected when neither the payload
    /// nor the inherited context carries one.
    pub fn push(
        &mut self,
        payload: &str,
        queue_override: Option<&str>,
    ) -> Result<PublishOutcome, QueueError> {
        let mut message = OutboundMessage::from_json(payload)?;
        message.ensure_correlation(self.correlation_context.as_deref());
        self.push_message(message, queue_override)
    }

    /// Publishes an already-encoded message to the override spec or the
    /// configured write list.
    ///
    /// A failure on one destination does not abort the others; each is
    /// logged and reported in the outcome. A transport failure earns one
    /// automatic reconnect-then-retry before counting as failed.
    pub fn push_message(
        &mut self,
        message: OutboundMessage,
        queue_override: Option<&str>,
    ) -> Result<PublishOutcome, QueueError> {
        let targets = match queue_override {
            Some(spec) => resolve_write_destinations(spec),
            None => self.write_destinations.clone(),
        };
        self.ensure_session(false)?;

        let mut failures = Vec::new();
        for destination in &targets {
            let frame = message.to_frame(destination);
            match self.send_with_retry(&frame) {
                Ok(()) => {
                    info!(destination = %destination, "message sent");
                }
                Err(err @ QueueError::CircuitOpen { .. }) => return Err(err),
                Err(err) => {
                    error!(destination = %destination, error = %err, "message not sent");
                    failures.push((destination.clone(), err));
                }
            }
        }
        Ok(PublishOutcome::from_failures(failures))
    }

    fn send_with_retry(&mut self, frame: &Frame) -> Result<(), QueueError> {
        match self.session_mut()?.send(frame) {
            Ok(()) => Ok(()),
            Err(err) if err.is_transport() => {
                warn!(error = %err, "send failed, reconnecting once");
                // Outbound-only failure: no need to replay subscriptions.
                self.reconnect(false)?;
                self.session_mut()?.send(frame)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use stompq_codec::frame::commands;
    use stompq_codec::Frame;
    use stompq_core::headers;
    use stompq_transport::mem::ScriptedConnector;

    use crate::config::StompConfig;
    use crate::destinations::FixedSuffix;
    use crate::error::QueueError;
    use crate::queue::StompQueue;

    fn config() -> StompConfig {
        StompConfig {
            read_queues: "inbound".to_string(),
            write_queues: "orders::q1;billing::q2".to_string(),
            reconnect_delay_ms: 0,
            ..StompConfig::default()
        }
    }

    fn queue_with_transport() -> (
        StompQueue<ScriptedConnector>,
        stompq_transport::mem::TransportHandle,
        stompq_transport::mem::ConnectorHandle,
    ) {
        let (connector, connector_handle) = ScriptedConnector::new();
        let transport = connector_handle.push_transport();
        transport.push_frame(Frame::new(commands::CONNECTED).with_header("session", "s-1"));
        let queue = StompQueue::with_suffix_source(
            config(),
            connector,
            &mut FixedSuffix("fixed".to_string()),
        );
        (queue, transport, connector_handle)
    }

    #[test]
    fn push_fans_out_to_every_write_destination() {
        let (mut queue, transport, _) = queue_with_transport();
        let outcome = queue
            .push(r#"{"job":"SendEmail","data":{"to":"a@b.com"}}"#, None)
            .expect("push");
        assert!(outcome.all_sent);

        let sends: Vec<Frame> = transport
            .sent()
            .into_iter()
            .filter(|frame| frame.is(commands::SEND))
            .collect();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].header("destination"), Some("orders::q1"));
        assert_eq!(sends[1].header("destination"), Some("billing::q2"));
        // Identical encoded body on every destination.
        assert_eq!(sends[0].body, sends[1].body);

        let body: Value = serde_json::from_slice(&sends[0].body).expect("json");
        assert!(body.get("uuid").is_some());
        assert!(sends[0].header(headers::CORRELATION).is_some());
        assert_eq!(sends[0].header("content-length"), None);
    }

    #[test]
    fn queue_override_wins_over_the_configured_list() {
        let (mut queue, transport, _) = queue_with_transport();
        queue
            .push(r#"{"a":1}"#, Some("priority::q9"))
            .expect("push");
        let sends: Vec<Frame> = transport
            .sent()
            .into_iter()
            .filter(|frame| frame.is(commands::SEND))
            .collect();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].header("destination"), Some("priority::q9"));
    }

    #[test]
    fn inherited_correlation_context_is_applied() {
        let (mut queue, transport, _) = queue_with_transport();
        queue.set_correlation_context(Some("corr-req-1".to_string()));
        queue.push(r#"{"a":1}"#, Some("orders::q1")).expect("push");
        let sent = transport.sent();
        let send = sent.iter().find(|f| f.is(commands::SEND)).expect("send");
        assert_eq!(send.header(headers::CORRELATION), Some("corr-req-1"));
    }

    #[test]
    fn invalid_payload_is_an_encoding_error() {
        let (mut queue, _, _) = queue_with_transport();
        let err = queue.push("not json", None).expect_err("must fail");
        assert!(matches!(err, QueueError::Encoding(_)));
    }

    #[test]
    fn send_failure_reconnects_once_and_retries() {
        let (mut queue, transport, connector_handle) = queue_with_transport();
        // First publish establishes the session, then the link dies.
        queue.push(r#"{"a":1}"#, Some("orders::q1")).expect("push");
        transport.fail_sends(true);

        let second = connector_handle.push_transport();
        second.push_frame(Frame::new(commands::CONNECTED).with_header("session", "s-2"));

        let outcome = queue.push(r#"{"a":2}"#, Some("orders::q1")).expect("push");
        assert!(outcome.all_sent);
        assert_eq!(second.sent_count(commands::SEND), 1);
        assert_eq!(queue.session_id(), Some("s-2"));
    }

    #[test]
    fn partial_failure_reports_the_failing_destination() {
        let (mut queue, transport, connector_handle) = queue_with_transport();
        queue.push(r#"{"warm":true}"#, None).expect("warm up");
        transport.fail_sends(true);
        // The second session handshakes fine but its link dies right
        // after, so the retry for orders::q1 fails too; billing::q2 then
        // reconnects on its own and goes through on the third session.
        let second = connector_handle.push_transport();
        second.push_frame(Frame::new(commands::CONNECTED));
        second.fail_sends_after(1);
        let third = connector_handle.push_transport();
        third.push_frame(Frame::new(commands::CONNECTED));

        let outcome = queue.push(r#"{"a":3}"#, None).expect("partial outcome");
        assert!(!outcome.all_sent);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0.as_str(), "orders::q1");
        // The second session spent its one send on CONNECT.
        assert_eq!(second.sent_count(commands::SEND), 0);
        assert_eq!(third.sent_count(commands::SEND), 1);
        let sent = third.sent();
        let send = sent.iter().find(|f| f.is(commands::SEND)).expect("send");
        assert_eq!(send.header("destination"), Some("billing::q2"));
    }

    #[test]
    fn exhausted_reconnects_surface_the_open_circuit() {
        let (mut queue, transport, _connector_handle) = queue_with_transport();
        queue.push(r#"{"warm":true}"#, None).expect("warm up");
        // Link dies and no further connection can be scripted.
        transport.fail_sends(true);
        let err = queue.push(r#"{"a":4}"#, None).expect_err("fatal");
        assert!(matches!(err, QueueError::CircuitOpen { attempts: 5 }));
    }
}
