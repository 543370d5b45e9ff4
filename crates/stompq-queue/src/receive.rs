//! Consume path: pop the next envelope, release failed work for redelivery.

use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;

use stompq_codec::envelope::{self, Envelope};
use stompq_core::headers;
use stompq_transport::Connector;

use crate::audit::ReadEvent;
use crate::error::QueueError;
use crate::publish::PublishOutcome;
use crate::queue::StompQueue;
use crate::session::Received;

// Consecutive non-deliveries tolerated before the session is presumed
// wedged and rebuilt.
const STRAY_FRAME_LIMIT: u32 = 3;

impl<C: Connector> StompQueue<C> {
    /// Fetches the next unit of work, or `None` when the read times out.
    ///
    /// Every call first acknowledges the previous delivery, then verifies
    /// session liveness and subscriptions before blocking on the wire. A
    /// transport failure anywhere in the cycle rebuilds the session once
    /// and reports no work; the caller's next call reads from the fresh
    /// session, so a broken link never turns into a busy loop here.
    ///
    /// Callers must complete (`delete`) or requeue (`release`) the previous
    /// envelope before popping again; the flush on entry acknowledges
    /// whatever is still pending, treating it as handled.
    pub fn pop(&mut self) -> Result<Option<Envelope>, QueueError> {
        if let Err(err) = self.flush_pending_ack() {
            if !err.is_transport() {
                return Err(err);
            }
            warn!(error = %err, "ack flush hit a dead link, rebuilding session");
            self.reconnect(true)?;
        }
        self.ensure_session(true)?;

        if self.session_mut()?.is_overdue() {
            warn!("server heartbeat overdue, rebuilding session");
            self.reconnect(true)?;
        }
        if let Err(err) = self.session_mut()?.send_probe() {
            if !err.is_transport() {
                return Err(err);
            }
            warn!(error = %err, "heartbeat probe failed, rebuilding session");
            self.reconnect(true)?;
        }
        self.ensure_subscriptions()?;

        let received = match self.session_mut()?.receive() {
            Ok(received) => received,
            Err(QueueError::Transport(err)) if err.is_timeout() => return Ok(None),
            Err(err) if err.is_transport() => {
                warn!(error = %err, "read failed, rebuilding session");
                self.reconnect(true)?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mut frame = match received {
            Received::Message(frame) => frame,
            // Liveness, not noise: already observed by the session monitor.
            Received::Heartbeat => return Ok(None),
            Received::Control(frame) => {
                self.note_stray(&frame.command)?;
                return Ok(None);
            }
        };
        let Some(destination) = self.registry.destination_for(&frame).cloned() else {
            self.note_stray("MESSAGE (unknown subscription)")?;
            return Ok(None);
        };
        self.strays = 0;

        // The correlation id travels with the frame and becomes the
        // inherited context for anything this job publishes.
        let correlation = match frame.header(headers::CORRELATION) {
            Some(value) => value.to_string(),
            None => {
                let generated = Uuid::new_v4().to_string();
                frame.set_header(headers::CORRELATION, generated.as_str());
                generated
            }
        };
        self.correlation_context = Some(correlation);

        self.ack.note_delivered(&frame);
        self.sink.record(ReadEvent {
            session_id: self.session_id().unwrap_or("-").to_string(),
            destination: destination.clone(),
            subscription_id: frame.header(headers::SUBSCRIPTION).map(str::to_string),
            message_id: frame.header(headers::MESSAGE_ID).map(str::to_string),
            payload: frame.body.clone(),
            recorded_at: SystemTime::now(),
        });

        let envelope = envelope::decode(&frame, destination);
        debug!(
            job_id = %envelope.job_id,
            name = %envelope.name,
            attempts = envelope.attempts,
            "message delivered"
        );
        Ok(Some(envelope))
    }

    /// Requeues a failed envelope on its source destination with an
    /// incremented attempt counter, then acknowledges the original.
    ///
    /// The redelivery delay is `attempts ^ multiplier` seconds under
    /// auto-backoff, otherwise `delay_secs` verbatim. The ack comes after
    /// the requeue on purpose: a crash in between yields a duplicate, not
    /// a lost job.
    pub fn release(
        &mut self,
        envelope: &Envelope,
        delay_secs: u64,
    ) -> Result<PublishOutcome, QueueError> {
        let redelivery = envelope::build_redelivery(
            envelope,
            delay_secs,
            self.config.auto_backoff,
            self.config.backoff_multiplier,
        )?;
        info!(
            job_id = %envelope.job_id,
            attempts = redelivery.attempts,
            backoff_secs = redelivery.backoff_secs,
            destination = %envelope.source,
            "releasing for redelivery"
        );
        let outcome = self.push_message(redelivery.message, Some(envelope.source.as_str()))?;
        self.flush_pending_ack()?;
        Ok(outcome)
    }

    fn note_stray(&mut self, kind: &str) -> Result<(), QueueError> {
        self.strays += 1;
        warn!(
            frame = kind,
            strays = self.strays,
            "unexpected frame on the read path"
        );
        if self.strays >= STRAY_FRAME_LIMIT {
            warn!("stray frame limit reached, rebuilding session");
            self.reconnect(true)?;
        }
        Ok(())
    }
}
