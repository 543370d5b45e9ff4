//! Single-slot acknowledgment tracking for client-ack sessions.
//!
//! Holding exactly one pending frame caps unacknowledged in-flight work at
//! one message per session: a crash between delivery and ack yields a
//! redelivery, never a silent loss, and never more than one duplicate.

use tracing::warn;

use stompq_codec::frame::commands;
use stompq_codec::Frame;
use stompq_core::{headers, AckMode};
use stompq_transport::FrameTransport;

use crate::error::QueueError;
use crate::session::Session;

/// Ack headers captured from one delivered MESSAGE frame.
#[derive(Debug, Clone)]
pub struct PendingAck {
    headers: Vec<(String, String)>,
}

/// At most one unacknowledged frame reference; inert in auto-ack mode.
#[derive(Debug)]
pub struct AckController {
    mode: AckMode,
    pending: Option<PendingAck>,
}

impl AckController {
    pub fn new(mode: AckMode) -> Self {
        Self {
            mode,
            pending: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Records the frame just handed to the caller.
    ///
    /// STOMP 1.2 frames carry an `ack` token; older brokers are acked by
    /// `message-id` plus `subscription`. Frames with neither cannot be
    /// acknowledged and are skipped with a warning.
    pub fn note_delivered(&mut self, frame: &Frame) {
        if self.mode != AckMode::Client {
            return;
        }
        let mut ack_headers = Vec::new();
        if let Some(token) = frame.header(headers::ACK) {
            ack_headers.push(("id".to_string(), token.to_string()));
        } else {
            if let Some(message_id) = frame.header(headers::MESSAGE_ID) {
                ack_headers.push((headers::MESSAGE_ID.to_string(), message_id.to_string()));
            }
            if let Some(subscription) = frame.header(headers::SUBSCRIPTION) {
                ack_headers.push((headers::SUBSCRIPTION.to_string(), subscription.to_string()));
            }
        }
        if ack_headers.is_empty() {
            warn!("delivered frame carries no ack/message-id header, cannot ack");
            return;
        }
        self.pending = Some(PendingAck {
            headers: ack_headers,
        });
    }

    /// Sends the pending ACK, if any.
    ///
    /// Called before the next read, on job completion, and on graceful
    /// shutdown. With no session available the slot is dropped silently:
    /// the broker will redeliver.
    pub fn flush<T: FrameTransport>(
        &mut self,
        session: Option<&mut Session<T>>,
    ) -> Result<(), QueueError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let Some(session) = session else {
            return Ok(());
        };
        let mut frame = Frame::new(commands::ACK);
        frame.headers = pending.headers;
        session.send(&frame)
    }

    /// Drops the slot without acking (dead session teardown).
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
