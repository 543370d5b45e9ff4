//! Fire-and-forget audit boundary for read events.
//!
//! Sinks must never block or fail message processing: `record` is
//! infallible at this seam, and implementations swallow and log their own
//! errors.

use std::time::SystemTime;

use tracing::info;

use stompq_core::Destination;

/// One observed message delivery.
#[derive(Debug, Clone)]
pub struct ReadEvent {
    pub session_id: String,
    pub destination: Destination,
    pub subscription_id: Option<String>,
    pub message_id: Option<String>,
    pub payload: Vec<u8>,
    pub recorded_at: SystemTime,
}

/// Receives one event per delivered frame.
pub trait ReadEventSink {
    fn record(&self, event: ReadEvent);
}

/// Default sink: drops everything.
#[derive(Debug, Default)]
pub struct NoopSink;

impl ReadEventSink for NoopSink {
    fn record(&self, _event: ReadEvent) {}
}

/// Structured-log sink.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReadEventSink for LogSink {
    fn record(&self, event: ReadEvent) {
        info!(
            session = %event.session_id,
            destination = %event.destination,
            subscription = event.subscription_id.as_deref().unwrap_or("-"),
            message_id = event.message_id.as_deref().unwrap_or("-"),
            payload_bytes = event.payload.len(),
            "read event"
        );
    }
}
