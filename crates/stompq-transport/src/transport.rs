use stompq_codec::Frame;

use crate::error::TransportError;

/// One unit received from the broker: a frame, or a bare heartbeat that
/// proves peer liveness without carrying a payload.
#[derive(Debug)]
pub enum TransportEvent {
    Frame(Frame),
    Heartbeat,
}

impl TransportEvent {
    /// The frame, if this event carries one.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            TransportEvent::Frame(frame) => Some(frame),
            TransportEvent::Heartbeat => None,
        }
    }
}

/// A connected, frame-oriented pipe to the broker.
///
/// Implementations carry raw frames only; login, heartbeat negotiation,
/// and session state live above this seam.
pub trait FrameTransport {
    /// Writes one frame. Errors are typed, never swallowed.
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Blocks until the next frame or heartbeat, a transport error, or the
    /// transport's configured read timeout. Peer heartbeats are surfaced,
    /// never swallowed, so liveness accounting above this seam stays
    /// accurate on an idle link.
    fn receive(&mut self) -> Result<TransportEvent, TransportError>;

    /// Emits a client heartbeat. Transports without one may no-op.
    fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Releases the underlying connection. Idempotent.
    fn close(&mut self);
}

/// Produces fresh transports; one call per physical connection attempt.
///
/// Connectors fail fast: bounded retry is the reconnect supervisor's job.
pub trait Connector {
    type Transport: FrameTransport;

    fn connect(&mut self) -> Result<Self::Transport, TransportError>;
}
