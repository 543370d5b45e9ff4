use thiserror::Error;

use stompq_codec::CodecError;
use stompq_transport::TransportError;

/// Errors surfaced by the queue engine.
///
/// Transport errors trigger the reconnect path; protocol errors are
/// normally absorbed as "no work this cycle"; encoding and circuit-open
/// errors are fatal for the call that raised them.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),
    #[error("reconnect circuit open after {attempts} failed attempts")]
    CircuitOpen { attempts: u32 },
    #[error("no active session")]
    Closed,
}

impl QueueError {
    /// Whether the underlying session must be torn down and rebuilt.
    pub fn is_transport(&self) -> bool {
        matches!(self, QueueError::Transport(err) if !err.is_timeout())
    }
}
