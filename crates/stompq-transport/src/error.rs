use thiserror::Error;

/// Errors surfaced by frame transports and connectors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport's own read timeout elapsed with no frame.
    #[error("read timed out")]
    Timeout,
    #[error("connection closed")]
    Closed,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("unsupported connection scheme: {0}")]
    UnsupportedScheme(String),
    #[error("malformed wire data: {0}")]
    Wire(String),
}

impl TransportError {
    /// Timeouts mean "no traffic yet"; everything else means the session
    /// is unusable and must be torn down.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}
