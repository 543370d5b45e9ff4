use thiserror::Error;

/// Errors returned by envelope encode/decode operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload JSON serialization/deserialization failure.
    #[error("payload encode error: {0}")]
    Json(#[from] serde_json::Error),
    /// Outgoing payload was not a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,
}
