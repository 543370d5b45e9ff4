//! Shared primitives for the stompq queue adapter.
//!
//! Destination addressing, acknowledgment modes, and the header names the
//! rest of the workspace agrees on live here.

pub mod types;

pub use types::{AckMode, Destination, QUEUE_SEPARATOR};

/// Well-known STOMP and broker header names.
pub mod headers {
    /// Correlation id propagated across publish/consume hops.
    pub const CORRELATION: &str = "X-Correlation-ID";
    /// Broker-assigned message identifier on MESSAGE frames.
    pub const MESSAGE_ID: &str = "message-id";
    /// Explicit ack token on STOMP 1.2 MESSAGE frames.
    pub const ACK: &str = "ack";
    /// Subscription id a MESSAGE frame was delivered on.
    pub const SUBSCRIPTION: &str = "subscription";
    /// Stripped before any (re)send; stale after body mutation.
    pub const CONTENT_LENGTH: &str = "content-length";
    /// ActiveMQ/Artemis scheduled-delivery delay, in milliseconds.
    pub const SCHEDULED_DELAY: &str = "AMQ_SCHEDULED_DELAY";
    /// Consumer flow-control window on SUBSCRIBE (Artemis).
    pub const CONSUMER_WINDOW_SIZE: &str = "consumer-window-size";
}
