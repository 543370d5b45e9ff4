//! Session and delivery engine for the stompq queue adapter.
//!
//! This crate wires session lifecycle, heartbeat liveness, bounded
//! reconnection, subscription replay, single-slot acknowledgment tracking,
//! and message/envelope translation on top of a pluggable frame transport.

pub mod ack;
pub mod audit;
pub mod config;
pub mod destinations;
pub mod error;
pub mod publish;
pub mod queue;
pub mod receive;
pub mod reconnect;
pub mod session;
pub mod subscriptions;

pub use config::StompConfig;
pub use error::QueueError;
pub use publish::PublishOutcome;
pub use queue::StompQueue;
