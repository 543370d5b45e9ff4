//! Transport abstractions for stompq.
//!
//! The queue engine only depends on the frame-oriented transport and
//! connector traits defined in this crate; `mem` provides scripted
//! in-memory implementations for tests.

pub mod error;
pub mod mem;
pub mod transport;

pub use error::TransportError;
pub use transport::{Connector, FrameTransport, TransportEvent};
