//! Frame and message codecs for the stompq queue adapter.
//!
//! `frame` owns the STOMP wire format; `envelope` turns frames into
//! work-item envelopes and job payloads back into outbound messages.

pub mod envelope;
pub mod error;
pub mod frame;

pub use error::CodecError;
pub use frame::{Frame, WireError, WireEvent};
