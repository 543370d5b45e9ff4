//! Job handler registry: maps envelope names onto executable handlers.

use std::collections::HashMap;

use stompq_codec::envelope::{Envelope, EnvelopeKind};

pub type HandlerResult = Result<(), String>;
pub type HandlerFn = Box<dyn Fn(&Envelope) -> HandlerResult + Send>;

/// Outcome of looking a delivered envelope up in the registry.
pub enum Dispatch {
    Handled(HandlerResult),
    Unhandled,
}

/// Name-keyed handler table.
///
/// Native jobs are keyed by their `job` field; external events by the
/// name derived from their source destination (`event.<topic>.<queue>`).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&Envelope) -> HandlerResult + Send + 'static,
    ) {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    pub fn dispatch(&self, envelope: &Envelope) -> Dispatch {
        let key = match &envelope.kind {
            EnvelopeKind::Native { job, .. } => job.as_str(),
            EnvelopeKind::External => envelope.name.as_str(),
        };
        match self.handlers.get(key) {
            Some(handler) => Dispatch::Handled(handler(envelope)),
            None => Dispatch::Unhandled,
        }
    }
}

/// Whether a failed envelope earns another delivery.
///
/// `attempts` counts completed deliveries before this one, so the run that
/// just failed is attempt `attempts + 1`.
pub fn should_retry(attempts: u32, max_tries: u32) -> bool {
    attempts.saturating_add(1) < max_tries
}
