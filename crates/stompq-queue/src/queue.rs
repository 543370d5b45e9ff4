//! The queue-adapter facade: owns the session, registries, and config.

use tracing::{debug, warn};

use stompq_core::Destination;
use stompq_transport::Connector;

use crate::ack::AckController;
use crate::audit::{NoopSink, ReadEventSink};
use crate::config::StompConfig;
use crate::destinations::{
    resolve_read_destinations, resolve_write_destinations, RandomSuffix, SuffixSource,
};
use crate::error::QueueError;
use crate::reconnect::ReconnectSupervisor;
use crate::session::Session;
use crate::subscriptions::SubscriptionRegistry;

/// Durable-delivery adapter between a job runner and one STOMP broker.
///
/// One instance owns one logical session and is driven by one caller;
/// sharing an instance across tasks requires serializing every mutating
/// call behind a single lock, since the one-in-flight-ack invariant and
/// the single-session model are not otherwise safe.
pub struct StompQueue<C: Connector> {
    pub(crate) config: StompConfig,
    pub(crate) connector: C,
    pub(crate) session: Option<Session<C::Transport>>,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) ack: AckController,
    pub(crate) supervisor: ReconnectSupervisor,
    pub(crate) read_destinations: Vec<Destination>,
    pub(crate) write_destinations: Vec<Destination>,
    pub(crate) sink: Box<dyn ReadEventSink>,
    pub(crate) correlation_context: Option<String>,
    pub(crate) strays: u32,
}

impl<C: Connector> StompQueue<C> {
    /// Builds an adapter; the session is established lazily on first use.
    pub fn new(config: StompConfig, connector: C) -> Self {
        Self::with_suffix_source(config, connector, &mut RandomSuffix::new())
    }

    /// Variant with an injected suffix source, for deterministic names.
    pub fn with_suffix_source(
        config: StompConfig,
        connector: C,
        source: &mut impl SuffixSource,
    ) -> Self {
        let read_destinations = resolve_read_destinations(
            &config.read_queues,
            &config.default_queue,
            config.prepend_queues,
            source,
        );
        let write_destinations = resolve_write_destinations(&config.write_queues);
        let supervisor = ReconnectSupervisor::from_config(&config);
        let ack = AckController::new(config.ack_mode);
        Self {
            config,
            connector,
            session: None,
            registry: SubscriptionRegistry::new(),
            ack,
            supervisor,
            read_destinations,
            write_destinations,
            sink: Box::new(NoopSink),
            correlation_context: None,
            strays: 0,
        }
    }

    /// Replaces the audit sink.
    pub fn with_sink(mut self, sink: Box<dyn ReadEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Correlation id inherited by outgoing messages that carry none.
    pub fn set_correlation_context(&mut self, correlation: Option<String>) {
        self.correlation_context = correlation;
    }

    pub fn read_destinations(&self) -> &[Destination] {
        &self.read_destinations
    }

    pub fn write_destinations(&self) -> &[Destination] {
        &self.write_destinations
    }

    /// Broker session id of the current session, if connected.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::id)
    }

    /// Acknowledges the most recently delivered message, if one is pending.
    ///
    /// Call on job completion or permanent failure; redelivery goes through
    /// `release` instead.
    pub fn delete(&mut self) -> Result<(), QueueError> {
        self.flush_pending_ack()
    }

    /// Graceful shutdown: flush the pending ack, DISCONNECT, drop state.
    pub fn close(&mut self) {
        if let Err(err) = self.flush_pending_ack() {
            warn!(error = %err, "final ack flush failed during close");
            self.ack.clear();
        }
        if let Some(mut session) = self.session.take() {
            session.disconnect();
        }
        self.registry.reset();
        debug!("queue adapter closed");
    }

    pub(crate) fn flush_pending_ack(&mut self) -> Result<(), QueueError> {
        self.ack.flush(self.session.as_mut())
    }

    pub(crate) fn session_mut(&mut self) -> Result<&mut Session<C::Transport>, QueueError> {
        self.session.as_mut().ok_or(QueueError::Closed)
    }

    /// Connects lazily when no session exists.
    pub(crate) fn ensure_session(&mut self, resubscribe: bool) -> Result<(), QueueError> {
        if self.session.is_some() {
            return Ok(());
        }
        self.establish(resubscribe)
    }

    /// Tears down the current session and builds a fresh one.
    pub(crate) fn reconnect(&mut self, resubscribe: bool) -> Result<(), QueueError> {
        if let Some(mut session) = self.session.take() {
            // Best effort only: the session is presumed broken.
            if self.ack.flush(Some(&mut session)).is_err() {
                self.ack.clear();
            }
            session.close();
        }
        self.establish(resubscribe)
    }

    fn establish(&mut self, resubscribe: bool) -> Result<(), QueueError> {
        self.registry.reset();
        self.strays = 0;
        let session = self.supervisor.establish(&mut self.connector, &self.config)?;
        self.session = Some(session);
        if resubscribe {
            self.ensure_subscriptions()?;
        }
        Ok(())
    }

    pub(crate) fn ensure_subscriptions(&mut self) -> Result<(), QueueError> {
        let session = self.session.as_mut().ok_or(QueueError::Closed)?;
        self.registry.ensure_subscribed(
            session,
            &self.read_destinations,
            self.config.ack_mode,
            self.config.consumer_window_size,
        )
    }
}
