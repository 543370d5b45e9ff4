//! Scripted in-memory transports for tests and simulations.
//!
//! The engine consumes transports by value, so each double comes with a
//! cloneable handle that keeps scripting and inspecting possible after the
//! transport has moved into the engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use stompq_codec::Frame;

use crate::error::TransportError;
use crate::transport::{Connector, FrameTransport, TransportEvent};

#[derive(Debug, Default)]
struct TransportState {
    inbound: VecDeque<InboundEvent>,
    sent: Vec<Frame>,
    heartbeats: u32,
    /// `Some(n)`: the next `n` sends succeed, every later one fails.
    sends_before_failure: Option<usize>,
    closed: bool,
}

#[derive(Debug)]
enum InboundEvent {
    Frame(Frame),
    Heartbeat,
    Error,
}

/// In-memory `FrameTransport` fed and observed through [`TransportHandle`].
#[derive(Debug)]
pub struct InMemoryTransport {
    state: Arc<Mutex<TransportState>>,
}

/// Test-side handle to one [`InMemoryTransport`].
#[derive(Debug, Clone)]
pub struct TransportHandle {
    state: Arc<Mutex<TransportState>>,
}

impl InMemoryTransport {
    pub fn new() -> (Self, TransportHandle) {
        let state = Arc::new(Mutex::new(TransportState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            TransportHandle { state },
        )
    }
}

impl FrameTransport for InMemoryTransport {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("transport state");
        if state.closed {
            return Err(TransportError::Closed);
        }
        if let Some(remaining) = state.sends_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(TransportError::Closed);
            }
            *remaining -= 1;
        }
        state.sent.push(frame.clone());
        Ok(())
    }

    fn receive(&mut self) -> Result<TransportEvent, TransportError> {
        let mut state = self.state.lock().expect("transport state");
        if state.closed {
            return Err(TransportError::Closed);
        }
        match state.inbound.pop_front() {
            Some(InboundEvent::Frame(frame)) => Ok(TransportEvent::Frame(frame)),
            Some(InboundEvent::Heartbeat) => Ok(TransportEvent::Heartbeat),
            Some(InboundEvent::Error) => Err(TransportError::Closed),
            // An exhausted script reads as the transport's own read timeout.
            None => Err(TransportError::Timeout),
        }
    }

    fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("transport state");
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.heartbeats += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().expect("transport state").closed = true;
    }
}

impl TransportHandle {
    /// Queues a frame for delivery on the next `receive`.
    pub fn push_frame(&self, frame: Frame) {
        self.state
            .lock()
            .expect("transport state")
            .inbound
            .push_back(InboundEvent::Frame(frame));
    }

    /// Queues a bare peer heartbeat for the next `receive`.
    pub fn push_heartbeat(&self) {
        self.state
            .lock()
            .expect("transport state")
            .inbound
            .push_back(InboundEvent::Heartbeat);
    }

    /// Queues a transport error for the next `receive`.
    pub fn push_read_error(&self) {
        self.state
            .lock()
            .expect("transport state")
            .inbound
            .push_back(InboundEvent::Error);
    }

    /// All frames sent so far, in order.
    pub fn sent(&self) -> Vec<Frame> {
        self.state.lock().expect("transport state").sent.clone()
    }

    /// Number of frames sent with the given command.
    pub fn sent_count(&self, command: &str) -> usize {
        self.state
            .lock()
            .expect("transport state")
            .sent
            .iter()
            .filter(|frame| frame.command == command)
            .count()
    }

    pub fn heartbeats(&self) -> u32 {
        self.state.lock().expect("transport state").heartbeats
    }

    /// Makes every subsequent send fail with a closed-connection error.
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().expect("transport state").sends_before_failure =
            if fail { Some(0) } else { None };
    }

    /// Lets `count` more sends through, then fails the rest.
    pub fn fail_sends_after(&self, count: usize) {
        self.state.lock().expect("transport state").sends_before_failure = Some(count);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("transport state").closed
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    script: VecDeque<ConnectPlan>,
    attempts: u32,
}

#[derive(Debug)]
enum ConnectPlan {
    Fail,
    Transport(InMemoryTransport),
}

/// Scripted connector: yields failures and transports in a fixed order.
#[derive(Debug)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
}

/// Test-side handle to one [`ScriptedConnector`].
#[derive(Debug, Clone)]
pub struct ConnectorHandle {
    state: Arc<Mutex<ConnectorState>>,
}

impl ScriptedConnector {
    pub fn new() -> (Self, ConnectorHandle) {
        let state = Arc::new(Mutex::new(ConnectorState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ConnectorHandle { state },
        )
    }
}

impl Connector for ScriptedConnector {
    type Transport = InMemoryTransport;

    fn connect(&mut self) -> Result<Self::Transport, TransportError> {
        let mut state = self.state.lock().expect("connector state");
        state.attempts += 1;
        match state.script.pop_front() {
            Some(ConnectPlan::Transport(transport)) => Ok(transport),
            Some(ConnectPlan::Fail) => {
                Err(TransportError::Connect("scripted failure".to_string()))
            }
            None => Err(TransportError::Connect("script exhausted".to_string())),
        }
    }
}

impl ConnectorHandle {
    /// Scripts `count` failed connection attempts.
    pub fn push_failures(&self, count: usize) {
        let mut state = self.state.lock().expect("connector state");
        for _ in 0..count {
            state.script.push_back(ConnectPlan::Fail);
        }
    }

    /// Scripts one successful attempt yielding a fresh transport; the
    /// returned handle drives that transport.
    pub fn push_transport(&self) -> TransportHandle {
        let (transport, handle) = InMemoryTransport::new();
        self.state
            .lock()
            .expect("connector state")
            .script
            .push_back(ConnectPlan::Transport(transport));
        handle
    }

    /// Total `connect` calls observed.
    pub fn attempts(&self) -> u32 {
        self.state.lock().expect("connector state").attempts
    }
}

#[cfg(test)]
mod tests {
    use stompq_codec::frame::commands;
    use stompq_codec::Frame;

    use super::{InMemoryTransport, ScriptedConnector};
    use crate::error::TransportError;
    use crate::transport::{Connector, FrameTransport, TransportEvent};

    #[test]
    fn scripted_events_are_delivered_in_order() {
        let (mut transport, handle) = InMemoryTransport::new();
        handle.push_frame(Frame::new(commands::CONNECTED));
        handle.push_heartbeat();
        handle.push_frame(Frame::new(commands::MESSAGE));
        assert!(transport
            .receive()
            .expect("first")
            .into_frame()
            .expect("frame")
            .is(commands::CONNECTED));
        assert!(matches!(
            transport.receive().expect("second"),
            TransportEvent::Heartbeat
        ));
        assert!(transport
            .receive()
            .expect("third")
            .into_frame()
            .expect("frame")
            .is_message());
        assert!(matches!(
            transport.receive(),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn send_failures_and_close_are_observable() {
        let (mut transport, handle) = InMemoryTransport::new();
        transport
            .send(&Frame::new(commands::SEND))
            .expect("send ok");
        handle.fail_sends(true);
        assert!(transport.send(&Frame::new(commands::SEND)).is_err());
        assert_eq!(handle.sent_count(commands::SEND), 1);

        transport.close();
        assert!(handle.is_closed());
    }

    #[test]
    fn send_allowance_fails_only_after_it_is_spent() {
        let (mut transport, handle) = InMemoryTransport::new();
        handle.fail_sends_after(2);
        transport.send(&Frame::new(commands::CONNECT)).expect("first");
        transport.send(&Frame::new(commands::SEND)).expect("second");
        assert!(transport.send(&Frame::new(commands::SEND)).is_err());
        assert_eq!(handle.sent().len(), 2);
    }

    #[test]
    fn connector_script_runs_failures_then_success() {
        let (mut connector, handle) = ScriptedConnector::new();
        handle.push_failures(2);
        let transport_handle = handle.push_transport();

        assert!(connector.connect().is_err());
        assert!(connector.connect().is_err());
        let mut transport = connector.connect().expect("third attempt");
        assert_eq!(handle.attempts(), 3);

        transport_handle.push_frame(Frame::new(commands::CONNECTED));
        assert!(transport
            .receive()
            .expect("frame")
            .into_frame()
            .expect("frame")
            .is(commands::CONNECTED));
    }
}
