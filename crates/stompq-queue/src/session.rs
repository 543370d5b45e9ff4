//! One broker session: login handshake, heartbeat negotiation, liveness.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use stompq_codec::frame::commands;
use stompq_codec::Frame;
use stompq_transport::{Connector, FrameTransport, TransportEvent};

use crate::config::StompConfig;
use crate::error::QueueError;

const ACCEPT_VERSIONS: &str = "1.0,1.1,1.2";
// The peer is overdue once this many negotiated intervals pass silently.
const HEARTBEAT_GRACE_FACTOR: u32 = 2;

/// Tracks server activity against the negotiated heartbeat interval.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    expected: Option<Duration>,
    last_activity: Instant,
}

impl HeartbeatMonitor {
    pub fn new(expected: Option<Duration>) -> Self {
        Self {
            expected,
            last_activity: Instant::now(),
        }
    }

    /// Call on every received frame or heartbeat.
    pub fn observe(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the server has missed its heartbeat window.
    pub fn is_overdue(&self) -> bool {
        match self.expected {
            Some(interval) => self.last_activity.elapsed() > interval * HEARTBEAT_GRACE_FACTOR,
            None => false,
        }
    }
}

/// One arrival surfaced from the session, split by kind so callers can
/// tell "no work" from an actual delivery.
#[derive(Debug)]
pub enum Received {
    Message(Frame),
    Control(Frame),
    /// Bare peer heartbeat; already counted as liveness.
    Heartbeat,
}

/// One live broker connection plus its negotiated parameters.
///
/// Exactly one session is current at any time; reconnection builds a fresh
/// one and discards the old.
#[derive(Debug)]
pub struct Session<T: FrameTransport> {
    transport: T,
    id: String,
    version: String,
    /// Interval at which the server promised to show activity.
    server_beat: Option<Duration>,
    /// Interval at which we owe the server activity.
    client_beat: Option<Duration>,
    monitor: HeartbeatMonitor,
}

fn parse_heart_beat(raw: &str) -> (u64, u64) {
    let mut parts = raw.splitn(2, ',').map(|part| part.trim().parse().unwrap_or(0));
    let sx = parts.next().unwrap_or(0);
    let sy = parts.next().unwrap_or(0);
    (sx, sy)
}

// STOMP negotiation: a zero on either side disables the beat, otherwise the
// effective interval is the larger of the two.
fn negotiate(ours_ms: u32, theirs_ms: u64) -> Option<Duration> {
    if ours_ms == 0 || theirs_ms == 0 {
        return None;
    }
    Some(Duration::from_millis(u64::from(ours_ms).max(theirs_ms)))
}

impl<T: FrameTransport> Session<T> {
    /// Opens a transport and performs the CONNECT/CONNECTED handshake.
    ///
    /// Fails fast on any error; bounded retry belongs to the reconnect
    /// supervisor.
    pub fn connect<C>(connector: &mut C, config: &StompConfig) -> Result<Self, QueueError>
    where
        C: Connector<Transport = T>,
    {
        let mut transport = connector.connect()?;

        let mut connect = Frame::new(commands::CONNECT)
            .with_header("accept-version", ACCEPT_VERSIONS)
            .with_header("host", config.vhost.as_str())
            .with_header(
                "heart-beat",
                format!("{},{}", config.send_heartbeat_ms, config.receive_heartbeat_ms),
            );
        if let Some((user, pass)) = config.credentials() {
            connect = connect.with_header("login", user).with_header("passcode", pass);
        }
        transport.send(&connect)?;

        // Heartbeats cannot legally precede CONNECTED but are tolerated.
        let reply = loop {
            match transport.receive()? {
                TransportEvent::Frame(frame) => break frame,
                TransportEvent::Heartbeat => continue,
            }
        };
        if reply.is(commands::ERROR) {
            let detail = reply.header("message").unwrap_or("broker refused connection");
            return Err(QueueError::Protocol(format!("connect rejected: {detail}")));
        }
        if !reply.is(commands::CONNECTED) {
            return Err(QueueError::Protocol(format!(
                "expected CONNECTED, got {}",
                reply.command
            )));
        }

        let id = reply.header("session").unwrap_or("-").to_string();
        let version = reply.header("version").unwrap_or("1.0").to_string();
        let (server_send, server_receive) = reply
            .header("heart-beat")
            .map(parse_heart_beat)
            .unwrap_or((0, 0));
        let server_beat = negotiate(config.receive_heartbeat_ms, server_send);
        let client_beat = negotiate(config.send_heartbeat_ms, server_receive);

        info!(
            session = %id,
            %version,
            server_beat_ms = server_beat.map(|d| d.as_millis() as u64),
            client_beat_ms = client_beat.map(|d| d.as_millis() as u64),
            "session established"
        );

        Ok(Self {
            transport,
            id,
            version,
            server_beat,
            client_beat,
            monitor: HeartbeatMonitor::new(server_beat),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn server_beat(&self) -> Option<Duration> {
        self.server_beat
    }

    pub fn send(&mut self, frame: &Frame) -> Result<(), QueueError> {
        self.transport.send(frame)?;
        Ok(())
    }

    /// Blocks for the next arrival; every one, bare heartbeats included,
    /// refreshes the liveness monitor. Non-MESSAGE frames are surfaced
    /// distinctly.
    pub fn receive(&mut self) -> Result<Received, QueueError> {
        let event = self.transport.receive()?;
        self.monitor.observe();
        match event {
            TransportEvent::Heartbeat => Ok(Received::Heartbeat),
            TransportEvent::Frame(frame) if frame.is_message() => Ok(Received::Message(frame)),
            TransportEvent::Frame(frame) => Ok(Received::Control(frame)),
        }
    }

    /// Emits a client heartbeat when one was negotiated.
    pub fn send_probe(&mut self) -> Result<(), QueueError> {
        if self.client_beat.is_some() {
            self.transport.send_heartbeat()?;
        }
        Ok(())
    }

    pub fn is_overdue(&self) -> bool {
        self.monitor.is_overdue()
    }

    /// Graceful shutdown: best-effort DISCONNECT, then close.
    pub fn disconnect(&mut self) {
        debug!(session = %self.id, "disconnecting session");
        let _ = self.transport.send(&Frame::new(commands::DISCONNECT));
        self.transport.close();
    }

    /// Drops the connection without protocol niceties (dead sessions).
    pub fn close(&mut self) {
        self.transport.close();
    }
}
