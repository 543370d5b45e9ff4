//! Blocking TCP frame transport for stompq.
//!
//! One `TcpFrameTransport` owns one socket. The engine drives it from a
//! single caller thread, so reads block on the socket directly; liveness is
//! handled above this crate via heartbeat accounting, not a reader thread.

use std::io::{BufReader, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use stompq_codec::frame::{read_event, write_frame, write_heartbeat};
use stompq_codec::{Frame, WireError, WireEvent};
use stompq_transport::{Connector, FrameTransport, TransportError, TransportEvent};

/// Connection parameters for one broker endpoint.
#[derive(Debug, Clone)]
pub struct TcpConnectorConfig {
    /// `tcp` is supported; `ssl` is recognized but rejected with a typed
    /// error rather than silently downgraded.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// `None` blocks indefinitely on read, matching the broker-push model.
    pub read_timeout: Option<Duration>,
}

impl TcpConnectorConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "tcp".to_string(),
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
        }
    }
}

/// Opens one fresh socket per `connect` call.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: TcpConnectorConfig,
}

impl TcpConnector {
    pub fn new(config: TcpConnectorConfig) -> Self {
        Self { config }
    }
}

impl Connector for TcpConnector {
    type Transport = TcpFrameTransport;

    fn connect(&mut self) -> Result<Self::Transport, TransportError> {
        if self.config.scheme != "tcp" {
            return Err(TransportError::UnsupportedScheme(self.config.scheme.clone()));
        }

        let endpoint = format!("{}:{}", self.config.host, self.config.port);
        let addr = resolve(&endpoint)?;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.config.read_timeout)?;
        let reader = BufReader::new(stream.try_clone()?);
        info!(endpoint = %endpoint, "tcp transport connected");
        Ok(TcpFrameTransport {
            reader,
            writer: stream,
            closed: false,
        })
    }
}

fn resolve(endpoint: &str) -> Result<SocketAddr, TransportError> {
    endpoint
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| TransportError::Connect(format!("no address for {endpoint}")))
}

/// A connected broker socket carrying raw STOMP frames.
#[derive(Debug)]
pub struct TcpFrameTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    closed: bool,
}

fn map_wire(err: WireError) -> TransportError {
    match err {
        WireError::Io(io) if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            TransportError::Timeout
        }
        WireError::Io(io) => TransportError::Io(io),
        WireError::Closed => TransportError::Closed,
        WireError::Malformed(reason) => TransportError::Wire(reason.to_string()),
    }
}

impl FrameTransport for TcpFrameTransport {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        write_frame(&mut self.writer, frame).map_err(map_wire)
    }

    fn receive(&mut self) -> Result<TransportEvent, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        // Returning per event keeps the read timeout a bound on each wait:
        // a fast-beating peer cannot pin the caller inside one receive.
        match read_event(&mut self.reader).map_err(map_wire)? {
            WireEvent::Frame(frame) => Ok(TransportEvent::Frame(frame)),
            WireEvent::Heartbeat => Ok(TransportEvent::Heartbeat),
        }
    }

    fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        write_heartbeat(&mut self.writer).map_err(map_wire)
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("tcp transport closing");
            let _ = self.writer.shutdown(Shutdown::Both);
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use stompq_codec::frame::commands;
    use stompq_codec::Frame;
    use stompq_transport::{Connector, FrameTransport, TransportError, TransportEvent};

    use super::{TcpConnector, TcpConnectorConfig};

    #[test]
    fn unsupported_scheme_is_rejected() {
        let mut config = TcpConnectorConfig::new("127.0.0.1", 61613);
        config.scheme = "ssl".to_string();
        let err = TcpConnector::new(config).connect().expect_err("must fail");
        assert!(matches!(err, TransportError::UnsupportedScheme(_)));
    }

    #[test]
    fn frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            // Read the client's SEND frame up to its NUL terminator.
            let mut received = Vec::new();
            let mut byte = [0_u8; 1];
            loop {
                stream.read_exact(&mut byte).expect("read");
                received.push(byte[0]);
                if byte[0] == 0 {
                    break;
                }
            }
            stream
                .write_all(b"CONNECTED\nsession:s-1\nversion:1.2\n\n\0")
                .expect("write");
            received
        });

        let mut config = TcpConnectorConfig::new("127.0.0.1", port);
        config.read_timeout = Some(Duration::from_secs(5));
        let mut transport = TcpConnector::new(config).connect().expect("connect");

        transport
            .send(&Frame::new(commands::SEND).with_header("destination", "orders"))
            .expect("send");
        let frame = transport
            .receive()
            .expect("receive")
            .into_frame()
            .expect("frame");
        assert!(frame.is(commands::CONNECTED));
        assert_eq!(frame.header("session"), Some("s-1"));

        let received = server.join().expect("server thread");
        let text = String::from_utf8_lossy(&received);
        assert!(text.starts_with("SEND\ndestination:orders\n"));

        transport.close();
        assert!(transport.receive().is_err());
    }

    #[test]
    fn bare_heartbeat_eols_surface_between_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream.write_all(b"\n\n").expect("beats");
            stream
                .write_all(b"MESSAGE\nmessage-id:m-1\n\nhi\0")
                .expect("frame");
        });

        let mut config = TcpConnectorConfig::new("127.0.0.1", port);
        config.read_timeout = Some(Duration::from_secs(5));
        let mut transport = TcpConnector::new(config).connect().expect("connect");

        assert!(matches!(
            transport.receive().expect("first beat"),
            TransportEvent::Heartbeat
        ));
        assert!(matches!(
            transport.receive().expect("second beat"),
            TransportEvent::Heartbeat
        ));
        let frame = transport
            .receive()
            .expect("frame")
            .into_frame()
            .expect("frame");
        assert!(frame.is_message());
        assert_eq!(frame.body, b"hi".to_vec());
        server.join().expect("server thread");
    }

    #[test]
    fn read_timeout_surfaces_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let _guard = thread::spawn(move || {
            let (_stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(500));
        });

        let mut config = TcpConnectorConfig::new("127.0.0.1", port);
        config.read_timeout = Some(Duration::from_millis(50));
        let mut transport = TcpConnector::new(config).connect().expect("connect");
        let err = transport.receive().expect_err("no data");
        assert!(err.is_timeout());
    }
}
