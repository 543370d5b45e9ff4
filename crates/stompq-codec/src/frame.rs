use std::io::{BufRead, Write};

use thiserror::Error;

/// STOMP frame commands used by this adapter.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SEND: &str = "SEND";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const MESSAGE: &str = "MESSAGE";
    pub const ACK: &str = "ACK";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const ERROR: &str = "ERROR";
}

/// One STOMP protocol unit: command, headers, optional body.
///
/// Header order is preserved as received/added; lookups return the first
/// match, per the STOMP rule that repeated headers keep the first value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replaces every occurrence of `name`, or appends when absent.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(key, _)| key != name);
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn is(&self, command: &str) -> bool {
        self.command == command
    }

    pub fn is_message(&self) -> bool {
        self.is(commands::MESSAGE)
    }
}

/// Errors from reading or writing frames on the wire.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("connection closed by peer")]
    Closed,
}

// CONNECT/CONNECTED are exchanged before the protocol version is known, so
// STOMP 1.2 exempts them from header escaping.
fn escaped_command(command: &str) -> bool {
    command != commands::CONNECT && command != commands::CONNECTED
}

fn escape_header(raw: &str, out: &mut Vec<u8>) {
    for byte in raw.bytes() {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b':' => out.extend_from_slice(b"\\c"),
            other => out.push(other),
        }
    }
}

fn unescape_header(raw: &str) -> Result<String, WireError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(WireError::Malformed("invalid header escape")),
        }
    }
    Ok(out)
}

/// Serializes a frame, appending a `content-length` header for the body.
pub fn write_frame(writer: &mut impl Write, frame: &Frame) -> Result<(), WireError> {
    let mut buf = Vec::with_capacity(frame.body.len() + 128);
    buf.extend_from_slice(frame.command.as_bytes());
    buf.push(b'\n');
    let escape = escaped_command(&frame.command);
    for (name, value) in &frame.headers {
        if name == "content-length" {
            continue;
        }
        if escape {
            escape_header(name, &mut buf);
            buf.push(b':');
            escape_header(value, &mut buf);
        } else {
            buf.extend_from_slice(name.as_bytes());
            buf.push(b':');
            buf.extend_from_slice(value.as_bytes());
        }
        buf.push(b'\n');
    }
    if !frame.body.is_empty() {
        buf.extend_from_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
    }
    buf.push(b'\n');
    buf.extend_from_slice(&frame.body);
    buf.push(b'\0');
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Sends a bare heartbeat EOL.
pub fn write_heartbeat(writer: &mut impl Write) -> Result<(), WireError> {
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn read_line(reader: &mut impl BufRead) -> Result<Option<String>, WireError> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 {
        return Err(WireError::Closed);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.is_empty() {
        return Ok(None);
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| WireError::Malformed("non-utf8 frame header"))
}

/// One unit read off the wire: a complete frame, or a bare heartbeat EOL.
///
/// Heartbeats are surfaced rather than skipped so callers can account for
/// peer liveness between frames.
#[derive(Debug)]
pub enum WireEvent {
    Frame(Frame),
    Heartbeat,
}

/// Blocks until one frame or heartbeat EOL has been read.
pub fn read_event(reader: &mut impl BufRead) -> Result<WireEvent, WireError> {
    let command = match read_line(reader)? {
        Some(line) => line,
        None => return Ok(WireEvent::Heartbeat),
    };

    let escape = escaped_command(&command);
    let mut frame = Frame::new(command);
    while let Some(line) = read_line(reader)? {
        let (name, value) = line
            .split_once(':')
            .ok_or(WireError::Malformed("header without separator"))?;
        if escape {
            frame
                .headers
                .push((unescape_header(name)?, unescape_header(value)?));
        } else {
            frame.headers.push((name.to_string(), value.to_string()));
        }
    }

    match frame.header("content-length") {
        Some(length) => {
            let length: usize = length
                .parse()
                .map_err(|_| WireError::Malformed("bad content-length"))?;
            let mut body = vec![0_u8; length];
            reader.read_exact(&mut body)?;
            let mut terminator = [0_u8; 1];
            reader.read_exact(&mut terminator)?;
            if terminator[0] != b'\0' {
                return Err(WireError::Malformed("missing frame terminator"));
            }
            frame.body = body;
        }
        None => {
            let mut body = Vec::new();
            reader.read_until(b'\0', &mut body)?;
            if body.pop() != Some(b'\0') {
                return Err(WireError::Closed);
            }
            frame.body = body;
        }
    }

    Ok(WireEvent::Frame(frame))
}

/// Blocks until one complete frame has been read, discarding heartbeats.
pub fn read_frame(reader: &mut impl BufRead) -> Result<Frame, WireError> {
    loop {
        if let WireEvent::Frame(frame) = read_event(reader)? {
            return Ok(frame);
        }
    }
}
