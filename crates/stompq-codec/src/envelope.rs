//! Message codec: outgoing payload -> frame parts, incoming frame -> envelope.
//!
//! Payload bodies are JSON objects. An outgoing payload may carry its frame
//! headers inline under the `_headers` key; the codec splits them out,
//! injects the idempotency/correlation ids the broker side expects, and
//! strips headers that would corrupt a redelivery.

use serde_json::{Map, Value};
use uuid::Uuid;

use stompq_core::{headers, Destination};

use crate::error::CodecError;
use crate::frame::Frame;

/// JSON key carrying inline frame headers in an outgoing payload.
pub const HEADERS_KEY: &str = "_headers";
/// Body field holding the explicit idempotency id.
pub const UUID_KEY: &str = "uuid";
/// Body field holding the delivery attempt counter.
pub const ATTEMPTS_KEY: &str = "attempts";
/// Body field holding the computed redelivery backoff, in seconds.
pub const BACKOFF_KEY: &str = "backoff";

/// Broker-internal scheduling headers plus `content-length` go stale once a
/// body has been rebuilt, and must never be copied onto a resent frame.
pub fn is_redelivery_unsafe(name: &str) -> bool {
    name.to_ascii_lowercase().contains("_amq") || name.eq_ignore_ascii_case(headers::CONTENT_LENGTH)
}

/// Drops every redelivery-unsafe header in place.
pub fn strip_redelivery_headers(header_list: &mut Vec<(String, String)>) {
    header_list.retain(|(name, _)| !is_redelivery_unsafe(name));
}

/// Redelivery backoff in seconds: `attempts ^ multiplier`, saturating.
pub fn backoff_seconds(attempts: u32, multiplier: u32) -> u64 {
    u64::from(attempts).saturating_pow(multiplier)
}

/// An encoded message ready to be sent: body bytes plus frame headers.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    /// Builds a message from a raw JSON payload string.
    ///
    /// The `_headers` key is split out into frame headers, a missing `uuid`
    /// body field is generated, and redelivery-unsafe headers are dropped.
    pub fn from_json(raw: &str) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut body) = value else {
            return Err(CodecError::NotAnObject);
        };
        let header_list = match body.remove(HEADERS_KEY) {
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(name, value)| (name, header_value_string(value)))
                .collect(),
            _ => Vec::new(),
        };
        Self::from_parts(body, header_list)
    }

    /// Builds a message from an already-split body object and header list.
    pub fn from_parts(
        mut body: Map<String, Value>,
        mut header_list: Vec<(String, String)>,
    ) -> Result<Self, CodecError> {
        add_missing_uuid(&mut body);
        strip_redelivery_headers(&mut header_list);
        Ok(Self {
            body: serde_json::to_vec(&Value::Object(body))?,
            headers: header_list,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Injects a correlation id when none is set.
    ///
    /// A value inherited from the inbound request context wins over
    /// generating a fresh one.
    pub fn ensure_correlation(&mut self, inherited: Option<&str>) {
        if self.header(headers::CORRELATION).is_some() {
            return;
        }
        let value = match inherited {
            Some(value) => value.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        self.headers.push((headers::CORRELATION.to_string(), value));
    }

    /// The SEND frame for one destination.
    pub fn to_frame(&self, destination: &Destination) -> Frame {
        let mut frame = Frame::new(crate::frame::commands::SEND)
            .with_header("destination", destination.as_str())
            .with_body(self.body.clone());
        frame.headers.extend(self.headers.iter().cloned());
        frame
    }
}

fn header_value_string(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn add_missing_uuid(body: &mut Map<String, Value>) {
    if !body.contains_key(UUID_KEY) {
        body.insert(
            UUID_KEY.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
    }
}

/// How the job-runner should dispatch a decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Payload names a job handler directly.
    Native { job: String, data: Value },
    /// Foreign event; dispatched by derived name only.
    External,
}

/// One decoded unit of work extracted from a MESSAGE frame.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Raw frame body bytes, untouched.
    pub body: Vec<u8>,
    /// Frame headers as received.
    pub headers: Vec<(String, String)>,
    /// Idempotency id: body `uuid`, else `message-id`, else generated.
    pub job_id: String,
    /// Display name: body `job`, else synthesized from the destination.
    pub name: String,
    pub kind: EnvelopeKind,
    /// Attempt counter carried in the body; 0 on first delivery.
    pub attempts: u32,
    /// Destination the frame was delivered on.
    pub source: Destination,
}

impl Envelope {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Decodes a MESSAGE frame into a work-item envelope.
///
/// Decoding is deliberately lenient: a non-JSON body still yields a valid
/// envelope (external kind, transport-derived id) so foreign events pass
/// through intact.
pub fn decode(frame: &Frame, source: Destination) -> Envelope {
    let parsed: Option<Value> = serde_json::from_slice(&frame.body).ok();
    let object = parsed.as_ref().and_then(Value::as_object);

    let job = object
        .and_then(|map| map.get("job"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let kind = match &job {
        Some(job) => EnvelopeKind::Native {
            job: job.clone(),
            data: object
                .and_then(|map| map.get("data"))
                .cloned()
                .unwrap_or(Value::Null),
        },
        None => EnvelopeKind::External,
    };

    let name = job.unwrap_or_else(|| format!("event.{}", source.dotted()));

    let job_id = object
        .and_then(|map| map.get(UUID_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| frame.header(headers::MESSAGE_ID).map(str::to_string))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Wire-controlled value: clamp to the ceiling rather than truncate.
    let attempts = object
        .and_then(|map| map.get(ATTEMPTS_KEY))
        .and_then(Value::as_u64)
        .map(|raw| u32::try_from(raw).unwrap_or(u32::MAX))
        .unwrap_or(0);

    Envelope {
        body: frame.body.clone(),
        headers: frame.headers.clone(),
        job_id,
        name,
        kind,
        attempts,
        source,
    }
}

/// A redelivery message plus the counters it was built with.
#[derive(Debug)]
pub struct Redelivery {
    pub message: OutboundMessage,
    pub attempts: u32,
    pub backoff_secs: u64,
}

/// Rebuilds an envelope for redelivery after a failed attempt.
///
/// The attempt counter is incremented and the backoff recomputed as
/// `attempts ^ multiplier`; with auto-backoff disabled the caller-supplied
/// delay is used verbatim. The broker delay header is set in milliseconds.
pub fn build_redelivery(
    envelope: &Envelope,
    delay_secs: u64,
    auto_backoff: bool,
    multiplier: u32,
) -> Result<Redelivery, CodecError> {
    let value: Value = serde_json::from_slice(&envelope.body)?;
    let Value::Object(mut body) = value else {
        return Err(CodecError::NotAnObject);
    };

    let attempts = envelope.attempts.saturating_add(1);
    let backoff_secs = if auto_backoff {
        backoff_seconds(attempts, multiplier)
    } else {
        delay_secs
    };
    body.insert(ATTEMPTS_KEY.to_string(), Value::from(attempts));
    body.insert(BACKOFF_KEY.to_string(), Value::from(backoff_secs));

    let mut header_list = envelope.headers.clone();
    strip_redelivery_headers(&mut header_list);
    // A delay header inherited from a previous hop must not shadow the
    // recomputed one.
    header_list.retain(|(name, _)| !name.eq_ignore_ascii_case(headers::SCHEDULED_DELAY));
    header_list.push((
        headers::SCHEDULED_DELAY.to_string(),
        backoff_secs.saturating_mul(1000).to_string(),
    ));

    let message = OutboundMessage {
        body: serde_json::to_vec(&Value::Object(body))?,
        headers: header_list,
    };
    Ok(Redelivery {
        message,
        attempts,
        backoff_secs,
    })
}
