use serde::Deserialize;

use stompq_core::AckMode;

/// Explicit configuration for one queue-adapter instance.
///
/// Passed into constructors; nothing in the engine reads process-wide
/// state. The worker binary is the only place configuration is loaded
/// from files or the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StompConfig {
    /// `tcp` or `ssl`; handed to the connector untouched.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Login is attempted only when both credentials are set.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Value of the CONNECT `host` header.
    pub vhost: String,
    /// Delimited read-destination spec, e.g. `orders;billing::svc1_q`.
    pub read_queues: String,
    /// Delimited write-destination spec.
    pub write_queues: String,
    /// Queue token appended to unqualified read destinations.
    pub default_queue: String,
    /// Rewrite qualified names to broker-unique `topic::topic_default_queue`.
    pub prepend_queues: bool,
    /// Desired client->server heartbeat interval; 0 disables.
    pub send_heartbeat_ms: u32,
    /// Desired server->client heartbeat interval; 0 disables.
    pub receive_heartbeat_ms: u32,
    /// Consumer flow-control window; non-positive means unbounded (`-1`).
    pub consumer_window_size: i64,
    pub ack_mode: AckMode,
    /// Cap delivery attempts without per-job configuration.
    pub auto_tries: bool,
    /// Compute redelivery backoff instead of honoring caller delays.
    pub auto_backoff: bool,
    /// Redelivery backoff exponent: delay = attempts ^ multiplier seconds.
    pub backoff_multiplier: u32,
    /// Circuit-breaker ceiling on consecutive connect attempts.
    pub max_reconnect_attempts: u32,
    /// Pause between connect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            scheme: "tcp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 61613,
            username: Some("admin".to_string()),
            password: Some("admin".to_string()),
            vhost: "/".to_string(),
            read_queues: "default".to_string(),
            write_queues: "default".to_string(),
            default_queue: "default".to_string(),
            prepend_queues: false,
            send_heartbeat_ms: 0,
            receive_heartbeat_ms: 2_000,
            consumer_window_size: -1,
            ack_mode: AckMode::Client,
            auto_tries: true,
            auto_backoff: true,
            backoff_multiplier: 2,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
        }
    }
}

impl StompConfig {
    /// Credentials pair, only when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
