//! Bounded-retry session establishment (the reconnect circuit breaker).

use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use stompq_transport::Connector;

use crate::config::StompConfig;
use crate::error::QueueError;
use crate::session::Session;

/// Re-establishes sessions with an explicit attempt ceiling.
///
/// One bounded loop with a sleep between attempts; the retry counter is
/// local to each call, so it resets on every success. Past the ceiling the
/// circuit opens and the caller is expected to surface the failure instead
/// of looping.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectSupervisor {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &StompConfig) -> Self {
        Self::new(
            config.max_reconnect_attempts,
            Duration::from_millis(config.reconnect_delay_ms),
        )
    }

    /// Attempts a fresh session, up to the configured ceiling.
    pub fn establish<C: Connector>(
        &self,
        connector: &mut C,
        config: &StompConfig,
    ) -> Result<Session<C::Transport>, QueueError> {
        for attempt in 1..=self.max_attempts {
            match Session::connect(connector, config) {
                Ok(session) => {
                    info!(attempt, session = %session.id(), "session (re)established");
                    return Ok(session);
                }
                Err(err) => {
                    warn!(attempt, max = self.max_attempts, error = %err, "connect attempt failed");
                    if attempt < self.max_attempts {
                        thread::sleep(self.delay);
                    }
                }
            }
        }
        error!(
            attempts = self.max_attempts,
            "reconnect ceiling exceeded, circuit open"
        );
        Err(QueueError::CircuitOpen {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stompq_codec::frame::commands;
    use stompq_codec::Frame;
    use stompq_transport::mem::ScriptedConnector;

    use super::ReconnectSupervisor;
    use crate::config::StompConfig;
    use crate::error::QueueError;

    fn supervisor(max: u32) -> ReconnectSupervisor {
        ReconnectSupervisor::new(max, Duration::from_millis(0))
    }

    #[test]
    fn circuit_opens_after_exactly_the_ceiling() {
        let (mut connector, handle) = ScriptedConnector::new();
        handle.push_failures(10);

        let err = supervisor(5)
            .establish(&mut connector, &StompConfig::default())
            .expect_err("circuit must open");
        assert!(matches!(err, QueueError::CircuitOpen { attempts: 5 }));
        // Exactly 5 connect calls, never a 6th.
        assert_eq!(handle.attempts(), 5);
    }

    #[test]
    fn success_midway_stops_the_loop() {
        let (mut connector, handle) = ScriptedConnector::new();
        handle.push_failures(2);
        let transport = handle.push_transport();
        transport.push_frame(Frame::new(commands::CONNECTED).with_header("session", "s-9"));

        let session = supervisor(5)
            .establish(&mut connector, &StompConfig::default())
            .expect("third attempt succeeds");
        assert_eq!(session.id(), "s-9");
        assert_eq!(handle.attempts(), 3);
    }

    #[test]
    fn handshake_rejection_counts_as_a_failed_attempt() {
        let (mut connector, handle) = ScriptedConnector::new();
        // Transport connects but the broker refuses the login.
        let transport = handle.push_transport();
        transport.push_frame(Frame::new(commands::ERROR).with_header("message", "denied"));
        handle.push_failures(1);

        let err = supervisor(2)
            .establish(&mut connector, &StompConfig::default())
            .expect_err("both attempts fail");
        assert!(matches!(err, QueueError::CircuitOpen { attempts: 2 }));
        assert_eq!(handle.attempts(), 2);
    }
}
