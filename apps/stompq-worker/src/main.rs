use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use tracing::{error, info, warn};

mod config;
mod handlers;

use stompq_codec::envelope::{Envelope, EnvelopeKind};
use stompq_queue::audit::LogSink;
use stompq_queue::{QueueError, StompQueue};
use stompq_transport_tcp::{TcpConnector, TcpConnectorConfig};

use crate::config::WorkerConfig;
use crate::handlers::{should_retry, Dispatch, HandlerRegistry};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML, or a .env file)
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume jobs from the configured read queues (default)
    Work,
    /// Publish one JSON payload and exit
    Push {
        /// Raw JSON payload, e.g. '{"job":"SendEmail","data":{"to":"a@b"}}'
        payload: String,
        /// Destination spec overriding the configured write queues
        #[arg(long)]
        queue: Option<String>,
    },
    /// Print the resolved read and write destinations
    Destinations,
}

fn build_queue(config: &WorkerConfig) -> StompQueue<TcpConnector> {
    let mut tcp = TcpConnectorConfig::new(config.stomp.host.clone(), config.stomp.port);
    tcp.scheme = config.stomp.scheme.clone();
    tcp.connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    // A finite read timeout keeps the poll loop responsive to shutdown.
    tcp.read_timeout = Some(Duration::from_millis(config.read_timeout_ms));
    StompQueue::new(config.stomp.clone(), TcpConnector::new(tcp)).with_sink(Box::new(LogSink))
}

fn built_in_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    // Liveness probe job: verifies the full broker round trip without
    // deploying real handlers.
    registry.register("Ping", |envelope| {
        info!(job_id = %envelope.job_id, "pong");
        Ok(())
    });
    registry
}

fn work(config: &WorkerConfig, mut queue: StompQueue<TcpConnector>) -> ExitCode {
    let registry = built_in_handlers();

    let shutdown = Arc::new(AtomicBool::new(false));
    let _ = flag::register(SIGTERM, Arc::clone(&shutdown));
    let _ = flag::register(SIGINT, Arc::clone(&shutdown));

    info!(
        read = ?queue.read_destinations(),
        write = ?queue.write_destinations(),
        max_tries = config.max_tries,
        "worker started"
    );

    let code = loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested");
            break ExitCode::SUCCESS;
        }
        let envelope = match queue.pop() {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(err @ QueueError::CircuitOpen { .. }) => {
                error!(error = %err, "broker unreachable, giving up");
                break ExitCode::FAILURE;
            }
            Err(err) => {
                warn!(error = %err, "poll failed");
                continue;
            }
        };
        process(config, &registry, &mut queue, &envelope);
    };
    queue.close();
    code
}

fn process(
    config: &WorkerConfig,
    registry: &HandlerRegistry,
    queue: &mut StompQueue<TcpConnector>,
    envelope: &Envelope,
) {
    let result = match registry.dispatch(envelope) {
        Dispatch::Handled(result) => result,
        Dispatch::Unhandled => {
            match &envelope.kind {
                EnvelopeKind::Native { job, .. } => {
                    warn!(job = %job, job_id = %envelope.job_id, "no handler registered, dropping")
                }
                EnvelopeKind::External => {
                    info!(name = %envelope.name, job_id = %envelope.job_id, "external event observed")
                }
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => {
            if let Err(err) = queue.delete() {
                warn!(error = %err, "ack after completion failed");
            }
        }
        Err(reason) => {
            error!(
                name = %envelope.name,
                job_id = %envelope.job_id,
                attempt = envelope.attempts + 1,
                %reason,
                "job failed"
            );
            let tries_cap = if config.stomp.auto_tries {
                config.max_tries
            } else {
                u32::MAX
            };
            if should_retry(envelope.attempts, tries_cap) {
                if let Err(err) = queue.release(envelope, 0) {
                    error!(error = %err, job_id = %envelope.job_id, "release failed");
                }
            } else {
                warn!(job_id = %envelope.job_id, "retries exhausted, dropping job");
                if let Err(err) = queue.delete() {
                    warn!(error = %err, "ack after final failure failed");
                }
            }
        }
    }
}

fn push(
    mut queue: StompQueue<TcpConnector>,
    payload: &str,
    spec: Option<&str>,
) -> ExitCode {
    let code = match queue.push(payload, spec) {
        Ok(outcome) if outcome.all_sent => {
            info!("message sent");
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            for (destination, err) in &outcome.failures {
                error!(destination = %destination, error = %err, "send failed");
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "push failed");
            ExitCode::FAILURE
        }
    };
    queue.close();
    code
}

fn main() -> ExitCode {
    let filter = std::env::var("STOMP_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = match WorkerConfig::new(cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            return ExitCode::FAILURE;
        }
    };

    let queue = build_queue(&config);
    match cli.command.unwrap_or(Commands::Work) {
        Commands::Work => work(&config, queue),
        Commands::Push { payload, queue: spec } => push(queue, &payload, spec.as_deref()),
        Commands::Destinations => {
            for destination in queue.read_destinations() {
                println!("read  {destination}");
            }
            for destination in queue.write_destinations() {
                println!("write {destination}");
            }
            ExitCode::SUCCESS
        }
    }
}
