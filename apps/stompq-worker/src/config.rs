use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use stompq_queue::StompConfig;

/// Worker-process configuration: broker settings plus the job loop knobs.
///
/// Sources, lowest precedence first: built-in defaults, an optional config
/// file, then `STOMP_*` environment variables. A `.env` file path loads
/// into the environment instead of being parsed as a config file.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Total delivery attempts per job before it is dropped for good.
    pub max_tries: u32,
    /// Socket connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Socket read timeout; bounds how long one poll cycle can block.
    pub read_timeout_ms: u64,
    #[serde(flatten)]
    pub stomp: StompConfig,
}

impl WorkerConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("max_tries", 2)?
            .set_default("connect_timeout_ms", 10_000)?
            .set_default("read_timeout_ms", 2_000)?;

        if let Some(path) = config_path {
            if path.extension().and_then(|ext| ext.to_str()) == Some("env") {
                match dotenvy::from_path(&path) {
                    Ok(_) => tracing::info!("loaded environment from {}", path.display()),
                    Err(err) => {
                        tracing::warn!("failed to load .env from {}: {}", path.display(), err)
                    }
                }
            } else {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(Environment::with_prefix("STOMP").try_parsing(true));

        builder.build()?.try_deserialize()
    }
}
