//! Queue-spec resolution: delimited spec strings into concrete destinations.
//!
//! An unqualified short name is expanded with the default-queue token and a
//! short random suffix so that several consumer instances subscribing to the
//! same topic never collide on a broker-assigned anonymous queue.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stompq_core::{Destination, QUEUE_SEPARATOR};

const SUFFIX_LEN: usize = 5;
const SPEC_DELIMITER: char = ';';

/// Source of short queue-name suffixes; injected so resolution stays
/// deterministic under test.
pub trait SuffixSource {
    fn suffix(&mut self) -> String;
}

/// Random lowercase-alphanumeric suffixes.
#[derive(Debug)]
pub struct RandomSuffix {
    rng: StdRng,
}

impl RandomSuffix {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSuffix {
    fn default() -> Self {
        Self::new()
    }
}

impl SuffixSource for RandomSuffix {
    fn suffix(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|byte| (byte as char).to_ascii_lowercase())
            .collect()
    }
}

/// Fixed suffix for exact-name assertions in tests.
#[derive(Debug, Clone)]
pub struct FixedSuffix(pub String);

impl SuffixSource for FixedSuffix {
    fn suffix(&mut self) -> String {
        self.0.clone()
    }
}

/// Splits a delimited spec string into raw destinations.
pub fn parse_spec(spec: &str) -> Vec<Destination> {
    spec.split(SPEC_DELIMITER)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Destination::from)
        .collect()
}

/// Resolves the read-destination list from configuration.
///
/// Unqualified names gain `::<default>_<suffix>`; with `prepend` set,
/// qualified names are rewritten to `topic::<topic>_<default>_<queue>` for
/// brokers that treat queue names as globally unique.
pub fn resolve_read_destinations(
    spec: &str,
    default_queue: &str,
    prepend: bool,
    source: &mut impl SuffixSource,
) -> Vec<Destination> {
    parse_spec(spec)
        .into_iter()
        .map(|destination| {
            if !destination.is_qualified() {
                return Destination::new(format!(
                    "{}{QUEUE_SEPARATOR}{default_queue}_{}",
                    destination.as_str(),
                    source.suffix()
                ));
            }
            if prepend {
                let topic = destination.topic();
                let queue = destination.queue().unwrap_or_default();
                return Destination::new(format!(
                    "{topic}{QUEUE_SEPARATOR}{topic}_{default_queue}_{queue}"
                ));
            }
            destination
        })
        .collect()
}

/// Write destinations are used verbatim, with no suffixing or prepending.
pub fn resolve_write_destinations(spec: &str) -> Vec<Destination> {
    parse_spec(spec)
}
