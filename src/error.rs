//! Error type shared by every stage of the probing pipeline.

use thiserror::Error;

/// Failures that can stop a probing run.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The reconstructor found no cache level at all (flat latency everywhere).
    #[error("no caches detected")]
    NoCachesDetected,

    /// A pointer chain does not fit the arena or its links would overlap.
    #[error("chain of {count} x {stride} B does not fit an arena of {capacity} bytes")]
    InvalidChain {
        stride: usize,
        count: usize,
        capacity: usize,
    },

    /// A chase was started from an offset that is not a link of the current chain.
    #[error("offset {offset} is not a link of the chain in an arena of {capacity} bytes")]
    NotALink {
        offset: usize,
        capacity: usize,
    },

    /// A configuration value is outside the range the probes can work with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Loading the layered configuration failed.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
