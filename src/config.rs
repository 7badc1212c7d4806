//! Tunable constants of the probing pipeline.
//!
//! Every threshold that steers the inference lives here instead of as a literal
//! in the probes, so the policy can be audited and exercised independently of
//! the timing harness.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ProbeError;
use crate::jumps::JumpThreshold;

/// Default config file looked up in the working directory
pub const CONFIG_FILE: &str = "cache_prober.toml";

/// Prefix of environment overrides, e.g. `CACHE_PROBER_SAMPLE_COUNT=5`
pub const ENV_PREFIX: &str = "CACHE_PROBER";

const KIB: usize = 1024;
const GIB: usize = 1024 * 1024 * 1024;

/// Configuration surface of a probing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Repeated timings averaged per latency sample
    pub sample_count: usize,

    /// Pointer dereferences per timing
    pub chase_iterations: usize,

    /// Largest associativity the jump recorder sweeps for (`N`)
    pub max_associativity: usize,

    /// First stride of the jump recorder, in bytes
    pub initial_stride: usize,

    /// First element count of every stride sweep
    pub initial_count: usize,

    /// Stride the recorder must reach before two equal jump-sets end the sweep
    pub convergence_stride_floor: usize,

    /// Relative latency increase that counts as a jump
    pub jump_threshold: JumpThreshold,

    /// Size of the scratch arena holding every pointer chain (`Z`)
    pub arena_capacity: usize,

    /// Largest element count swept by the line-size prober
    pub line_probe_max_count: usize,

    /// Out-of-range first jump the line-size prober starts from
    pub first_jump_sentinel: usize,

    /// CPU core to pin the measuring thread to
    pub pin_core: Option<usize>,

    /// Raise the measuring thread to maximum priority
    pub max_priority: bool,

    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            sample_count: 20,
            chase_iterations: 1_000_000,
            max_associativity: 16,
            initial_stride: 16,
            initial_count: 1,
            convergence_stride_floor: 256 * KIB,
            jump_threshold: JumpThreshold::default(),
            arena_capacity: GIB,
            line_probe_max_count: 1024,
            first_jump_sentinel: 1025,
            pin_core: None,
            max_priority: true,
            log_level: "info".to_string(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration with precedence: defaults → `cache_prober.toml` → env vars
    pub fn load() -> Result<Self, ProbeError> {
        Self::load_from_file(CONFIG_FILE)
    }

    /// Load configuration with a custom file path; a missing file is not an error
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProbeError> {
        let defaults = ProbeConfig::default();
        let mut builder = Config::builder()
            .set_default("sample_count", defaults.sample_count as u64)?
            .set_default("chase_iterations", defaults.chase_iterations as u64)?
            .set_default("max_associativity", defaults.max_associativity as u64)?
            .set_default("initial_stride", defaults.initial_stride as u64)?
            .set_default("initial_count", defaults.initial_count as u64)?
            .set_default(
                "convergence_stride_floor",
                defaults.convergence_stride_floor as u64,
            )?
            .set_default("jump_threshold.numerator", defaults.jump_threshold.numerator)?
            .set_default(
                "jump_threshold.denominator",
                defaults.jump_threshold.denominator,
            )?
            .set_default("arena_capacity", defaults.arena_capacity as u64)?
            .set_default("line_probe_max_count", defaults.line_probe_max_count as u64)?
            .set_default("first_jump_sentinel", defaults.first_jump_sentinel as u64)?
            .set_default("max_priority", defaults.max_priority)?
            .set_default("log_level", defaults.log_level)?;

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        // Nested keys use a double underscore: CACHE_PROBER_JUMP_THRESHOLD__NUMERATOR
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: ProbeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the probes cannot run with
    pub fn validate(&self) -> Result<(), ProbeError> {
        let positive = [
            ("sample_count", self.sample_count),
            ("chase_iterations", self.chase_iterations),
            ("max_associativity", self.max_associativity),
            ("initial_stride", self.initial_stride),
            ("initial_count", self.initial_count),
            ("line_probe_max_count", self.line_probe_max_count),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ProbeError::InvalidConfig(format!("{name} must be at least 1")));
        }
        if self.jump_threshold.numerator == 0 || self.jump_threshold.denominator == 0 {
            return Err(ProbeError::InvalidConfig(
                "jump_threshold terms must be non-zero".to_string(),
            ));
        }
        if self.initial_count > self.max_associativity {
            return Err(ProbeError::InvalidConfig(format!(
                "initial_count {} exceeds max_associativity {}",
                self.initial_count, self.max_associativity
            )));
        }
        if self.arena_capacity / self.max_associativity < self.initial_stride {
            return Err(ProbeError::InvalidConfig(format!(
                "arena of {} bytes leaves no room for stride {} at associativity {}",
                self.arena_capacity, self.initial_stride, self.max_associativity
            )));
        }
        Ok(())
    }

    /// Exclusive upper bound of the jump recorder's stride sweep (`Z / N`)
    pub fn stride_limit(&self) -> usize {
        self.arena_capacity / self.max_associativity
    }
}
