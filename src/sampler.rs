//! # Latency Sampler
//!
//! The timing primitive every other stage builds on. [`ChaseSampler`] times real pointer chasing
//! through an [`Arena`]; [`FnSampler`] stands in a deterministic latency oracle so the inference
//! stages can be exercised without touching the hardware.
use crate::arena::Arena;
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use log::{info, trace, warn};
use std::hint::black_box;
use std::time::Instant;

/// Source of average chain-traversal latencies
pub trait LatencySampler {
    /// Average duration of one timing of a `count`-element chain spaced `stride` bytes apart
    fn measure(&mut self, stride: usize, count: usize) -> Result<u64, ProbeError>;
}

/// Times pointer chasing through a borrowed arena
#[derive(Debug)]
pub struct ChaseSampler<'a> {
    arena: &'a mut Arena,
    sample_count: usize,
    chase_iterations: usize,
    /// Chase position carried across timings of the same chain
    position: usize,
}

impl<'a> ChaseSampler<'a> {
    pub fn new(arena: &'a mut Arena, config: &ProbeConfig) -> Self {
        ChaseSampler {
            arena,
            sample_count: config.sample_count,
            chase_iterations: config.chase_iterations,
            position: 0,
        }
    }
}

impl LatencySampler for ChaseSampler<'_> {
    fn measure(&mut self, stride: usize, count: usize) -> Result<u64, ProbeError> {
        self.position = self.arena.link_chain(stride, count)?;

        let mut total: u128 = 0;
        for _ in 0..self.sample_count {
            let start = Instant::now();
            self.position = self
                .arena
                .chase(black_box(self.position), self.chase_iterations)?;
            total += start.elapsed().as_nanos();
            // Prevent dead code elimination
            black_box(self.position);
        }

        let mean = (total / self.sample_count.max(1) as u128) as u64;
        trace!("stride {stride} count {count}: {mean} ns");
        Ok(mean)
    }
}

/// Deterministic latency oracle backed by a closure of `(stride, count)`
pub struct FnSampler<F>(pub F);

impl<F: FnMut(usize, usize) -> u64> LatencySampler for FnSampler<F> {
    fn measure(&mut self, stride: usize, count: usize) -> Result<u64, ProbeError> {
        Ok((self.0)(stride, count))
    }
}

/// Pin the calling thread to the configured core and raise its priority, so that scheduling
/// noise disturbs the timings as little as possible. Failures only warn.
pub fn pin_measurement_thread(config: &ProbeConfig) {
    if let Some(cpu_num) = config.pin_core {
        let core_num = core_affinity::CoreId { id: cpu_num };
        if core_affinity::set_for_current(core_num) {
            info!("Measurement thread pinned to CPU core {}", cpu_num);
        } else {
            warn!(
                "Couldn't pin measurement thread to CPU core {} (NOTE: this is expected on macOS)",
                cpu_num
            );
        }
    }

    if config.max_priority
        && thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max)
            .is_err()
    {
        warn!("Couldn't set measurement thread to maximum thread priority");
    }
}
