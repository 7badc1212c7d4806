//! # Jump Recorder
//!
//! Sweeps working-set sizes at doubling strides and records, per stride, the element counts after
//! which the chain latency rises sharply. A jump after `count - 1` elements at a stride that maps
//! every element into the same cache set means that set ran out of ways, so the recorded values
//! are associativity candidates; the strides at which they appear and vanish locate the cache
//! level they belong to.
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::sampler::LatencySampler;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Element counts after which latency jumped, for one stride
pub type JumpSet = BTreeSet<usize>;

/// Relative latency increase treated as crossing a capacity or associativity boundary
///
/// `cur` is a jump over `prev` iff `cur / prev > numerator / denominator`. With the default
/// 10/9 this is `(cur - prev) * 10 > cur`: the increase is weighed against the new latency, so
/// small absolute jitter at low latencies does not register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpThreshold {
    pub numerator: u64,
    pub denominator: u64,
}

impl Default for JumpThreshold {
    fn default() -> Self {
        JumpThreshold {
            numerator: 10,
            denominator: 9,
        }
    }
}

impl JumpThreshold {
    pub fn is_jump(&self, cur: u64, prev: u64) -> bool {
        cur as u128 * self.denominator as u128 > prev as u128 * self.numerator as u128
    }
}

/// Output of a full stride sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JumpRecord {
    /// One jump-set per probed stride, finest stride first
    pub jump_sets: Vec<JumpSet>,
    /// Stride the sweep stopped at; one doubling past the last recorded set
    pub final_stride: usize,
}

/// Sweep strides from `config.initial_stride` upward, doubling each time, until the jump-sets
/// stabilize past `config.convergence_stride_floor` or the stride reaches `Z / N`
pub fn record_jumps<S>(sampler: &mut S, config: &ProbeConfig) -> Result<JumpRecord, ProbeError>
where
    S: LatencySampler + ?Sized,
{
    let threshold = config.jump_threshold;
    let stride_limit = config.stride_limit();
    let mut jump_sets: Vec<JumpSet> = Vec::new();
    let mut stride = config.initial_stride;

    while stride < stride_limit {
        info!("probing stride {}...", stride);
        let mut prev_time = sampler.measure(stride, config.initial_count)?;
        let mut new_jumps = JumpSet::new();
        let mut latencies = Vec::with_capacity(config.max_associativity);

        for count in config.initial_count..=config.max_associativity {
            let curr_time = sampler.measure(stride, count)?;
            latencies.push(curr_time);
            if threshold.is_jump(curr_time, prev_time) {
                new_jumps.insert(count - 1);
            }
            prev_time = curr_time;
        }
        debug!("stride {}: latencies {:?}, jumps {:?}", stride, latencies, new_jumps);

        // The very first set has nothing to differ from
        let same = jump_sets.last().is_none_or(|last| *last == new_jumps);
        if same && stride >= config.convergence_stride_floor {
            debug!("jump-sets converged at stride {}", stride);
            break;
        }

        jump_sets.push(new_jumps);
        stride *= 2;
    }

    Ok(JumpRecord {
        jump_sets,
        final_stride: stride,
    })
}
