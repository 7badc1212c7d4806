//! # Line-Size Prober
//!
//! For a known cache, chains whose stride is one way size plus a small offset `L` fill a single
//! set for `line / L` consecutive elements before drifting into the next set. As `L` doubles the
//! first count that overflows a set shrinks, until `L` is large enough that every element starts
//! a fresh set and the first jump moves far out. That inversion marks the line size.
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::reconstruct::CacheDescriptor;
use crate::sampler::LatencySampler;
use log::{debug, info, warn};

/// Count the offset sweep measures its baseline at
const BASELINE_COUNT: usize = 2;

/// Probe the line size of `cache`; `None` when no inversion shows up
pub fn get_line_size<S>(
    sampler: &mut S,
    cache: &CacheDescriptor,
    config: &ProbeConfig,
) -> Result<Option<usize>, ProbeError>
where
    S: LatencySampler + ?Sized,
{
    let threshold = config.jump_threshold;
    // A sweep without any jump (`None`) ranks below every sweep that found one
    let mut prev_first_jump = Some(config.first_jump_sentinel);
    let mut offset = 1;

    while offset <= cache.size {
        let stride = cache.way_size() + offset;
        let max_count = (config.arena_capacity / stride)
            .saturating_sub(1)
            .min(config.line_probe_max_count);
        if stride * BASELINE_COUNT > config.arena_capacity {
            warn!(
                "stride {} no longer fits the arena; line size of {} undetermined",
                stride, cache
            );
            return Ok(None);
        }
        if max_count < config.line_probe_max_count {
            debug!("stride {}: count sweep truncated at {}", stride, max_count);
        }

        info!("probing stride {}...", stride);
        let mut prev_time = sampler.measure(stride, BASELINE_COUNT)?;
        let mut first_jump: Option<usize> = None;
        let mut jumps = Vec::new();

        let mut count = 1;
        while count <= max_count {
            let curr_time = sampler.measure(stride, count + 1)?;
            if threshold.is_jump(curr_time, prev_time) {
                first_jump.get_or_insert(count);
                jumps.push(count);
            }
            prev_time = curr_time;
            count *= 2;
        }
        debug!("stride {}: jumps at {:?}", stride, jumps);

        if first_jump > prev_first_jump {
            return Ok(Some(offset * cache.associativity));
        }
        prev_first_jump = first_jump;
        offset *= 2;
    }

    Ok(None)
}
