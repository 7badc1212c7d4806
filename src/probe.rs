//! Full probing run: jump recording, hierarchy reconstruction, then a line-size probe per level.
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::jumps::record_jumps;
use crate::line_size::get_line_size;
use crate::reconstruct::build_caches;
use crate::sampler::LatencySampler;
use log::{info, warn};
use std::collections::BTreeSet;
use std::fmt;

/// One reported level of the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLevel {
    /// 1-based level index, smallest cache first
    pub level: usize,
    pub size: usize,
    pub associativity: usize,
    /// `None` when the line-size probe found no inversion
    pub line_size: Option<usize>,
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{} cache: size = {}, associativity = {}, line size = ",
            self.level, self.size, self.associativity
        )?;
        match self.line_size {
            Some(line) => write!(f, "{}", line),
            None => write!(f, "undetermined"),
        }
    }
}

/// Everything a probing run found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyReport {
    pub levels: Vec<CacheLevel>,
    /// Jumps that could not be attributed to any level
    pub unresolved: BTreeSet<usize>,
}

/// Run the whole pipeline against `sampler`
///
/// Fails with [`ProbeError::NoCachesDetected`] before any line-size work if the jump sweep
/// yields no cache level.
pub fn probe_hierarchy<S>(
    sampler: &mut S,
    config: &ProbeConfig,
) -> Result<HierarchyReport, ProbeError>
where
    S: LatencySampler + ?Sized,
{
    let record = record_jumps(sampler, config)?;
    info!(
        "recorded {} jump-sets, final stride {}",
        record.jump_sets.len(),
        record.final_stride
    );

    let reconstruction = build_caches(&record);
    if !reconstruction.unresolved.is_empty() {
        warn!(
            "jumps at {:?} persisted down to the finest stride and were not attributed to a cache",
            reconstruction.unresolved
        );
    }
    if reconstruction.caches.is_empty() {
        return Err(ProbeError::NoCachesDetected);
    }

    let mut levels = Vec::with_capacity(reconstruction.caches.len());
    for (idx, cache) in reconstruction.caches.iter().enumerate() {
        let line_size = get_line_size(sampler, cache, config)?;
        if line_size.is_none() {
            warn!("line size of L{} ({}) undetermined", idx + 1, cache);
        }
        levels.push(CacheLevel {
            level: idx + 1,
            size: cache.size,
            associativity: cache.associativity,
            line_size,
        });
    }

    Ok(HierarchyReport {
        levels,
        unresolved: reconstruction.unresolved,
    })
}
