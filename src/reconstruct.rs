//! # Cache Reconstructor
//!
//! Turns a jump-set sequence into cache levels. A jump at associativity `s` shows up once the
//! stride is a multiple of that level's way size (every element lands in one set) and stays for
//! every coarser stride. Walking the sequence from the coarsest stride down, the stride at which
//! `s` first disappears pins the level: `size = stride * s`.
use crate::jumps::{JumpRecord, JumpSet};
use log::debug;
use std::collections::BTreeSet;
use std::fmt;

/// One reconstructed cache level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheDescriptor {
    /// Capacity in bytes
    pub size: usize,
    /// Number of ways per set
    pub associativity: usize,
}

impl CacheDescriptor {
    /// Bytes covered by one way; a stride of this size maps every element to the same set.
    /// Zero for a descriptor without ways.
    pub fn way_size(&self) -> usize {
        self.size.checked_div(self.associativity).unwrap_or(0)
    }
}

impl fmt::Display for CacheDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} B, {}-way", self.size, self.associativity)
    }
}

/// Result of reconstructing the hierarchy from a jump record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction {
    /// Resolved levels, ascending by size
    pub caches: Vec<CacheDescriptor>,
    /// Associativity candidates from the coarsest jump-set that never disappeared, plus a jump
    /// after zero elements (baseline noise), which names no cache
    pub unresolved: BTreeSet<usize>,
}

/// Attribute every jump of the coarsest stride to the cache level it belongs to
pub fn build_caches(record: &JumpRecord) -> Reconstruction {
    let Some(coarsest) = record.jump_sets.last() else {
        return Reconstruction::default();
    };

    let mut to_process: JumpSet = coarsest.clone();
    let mut caches = Vec::new();
    let mut stride = record.final_stride;

    for jumps in record.jump_sets.iter().rev() {
        to_process.retain(|&s| {
            if s == 0 || jumps.contains(&s) {
                return true;
            }
            debug!("jump at {} vanished below stride {}", s, stride);
            caches.push(CacheDescriptor {
                size: stride * s,
                associativity: s,
            });
            false
        });
        stride /= 2;
    }

    caches.sort();
    Reconstruction {
        caches,
        unresolved: to_process,
    }
}
