// tests/common/mod.rs
//
// Synthetic set-associative hierarchy used as a deterministic latency oracle.

use std::collections::{HashMap, HashSet};

use cache_prober::sampler::FnSampler;

pub const LINE: usize = 64;

/// One modeled cache level
#[derive(Debug, Clone, Copy)]
pub struct ModelLevel {
    pub size: usize,
    pub associativity: usize,
    /// Latency of an access served by this level
    pub latency: u64,
}

impl ModelLevel {
    fn sets(&self) -> usize {
        self.size / (self.associativity * LINE)
    }

    /// Does a chain of `count` elements `stride` bytes apart need more ways than a set has?
    fn overflows(&self, stride: usize, count: usize) -> bool {
        let sets = self.sets();
        let mut lines_per_set: HashMap<usize, HashSet<usize>> = HashMap::new();
        for i in 0..count {
            let line = i * stride / LINE;
            lines_per_set.entry(line % sets).or_default().insert(line);
        }
        lines_per_set.values().any(|lines| lines.len() > self.associativity)
    }
}

/// Latency is that of the first level whose sets all hold the chain
#[derive(Debug, Clone)]
pub struct HierarchyModel {
    pub levels: Vec<ModelLevel>,
    pub memory_latency: u64,
}

impl HierarchyModel {
    /// L1 32 KiB / 8-way, L2 256 KiB / 16-way, 64 B lines
    pub fn two_level() -> Self {
        HierarchyModel {
            levels: vec![
                ModelLevel {
                    size: 32 * 1024,
                    associativity: 8,
                    latency: 4,
                },
                ModelLevel {
                    size: 256 * 1024,
                    associativity: 16,
                    latency: 12,
                },
            ],
            memory_latency: 40,
        }
    }

    pub fn latency(&self, stride: usize, count: usize) -> u64 {
        self.levels
            .iter()
            .find(|level| !level.overflows(stride, count))
            .map_or(self.memory_latency, |level| level.latency)
    }

    pub fn sampler(self) -> FnSampler<impl FnMut(usize, usize) -> u64> {
        FnSampler(move |stride, count| self.latency(stride, count))
    }
}
