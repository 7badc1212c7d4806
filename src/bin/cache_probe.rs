//! Cache Hierarchy Discovery via Pointer Chasing
//!
//! Builds chains with cache-sized strides inside a 1 GiB arena, looks for the element counts at
//! which traversal latency jumps, and infers every cache level's size, associativity and line
//! size from where those jumps appear and vanish.
//!
//! Tunables come from `cache_prober.toml` and `CACHE_PROBER_*` environment variables.

use cache_prober::arena::Arena;
use cache_prober::sampler::{ChaseSampler, pin_measurement_thread};
use cache_prober::{ProbeConfig, format_size, format_size_fixed_int, probe_hierarchy};
use log::{error, info};
use std::process::ExitCode;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    let config = match ProbeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Couldn't load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    println!("Cache Hierarchy Discovery");
    println!("=========================");
    println!("Method: Pointer chasing over doubling strides");
    println!(
        "Samples per point: {} x {} dereferences\n",
        config.sample_count, config.chase_iterations
    );

    pin_measurement_thread(&config);

    info!(
        "Allocating {} arena",
        format_size(config.arena_capacity as f32)
    );
    let mut arena = Arena::new(config.arena_capacity);
    let mut sampler = ChaseSampler::new(&mut arena, &config);

    let report = match probe_hierarchy(&mut sampler, &config) {
        Ok(report) => report,
        Err(e) => {
            error!("Probing failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "\n{:>5} {:>10} {:>6} {:>12}",
        "Level", "Size", "Ways", "Line (B)"
    );
    println!("{:-<5} {:-<10} {:-<6} {:-<12}", "", "", "", "");
    for level in &report.levels {
        let line = level
            .line_size
            .map_or_else(|| "undetermined".to_string(), |line| line.to_string());
        println!(
            "{:>5} {:>10} {:>6} {:>12}",
            format!("L{}", level.level),
            format_size_fixed_int(level.size as u64),
            level.associativity,
            line
        );
    }

    println!();
    for level in &report.levels {
        println!("{level}");
    }
    if !report.unresolved.is_empty() {
        println!("\nUnattributed jumps at: {:?}", report.unresolved);
    }

    ExitCode::SUCCESS
}
