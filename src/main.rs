//! Memory Hierarchy Simulator CLI.
//!
//! Loads a topology, replays a request trace through it and prints the
//! resulting statistics.
//!
//! # Usage
//!
//! ```text
//! memhier-sim --config configs/default.toml --trace requests.trace
//! memhier-sim --trace requests.trace --limit 100000 --stats-json stats.json
//! ```
//!
//! Without `--config` the built-in default topology is used. Set `RUST_LOG`
//! (for example `RUST_LOG=debug`) to see per-request retirements.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::fs;
use std::path::PathBuf;

use memhier_sim::config::{ControllerModel, Topology};
use memhier_sim::core::RequestScheduler;
use memhier_sim::sim::loader;

/// Command-line arguments for the memory hierarchy simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Cycle-approximate memory hierarchy simulator")]
struct Args {
    /// Topology description (TOML). Defaults to the built-in topology.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request trace: `<port> <R|W|F> <vaddr> [cycle]` per line.
    #[arg(short, long)]
    trace: PathBuf,

    /// Replay at most this many requests.
    #[arg(short, long)]
    limit: Option<usize>,

    /// Also write the statistics snapshot as JSON to this path.
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

fn load_topology(path: Option<&PathBuf>) -> Result<Topology> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            Topology::from_toml_str(&text)
                .with_context(|| format!("invalid topology in {}", path.display()))
        }
        None => Ok(Topology::default()),
    }
}

fn print_topology(topology: &Topology) {
    println!("Global Configuration");
    println!("--------------------");
    println!("General:");
    println!("  Clock:              {:.2} GHz", topology.general.clock_ghz);
    println!("  Page Size:          {} B", topology.general.page_size);
    println!("Translation:");
    println!(
        "  TLB:                {} entries, {} ways, {:?}",
        topology.tlb.entries,
        topology.tlb.ways(),
        topology.tlb.policy
    );
    println!(
        "  Latencies:          hit {} / walk {} / fault {}",
        topology.tlb.hit_latency, topology.tlb.walk_latency, topology.tlb.fault_latency
    );
    println!("  Page Table:         {:?}", topology.page_table.kind);
    println!("Cache Hierarchy:");
    for cache in &topology.caches {
        println!(
            "  {:<20}{:?} ({} KB, {} ways, {} B lines, {:?})",
            format!("{}:", cache.name),
            cache.kind,
            cache.size_bytes / 1024,
            cache.ways,
            cache.line_bytes,
            cache.policy
        );
    }
    println!("Ports:");
    for port in &topology.ports {
        let chain = if port.levels.is_empty() {
            "uncached".to_string()
        } else {
            port.levels.join(" -> ")
        };
        println!("  {:<20}{}", format!("{}:", port.name), chain);
    }
    println!(
        "Interconnect:         {} B wide, {} cycles, {} req/cycle",
        topology.interconnect.width_bytes,
        topology.interconnect.latency,
        topology.interconnect.requests_per_cycle
    );
    println!("Memory:");
    for ctrl in &topology.controllers {
        let timing = match ctrl.model {
            ControllerModel::Simple => format!("simple {} cycles", ctrl.latency),
            ControllerModel::Dram => format!(
                "dram tCAS {} tRAS {} tPRE {}",
                ctrl.t_cas, ctrl.t_ras, ctrl.t_pre
            ),
        };
        println!(
            "  {:<20}{:#x} - {:#x} ({} MB, {}, queue {})",
            format!("{}:", ctrl.name),
            ctrl.base,
            ctrl.end(),
            ctrl.size / 1024 / 1024,
            timing,
            ctrl.queue_capacity
        );
    }
    println!("--------------------");
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let topology = load_topology(args.config.as_ref())?;
    print_topology(&topology);

    let mut scheduler =
        RequestScheduler::new(&topology).context("failed to build memory hierarchy")?;

    let trace = fs::read_to_string(&args.trace)
        .with_context(|| format!("failed to read trace {}", args.trace.display()))?;
    let mut requests = loader::parse_trace(&trace, |name| scheduler.port_id(name))
        .with_context(|| format!("malformed trace {}", args.trace.display()))?;
    if let Some(limit) = args.limit {
        requests.truncate(limit);
    }
    if requests.is_empty() {
        bail!("trace {} contains no requests", args.trace.display());
    }

    info!("replaying {} request(s)", requests.len());
    let retired = scheduler
        .run_with(requests, |_| ())
        .context("simulation aborted")?;
    println!("[*] Retired {} request(s) by cycle {}", retired, scheduler.now());

    let snapshot = scheduler.snapshot();
    snapshot.print(topology.general.clock_ghz);

    if let Some(path) = args.stats_json {
        let json = snapshot.to_json().context("failed to serialize statistics")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("[*] Statistics written to {}", path.display());
    }

    Ok(())
}
