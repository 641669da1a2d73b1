//! Integration tests for the request scheduler.
//!
//! These tests drive whole requests through translation, the cache chain,
//! the interconnect and the controllers, and check the end-to-end latency
//! and accounting properties of the model.

use memhier_sim::common::{AccessType, PhysAddr, SimError};
use memhier_sim::config::{
    CacheConfig, CacheKind, ControllerConfig, ControllerModel, PageTableConfig, PageTableKind,
    PortConfig, Topology,
};
use memhier_sim::core::units::mmu::page_table::ExplicitPageTable;
use memhier_sim::core::units::mmu::TranslationOutcome;
use memhier_sim::core::{Completion, RequestDescriptor, RequestScheduler, ServicedBy};
use memhier_sim::stats::StatsSnapshot;

const PAGE: u64 = 4096;

/// Line addresses that share set 0 of a two-set, 64-byte-line cache.
const A: u64 = 0x000;
const B: u64 = 0x080;
const C: u64 = 0x100;

/// Creates a small cache: 2 sets of 2 ways, 2-cycle tag/data/fill.
fn create_small_cache(name: &str) -> CacheConfig {
    CacheConfig {
        size_bytes: 256,
        line_bytes: 64,
        ways: 2,
        tag_latency: 2,
        data_latency: 2,
        fill_latency: Some(2),
        ..CacheConfig::named(name, CacheKind::Data)
    }
}

/// Creates a fixed-latency controller over the first megabyte.
fn create_simple_controller() -> ControllerConfig {
    ControllerConfig {
        model: ControllerModel::Simple,
        latency: 100,
        ..ControllerConfig::named("mem", 0, 1 << 20)
    }
}

fn port(name: &str, levels: &[&str]) -> PortConfig {
    PortConfig {
        name: name.to_string(),
        levels: levels.iter().map(|l| l.to_string()).collect(),
    }
}

/// One port in front of one small cache, identity-mapped memory.
fn create_single_level_topology() -> Topology {
    Topology {
        page_table: PageTableConfig {
            kind: PageTableKind::Identity,
            ..PageTableConfig::default()
        },
        caches: vec![create_small_cache("l1")],
        ports: vec![port("cpu", &["l1"])],
        controllers: vec![create_simple_controller()],
        ..Topology::default()
    }
}

/// Split L1s over a shared L2, identity-mapped memory.
fn create_two_level_topology() -> Topology {
    let mut l2 = create_small_cache("l2");
    l2.size_bytes = 4096;
    l2.ways = 4;
    l2.tag_latency = 5;
    l2.data_latency = 5;
    Topology {
        page_table: PageTableConfig {
            kind: PageTableKind::Identity,
            ..PageTableConfig::default()
        },
        caches: vec![create_small_cache("l1i"), create_small_cache("l1d"), l2],
        ports: vec![port("ifetch", &["l1i", "l2"]), port("data", &["l1d", "l2"])],
        controllers: vec![create_simple_controller()],
        ..Topology::default()
    }
}

fn read(addr: u64) -> RequestDescriptor {
    RequestDescriptor::new(0, addr, AccessType::Read)
}

fn write(addr: u64) -> RequestDescriptor {
    RequestDescriptor::new(0, addr, AccessType::Write)
}

/// Deterministic pseudo-random trace over both ports of the two-level topology.
fn create_mixed_trace(len: usize, seed: u64) -> Vec<RequestDescriptor> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let addr = (state >> 8) % (64 * 1024);
            let (port, kind) = match state % 4 {
                0 => (0, AccessType::Fetch),
                1 => (1, AccessType::Write),
                _ => (1, AccessType::Read),
            };
            RequestDescriptor::new(port, addr, kind)
        })
        .collect()
}

/// Tests that a store hit is cheaper than the cold miss that brought the line in.
#[test]
fn test_hit_after_miss() {
    let mut sched = RequestScheduler::new(&create_single_level_topology()).unwrap();

    let miss = sched.issue(write(0x40)).unwrap();
    let hit = sched.issue(read(0x48)).unwrap();

    assert_eq!(miss.outcome, TranslationOutcome::WalkHit);
    assert_eq!(miss.serviced_by, ServicedBy::Memory(0));
    assert_eq!(hit.outcome, TranslationOutcome::TlbHit);
    assert_eq!(hit.serviced_by, ServicedBy::Cache(0));
    assert_eq!(hit.latency, 1 + 2 + 2);
    assert!(hit.latency < miss.latency);
    assert_eq!(hit.paddr, Some(PhysAddr::new(0x48)));
}

/// Tests the full cold-miss latency breakdown.
#[test]
fn test_cold_miss_latency() {
    let mut sched = RequestScheduler::new(&create_single_level_topology()).unwrap();
    let done = sched.issue(read(A)).unwrap();

    let walk = 1 + 30;
    let lookup = 2;
    let memory = (4 + 1) + 100 + (4 + 8);
    let fill = 2;
    assert_eq!(done.latency, walk + lookup + memory + fill);
    assert_eq!(done.retired_at, done.latency);
}

/// Tests that a dirty victim is written back without delaying the requester.
#[test]
fn test_dirty_eviction_does_not_delay_requester() {
    let mut sched = RequestScheduler::new(&create_single_level_topology()).unwrap();

    sched.issue(write(A)).unwrap();
    let b = sched.issue(write(B)).unwrap();
    let c = sched.issue(read(C)).unwrap();

    let clean_miss = sched.mmu().hit_latency()
        + 2
        + sched.system().min_round_trip(PhysAddr::new(C), 64).unwrap()
        + 2;
    assert_eq!(c.latency, clean_miss);
    assert_eq!(c.latency, b.latency);

    let l1 = sched.cache("l1").unwrap();
    assert!(!l1.contains(PhysAddr::new(A)));
    assert!(l1.contains(PhysAddr::new(C)));
    assert_eq!(l1.is_dirty(PhysAddr::new(B)), Some(true));

    // C retired before A's line reached the controller.
    assert_eq!(sched.posted_writebacks(), 1);
    assert_eq!(sched.snapshot().counter("mem.mem.writebacks"), 0);
    assert!(sched.drain().unwrap().is_empty());
    assert_eq!(sched.posted_writebacks(), 0);

    let snap = sched.snapshot();
    assert_eq!(snap.counter("cache.l1.writebacks"), 1);
    assert_eq!(snap.counter("mem.mem.writebacks"), 1);
    assert_eq!(snap.counter("mem.mem.requests"), 3);
}

/// Tests that an L1 victim is absorbed by the L2 instead of memory.
#[test]
fn test_writeback_absorbed_by_next_level() {
    let topology = create_two_level_topology();
    let mut sched = RequestScheduler::new(&topology).unwrap();
    let data = sched.port_id("data").unwrap();
    let store = |addr| RequestDescriptor::new(data, addr, AccessType::Write);

    sched.issue(store(A)).unwrap();
    sched.issue(store(B)).unwrap();
    sched.issue(store(C)).unwrap();

    let l2 = sched.cache("l2").unwrap();
    assert_eq!(l2.is_dirty(PhysAddr::new(A)), Some(true));
    assert_eq!(l2.is_dirty(PhysAddr::new(B)), Some(false));

    let snap = sched.snapshot();
    assert_eq!(snap.counter("cache.l1d.writebacks"), 1);
    assert_eq!(snap.counter("mem.mem.writebacks"), 0);

    let reload = sched.issue(RequestDescriptor::new(data, A, AccessType::Read)).unwrap();
    assert_eq!(reload.serviced_by, ServicedBy::Cache(2));
}

/// Tests that a hit in a lower level fills only the levels above it.
#[test]
fn test_l2_hit_fills_l1() {
    let mut sched = RequestScheduler::new(&create_two_level_topology()).unwrap();
    let ifetch = sched.port_id("ifetch").unwrap();
    let data = sched.port_id("data").unwrap();

    sched
        .issue(RequestDescriptor::new(data, 0x200, AccessType::Read))
        .unwrap();
    let shared = sched
        .issue(RequestDescriptor::new(ifetch, 0x200, AccessType::Fetch))
        .unwrap();

    assert_eq!(shared.serviced_by, ServicedBy::Cache(2));
    assert_eq!(shared.outcome, TranslationOutcome::TlbHit);
    assert_eq!(shared.latency, 1 + 2 + (5 + 5) + 2);
    assert!(sched.cache("l1i").unwrap().contains(PhysAddr::new(0x200)));
    assert_eq!(sched.snapshot().counter("cache.l2.fills"), 1);
}

/// Tests that with a one-entry queue the second of two simultaneous
/// requests waits for the first to finish service.
#[test]
fn test_backpressure_with_single_entry_queue() {
    let mut topology = create_single_level_topology();
    topology.caches.clear();
    topology.ports = vec![port("p0", &[]), port("p1", &[])];
    topology.interconnect.requests_per_cycle = 2;
    topology.controllers[0].queue_capacity = 1;
    let mut sched = RequestScheduler::new(&topology).unwrap();

    let done = sched
        .run(vec![
            RequestDescriptor::new(0, 0x0, AccessType::Read),
            RequestDescriptor::new(1, 0x2000, AccessType::Read),
        ])
        .unwrap();

    assert_eq!(done.len(), 2);
    let (first, second) = (&done[0], &done[1]);
    assert_eq!(first.port, 0);
    assert_eq!(first.started_at, second.started_at);
    assert!(second.retired_at >= first.retired_at + 100);
    assert_eq!(sched.snapshot().counter("mem.mem.backpressure_stalls"), 1);
}

/// Tests that an unmapped page faults on every access and never reaches memory.
#[test]
fn test_persistent_page_fault() {
    let mut backing = ExplicitPageTable::new();
    backing.map(1, 1);
    let mut sched =
        RequestScheduler::with_page_table(&create_single_level_topology(), Box::new(backing))
            .unwrap();

    for _ in 0..2 {
        let done = sched.issue(read(5 * PAGE)).unwrap();
        assert_eq!(done.outcome, TranslationOutcome::PageFault);
        assert_eq!(done.serviced_by, ServicedBy::Unmapped);
        assert_eq!(done.paddr, None);
        assert_eq!(done.latency, 1 + 30 + 1000);
    }
    let mapped = sched.issue(read(PAGE)).unwrap();
    assert_eq!(mapped.outcome, TranslationOutcome::WalkHit);

    let snap = sched.snapshot();
    assert_eq!(snap.counter("tlb.page_faults"), 2);
    assert_eq!(snap.counter("cache.l1.lookups"), 1);
    assert_eq!(snap.counter("requests.total"), 3);
    assert!(!sched.is_halted());
}

/// Tests that a demand-paged fault maps the page and still completes the access.
#[test]
fn test_demand_fault_proceeds_to_memory() {
    let mut topology = create_single_level_topology();
    topology.page_table.kind = PageTableKind::Demand;
    topology.page_table.frame_base = 0x10;
    let mut sched = RequestScheduler::new(&topology).unwrap();

    let first = sched.issue(read(0x3008)).unwrap();
    assert_eq!(first.outcome, TranslationOutcome::PageFault);
    assert_eq!(first.paddr, Some(PhysAddr::new(0x10 * PAGE + 0x8)));
    assert_eq!(first.serviced_by, ServicedBy::Memory(0));
    assert_eq!(first.latency, 1031 + 2 + 117 + 2);

    let second = sched.issue(read(0x3010)).unwrap();
    assert_eq!(second.outcome, TranslationOutcome::WalkHit);
    assert_eq!(second.serviced_by, ServicedBy::Cache(0));
}

/// Tests that the ninth distinct page evicts the first from an eight-entry TLB.
#[test]
fn test_eight_entry_tlb_scenario() {
    let mut topology = create_single_level_topology();
    topology.tlb.entries = 8;
    let mut sched = RequestScheduler::new(&topology).unwrap();

    let trace: Vec<_> = (1..=9).chain(Some(1)).map(|p| read(p * PAGE)).collect();
    let done = sched.run(trace).unwrap();

    assert!(done
        .iter()
        .all(|c| c.outcome == TranslationOutcome::WalkHit));
    let snap = sched.snapshot();
    assert_eq!(snap.counter("tlb.misses"), 10);
    assert_eq!(snap.counter("tlb.hits"), 0);
}

/// Tests the same scenario on a direct-mapped TLB, where page nine shares
/// page one's set.
#[test]
fn test_direct_mapped_tlb_scenario() {
    let mut topology = create_single_level_topology();
    topology.tlb.entries = 8;
    topology.tlb.ways = Some(1);
    let mut sched = RequestScheduler::new(&topology).unwrap();

    let warm: Vec<_> = (1..=8).map(|p| read(p * PAGE)).collect();
    sched.run(warm).unwrap();
    assert!(sched.mmu().tlb.contains(1));

    let ninth = sched.issue(read(9 * PAGE)).unwrap();
    assert_eq!(ninth.outcome, TranslationOutcome::WalkHit);
    assert!(!sched.mmu().tlb.contains(1));
    assert!(sched.mmu().tlb.contains(8));

    let again = sched.issue(read(PAGE)).unwrap();
    assert_eq!(again.outcome, TranslationOutcome::WalkHit);
    assert_eq!(sched.snapshot().counter("tlb.misses"), 10);
    assert_eq!(sched.snapshot().counter("tlb.hits"), 0);
}

/// Tests that demand paging past the end of memory reuses frames instead of
/// producing addresses no controller owns.
#[test]
fn test_demand_paging_beyond_memory() {
    let mut topology = create_single_level_topology();
    topology.page_table.kind = PageTableKind::Demand;
    topology.controllers[0].size = 16 * PAGE;
    let mut sched = RequestScheduler::new(&topology).unwrap();

    let trace: Vec<_> = (0..17).map(|p| read(p * PAGE + 0x40)).collect();
    let done = sched.run(trace).unwrap();

    assert!(!sched.is_halted());
    assert_eq!(done.len(), 17);
    assert!(done
        .iter()
        .all(|c| c.outcome == TranslationOutcome::PageFault));
    assert!(done
        .iter()
        .all(|c| c.paddr.map_or(false, |p| p.val() < 16 * PAGE)));
    let last = done.iter().max_by_key(|c| c.id).unwrap();
    assert_eq!(last.paddr, Some(PhysAddr::new(0x40)));
    assert_eq!(sched.snapshot().counter("tlb.page_faults"), 17);
}

/// Tests that requests on one port never overlap.
#[test]
fn test_port_blocks_until_retirement() {
    let mut sched = RequestScheduler::new(&create_single_level_topology()).unwrap();
    let done = sched.run(vec![read(A), read(B), read(A).at(5_000)]).unwrap();

    assert_eq!(done[1].started_at, done[0].retired_at);
    assert_eq!(done[2].started_at, 5_000);
    assert_eq!(done[2].issued_at, 5_000);
    assert_eq!(sched.port_ready_at(0), Some(done[2].retired_at));
    assert_eq!(sched.now(), done[2].retired_at);
}

/// Tests that the earliest-starting port translates first and ties go to
/// the lower port: only the first of two accesses to a page walks.
#[test]
fn test_ports_advance_in_time_order() {
    let topology = create_two_level_topology();
    let outcome_of = |done: &[Completion], port| {
        done.iter()
            .find(|c| c.port == port)
            .map(|c| c.outcome)
            .unwrap()
    };

    let mut sched = RequestScheduler::new(&topology).unwrap();
    let done = sched
        .run(vec![
            RequestDescriptor::new(1, 0x100, AccessType::Read).at(10),
            RequestDescriptor::new(0, 0x900, AccessType::Fetch).at(10),
        ])
        .unwrap();
    assert_eq!(outcome_of(&done, 0), TranslationOutcome::WalkHit);
    assert_eq!(outcome_of(&done, 1), TranslationOutcome::TlbHit);

    let mut sched = RequestScheduler::new(&topology).unwrap();
    let done = sched
        .run(vec![
            RequestDescriptor::new(0, 0x900, AccessType::Fetch).at(50),
            RequestDescriptor::new(1, 0x100, AccessType::Read).at(5),
        ])
        .unwrap();
    assert_eq!(outcome_of(&done, 1), TranslationOutcome::WalkHit);
    assert_eq!(outcome_of(&done, 0), TranslationOutcome::TlbHit);
    assert!(done.windows(2).all(|w| w[0].retired_at <= w[1].retired_at));
}

/// Tests that a controller serves two ports in the order their requests
/// reach it, not the order the ports started.
#[test]
fn test_controller_serves_in_arrival_order() {
    let mut slow = create_small_cache("slow");
    slow.tag_latency = 50;
    slow.data_latency = 50;
    let mut topology = create_single_level_topology();
    topology.caches = vec![slow];
    topology.ports = vec![port("deep", &["slow"]), port("direct", &[])];
    let mut sched = RequestScheduler::new(&topology).unwrap();

    let done = sched
        .run(vec![
            RequestDescriptor::new(0, 0x1000, AccessType::Read),
            RequestDescriptor::new(1, 0x1000, AccessType::Read).at(1),
        ])
        .unwrap();
    let (first, second) = (&done[0], &done[1]);

    // The direct port reaches the controller at cycle 7, the deep port at 86.
    assert_eq!(first.port, 1);
    assert_eq!(first.outcome, TranslationOutcome::TlbHit);
    assert_eq!(first.latency, sched.min_latency(1).unwrap());
    assert_eq!(first.retired_at, 1 + 1 + 5 + 100 + 12);

    assert_eq!(second.port, 0);
    assert_eq!(second.serviced_by, ServicedBy::Memory(0));
    let queued = 107 - 86;
    assert_eq!(second.latency, 31 + 50 + 5 + queued + 100 + 12 + 2);

    let snap = sched.snapshot();
    assert_eq!(snap.counter("mem.mem.requests"), 2);
    assert_eq!(snap.counter("mem.mem.queue_cycles"), queued);
}

/// Tests that `issue` keeps completions of other ports for the caller.
#[test]
fn test_issue_stashes_other_completions() {
    let mut sched = RequestScheduler::new(&create_two_level_topology()).unwrap();

    let early = sched
        .submit(RequestDescriptor::new(1, 0x40, AccessType::Read))
        .unwrap();
    let own = sched
        .issue(RequestDescriptor::new(0, 0x80, AccessType::Fetch).at(1_000))
        .unwrap();
    assert_eq!(own.port, 0);

    let stashed = sched.take_completions();
    assert_eq!(stashed.len(), 1);
    assert_eq!(stashed[0].id, early);
    assert!(sched.take_completions().is_empty());
    assert_eq!(sched.pending(), 0);
}

/// Tests that every completion respects the minimum latency of its port.
#[test]
fn test_minimum_latency_bound() {
    let mut sched = RequestScheduler::new(&create_two_level_topology()).unwrap();
    let done = sched.run(create_mixed_trace(500, 0x9E37_79B9)).unwrap();

    for c in &done {
        assert!(c.latency >= sched.min_latency(c.port).unwrap());
        assert_eq!(c.retired_at, c.started_at + c.latency);
        assert!(c.started_at >= c.issued_at);
    }
}

/// Tests hit/miss, translation and request accounting over a mixed trace.
#[test]
fn test_accounting_sums() {
    let mut sched = RequestScheduler::new(&create_two_level_topology()).unwrap();
    let done = sched.run(create_mixed_trace(400, 12345)).unwrap();
    let snap = sched.snapshot();

    for level in ["l1i", "l1d", "l2"] {
        assert_eq!(
            snap.counter(&format!("cache.{}.hits", level))
                + snap.counter(&format!("cache.{}.misses", level)),
            snap.counter(&format!("cache.{}.lookups", level))
        );
    }

    let total = done.len() as u64;
    assert_eq!(snap.total_requests(), total);
    assert_eq!(snap.counter("tlb.translations"), total);
    assert_eq!(
        snap.counter("tlb.hits") + snap.counter("tlb.misses") + snap.counter("tlb.page_faults"),
        total
    );
    assert_eq!(
        snap.counter("requests.loads")
            + snap.counter("requests.stores")
            + snap.counter("requests.fetches"),
        total
    );
    assert_eq!(
        snap.counter("requests.latency_sum"),
        done.iter().map(|c| c.latency).sum::<u64>()
    );
    assert_eq!(
        snap.counter("cache.l1i.lookups") + snap.counter("cache.l1d.lookups"),
        total
    );
    assert_eq!(
        snap.counter("cache.l2.lookups"),
        snap.counter("cache.l1i.misses") + snap.counter("cache.l1d.misses")
    );
    assert_eq!(
        snap.counter("mem.mem.requests"),
        snap.counter("cache.l2.misses")
    );
}

/// Tests that no set or TLB ever holds more entries than its capacity.
#[test]
fn test_capacity_invariants() {
    let mut topology = create_two_level_topology();
    topology.tlb.entries = 16;
    topology.tlb.ways = Some(4);
    let mut sched = RequestScheduler::new(&topology).unwrap();

    for desc in create_mixed_trace(300, 77) {
        sched.issue(desc).unwrap();
        for cache in sched.caches() {
            for set in 0..cache.num_sets() {
                assert!(cache.valid_lines(set) <= cache.ways());
            }
        }
        assert!(sched.mmu().tlb.valid_entries() <= sched.mmu().tlb.capacity());
    }
}

/// Tests that replaying a trace on a fresh scheduler reproduces every result.
#[test]
fn test_idempotent_replay() {
    let topology = create_two_level_topology();
    let trace = create_mixed_trace(300, 4242);

    let run = |trace: Vec<RequestDescriptor>| -> (Vec<Completion>, StatsSnapshot) {
        let mut sched = RequestScheduler::new(&topology).unwrap();
        let done = sched.run(trace).unwrap();
        (done, sched.snapshot())
    };

    let (first, first_stats) = run(trace.clone());
    let (second, second_stats) = run(trace);
    assert_eq!(first, second);
    assert_eq!(first_stats, second_stats);
}

/// Tests that resetting statistics keeps the warmed-up hierarchy.
#[test]
fn test_reset_stats_keeps_state() {
    let mut sched = RequestScheduler::new(&create_single_level_topology()).unwrap();
    sched.issue(read(A)).unwrap();
    sched.reset_stats();

    let again = sched.issue(read(A)).unwrap();
    assert_eq!(again.serviced_by, ServicedBy::Cache(0));

    let snap = sched.snapshot();
    assert_eq!(snap.total_requests(), 1);
    assert_eq!(snap.counter("cache.l1.hits"), 1);
    assert_eq!(snap.counter("cache.l1.misses"), 0);
}

/// Tests that an address outside every controller halts the run.
#[test]
fn test_routing_error_halts() {
    let mut sched = RequestScheduler::new(&create_single_level_topology()).unwrap();

    let err = sched.issue(read(0x20_0000)).unwrap_err();
    assert_eq!(
        err,
        SimError::Routing {
            addr: 0x20_0000,
            request_id: 0,
        }
    );
    assert!(sched.is_halted());
    assert_eq!(sched.issue(read(A)), Err(SimError::Halted));
    assert_eq!(sched.step(), Err(SimError::Halted));
}

/// Tests that a request for an undefined port halts the run.
#[test]
fn test_unknown_port_halts() {
    let mut sched = RequestScheduler::new(&create_single_level_topology()).unwrap();

    let err = sched
        .submit(RequestDescriptor::new(3, 0, AccessType::Read))
        .unwrap_err();
    assert_eq!(
        err,
        SimError::UnknownPort {
            port: 3,
            request_id: 0,
        }
    );
    assert_eq!(sched.submit(read(A)), Err(SimError::Halted));
}

/// Tests that an invalid topology is rejected before anything is built.
#[test]
fn test_invalid_topology_rejected() {
    let mut topology = create_single_level_topology();
    topology.ports[0].levels = vec!["l9".to_string()];
    assert!(matches!(
        RequestScheduler::new(&topology),
        Err(SimError::Config(_))
    ));
}

/// Tests port lookup by name and the uncached minimum latency.
#[test]
fn test_port_lookup_and_uncached_minimum() {
    let mut topology = create_single_level_topology();
    topology.ports.push(port("dma", &[]));
    let sched = RequestScheduler::new(&topology).unwrap();

    assert_eq!(sched.port_id("cpu"), Some(0));
    assert_eq!(sched.port_id("dma"), Some(1));
    assert_eq!(sched.port_id("gpu"), None);
    assert_eq!(sched.port_name(1), Some("dma"));
    assert_eq!(sched.min_latency(0), Some(1 + 2 + 2));
    assert_eq!(sched.min_latency(1), Some(1 + 5 + 100 + 12));
    assert_eq!(sched.min_latency(2), None);
}
