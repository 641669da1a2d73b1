//! Memory Requests.
//!
//! A [`MemoryRequest`] is created when the driver submits a
//! [`RequestDescriptor`] and is owned by the scheduler until it retires.
//! Pipeline stages may annotate it (stage, accumulated latency, translated
//! address) but never take it over. Retirement turns it into a
//! [`Completion`] handed back to the caller.

use log::trace;

use crate::common::{AccessType, Cycle, PhysAddr, VirtAddr};
use crate::core::units::mmu::TranslationOutcome;

/// Identifier assigned at submission, unique within a scheduler.
pub type RequestId = u64;

/// Index of a CPU-side port in the topology.
pub type PortId = usize;

/// Pipeline stage of an in-flight request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStage {
    Issued,
    Translating,
    /// Probing the cache at this depth of the port's chain (0 = closest to the CPU).
    CacheLookup(usize),
    MemoryService,
    Filling,
    Retired,
}

/// What the driver hands the scheduler for one access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub port: PortId,
    pub vaddr: VirtAddr,
    pub kind: AccessType,
    /// Earliest cycle the request may start. The port may start it later.
    pub at: Cycle,
}

impl RequestDescriptor {
    /// A request that starts as soon as its port is free.
    pub fn new(port: PortId, vaddr: u64, kind: AccessType) -> Self {
        Self {
            port,
            vaddr: VirtAddr::new(vaddr),
            kind,
            at: 0,
        }
    }

    /// Sets the earliest issue cycle.
    pub fn at(mut self, cycle: Cycle) -> Self {
        self.at = cycle;
        self
    }
}

/// An in-flight request.
#[derive(Clone, Debug)]
pub struct MemoryRequest {
    pub id: RequestId,
    pub port: PortId,
    pub vaddr: VirtAddr,
    pub kind: AccessType,
    /// Cycle the driver asked for.
    pub issued_at: Cycle,
    started_at: Cycle,
    stage: RequestStage,
    elapsed: u64,
    paddr: Option<PhysAddr>,
}

impl MemoryRequest {
    pub fn new(id: RequestId, desc: &RequestDescriptor) -> Self {
        Self {
            id,
            port: desc.port,
            vaddr: desc.vaddr,
            kind: desc.kind,
            issued_at: desc.at,
            started_at: desc.at,
            stage: RequestStage::Issued,
            elapsed: 0,
            paddr: None,
        }
    }

    /// Marks the cycle the port actually began working on the request.
    pub fn begin(&mut self, cycle: Cycle) {
        self.started_at = cycle;
        self.elapsed = 0;
    }

    pub fn stage(&self) -> RequestStage {
        self.stage
    }

    pub fn started_at(&self) -> Cycle {
        self.started_at
    }

    /// Latency accumulated so far.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Current simulated time from this request's point of view.
    pub fn now(&self) -> Cycle {
        self.started_at + self.elapsed
    }

    pub fn paddr(&self) -> Option<PhysAddr> {
        self.paddr
    }

    pub fn advance(&mut self, stage: RequestStage) {
        trace!(
            "req {} @{}: {:?} -> {:?}",
            self.id,
            self.now(),
            self.stage,
            stage
        );
        self.stage = stage;
    }

    /// Adds stage latency.
    pub fn charge(&mut self, cycles: u64) {
        self.elapsed += cycles;
    }

    /// Records the translated address. A request is translated at most once.
    pub fn set_paddr(&mut self, paddr: PhysAddr) {
        debug_assert!(self.paddr.is_none(), "request {} translated twice", self.id);
        self.paddr.get_or_insert(paddr);
    }
}

/// Where a request's data came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServicedBy {
    /// Hit in the cache level with this arena index.
    Cache(usize),
    /// Fetched from the controller with this index.
    Memory(usize),
    /// Page fault left the page unmapped; no memory access happened.
    Unmapped,
}

/// Per-request result reported at retirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub id: RequestId,
    pub port: PortId,
    pub vaddr: VirtAddr,
    pub kind: AccessType,
    pub paddr: Option<PhysAddr>,
    pub outcome: TranslationOutcome,
    pub serviced_by: ServicedBy,
    pub issued_at: Cycle,
    pub started_at: Cycle,
    pub retired_at: Cycle,
    /// Sum of every stage latency the request incurred.
    pub latency: u64,
}
