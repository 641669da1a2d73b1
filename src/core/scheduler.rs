//! Request Scheduler.
//!
//! The CPU-side timing model. Each port is an in-order, blocking memory
//! port: it holds at most one request in flight and starts the next only
//! after the previous one retired. Requests move through
//!
//! `Issued -> Translating -> CacheLookup(d)... -> MemoryService -> Filling -> Retired`
//!
//! with `MemoryService` only on a miss in every level of the port's chain,
//! and `Filling` only when at least one level missed.
//!
//! The run is a discrete-event simulation. Every stage is a suspension
//! point: a request waits until simulated time reaches the cycle of its next
//! step, and the scheduler always runs the pending step with the smallest
//! cycle (ties go to the lower port index). Memory service is split into
//! the link grant, the arrival at the controller and the response, so the
//! TLB, shared cache levels, links and controller queues all see work in
//! the order it reaches them, whichever port it comes from.
//!
//! Dirty lines that leave the last cache level are posted writebacks. They
//! take a link slot when evicted and join their controller's queue when they
//! arrive there, but no request waits for them.

use log::{debug, error, info};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use super::request::{
    Completion, MemoryRequest, PortId, RequestDescriptor, RequestId, RequestStage, ServicedBy,
};
use super::units::cache::CacheLevel;
use super::units::mmu::page_table::{self, PageTable};
use super::units::mmu::{Mmu, TranslationOutcome};
use crate::common::{AccessType, Cycle, PhysAddr, SimError, UNCACHED_LINE_BYTES};
use crate::config::Topology;
use crate::soc::System;
use crate::stats::{StatsCollector, StatsSnapshot};

/// Where a suspended request picks up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Lookup(usize),
    /// Send the line request onto the link.
    Request,
    /// Queue at the controller the request just reached.
    Serve(usize),
    Fill(usize),
    Retire,
}

/// A request that has been translated and is waiting for its next step.
struct InFlight {
    req: MemoryRequest,
    step: Step,
    outcome: TranslationOutcome,
    /// `Unmapped` until a cache level or a controller supplies the line.
    serviced_by: ServicedBy,
    /// Chain levels that missed and are filled on the way back.
    missed: usize,
}

impl InFlight {
    /// First fill after the data came back, or retirement if nothing missed.
    fn fill_from(&self) -> Step {
        match self.missed.checked_sub(1) {
            Some(depth) => Step::Fill(depth),
            None => Step::Retire,
        }
    }
}

/// A dirty line travelling to its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PostedWriteback {
    arrives_at: Cycle,
    seq: u64,
    controller: usize,
    addr: u64,
}

struct Port {
    name: String,
    /// Arena indices of the cache levels, closest to the CPU first.
    chain: Vec<usize>,
    /// Line size requested from memory on a full miss.
    line_bytes: usize,
    /// Cycle the port becomes free.
    ready_at: Cycle,
    inbox: VecDeque<MemoryRequest>,
    active: Option<InFlight>,
}

impl Port {
    /// Cycle of this port's next step, and whether it starts a new request.
    fn next_at(&self) -> Option<(Cycle, bool)> {
        match &self.active {
            Some(flight) => Some((flight.req.now(), false)),
            None => self
                .inbox
                .front()
                .map(|r| (self.ready_at.max(r.issued_at), true)),
        }
    }
}

enum Event {
    Writeback,
    Start(PortId, Cycle),
    Resume(PortId),
}

/// Drives requests through translation, the cache chain and memory.
///
/// Ports block: one outstanding request each. Callers that need overlap
/// must model it with several ports.
pub struct RequestScheduler {
    system: System,
    mmu: Mmu,
    caches: Vec<CacheLevel>,
    ports: Vec<Port>,
    posted: BinaryHeap<Reverse<PostedWriteback>>,
    next_posted: u64,
    stats: StatsCollector,
    retired: Vec<Completion>,
    next_id: RequestId,
    halted: bool,
}

impl RequestScheduler {
    /// Builds the hierarchy with the page-table backing named in the topology.
    pub fn new(topology: &Topology) -> Result<Self, SimError> {
        let (_, frame_end) = topology.frame_range();
        Self::with_page_table(topology, page_table::build(&topology.page_table, frame_end))
    }

    /// Builds the hierarchy with a caller-supplied page-table backing.
    pub fn with_page_table(
        topology: &Topology,
        page_table: Box<dyn PageTable>,
    ) -> Result<Self, SimError> {
        topology.validate()?;

        let mut stats = StatsCollector::new();
        let caches: Vec<CacheLevel> = topology
            .caches
            .iter()
            .map(|cfg| CacheLevel::new(cfg, &mut stats))
            .collect();

        let ports = topology
            .ports
            .iter()
            .map(|p| {
                let chain: Vec<usize> = p
                    .levels
                    .iter()
                    .filter_map(|name| caches.iter().position(|c| &c.name == name))
                    .collect();
                let line_bytes = chain
                    .last()
                    .map_or(UNCACHED_LINE_BYTES, |&i| caches[i].line_bytes());
                Port {
                    name: p.name.clone(),
                    chain,
                    line_bytes,
                    ready_at: 0,
                    inbox: VecDeque::new(),
                    active: None,
                }
            })
            .collect::<Vec<_>>();

        let system = System::new(topology, &mut stats)?;
        let mmu = Mmu::new(&topology.general, &topology.tlb, page_table);
        stats.start();

        info!(
            "memory hierarchy ready: {} port(s), {} cache level(s), {} controller(s); \
             ports are blocking (one request in flight each)",
            ports.len(),
            caches.len(),
            system.controllers.len()
        );

        Ok(Self {
            system,
            mmu,
            caches,
            ports,
            posted: BinaryHeap::new(),
            next_posted: 0,
            stats,
            retired: Vec::new(),
            next_id: 0,
            halted: false,
        })
    }

    /// Index of the port called `name`.
    pub fn port_id(&self, name: &str) -> Option<PortId> {
        self.ports.iter().position(|p| p.name == name)
    }

    pub fn port_name(&self, port: PortId) -> Option<&str> {
        self.ports.get(port).map(|p| p.name.as_str())
    }

    /// Cycle at which `port` can start its next request.
    pub fn port_ready_at(&self, port: PortId) -> Option<Cycle> {
        self.ports.get(port).map(|p| p.ready_at)
    }

    /// Latest cycle any port has reached.
    pub fn now(&self) -> Cycle {
        self.ports.iter().map(|p| p.ready_at).max().unwrap_or(0)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Requests submitted but not yet retired.
    pub fn pending(&self) -> usize {
        self.ports
            .iter()
            .map(|p| p.inbox.len() + usize::from(p.active.is_some()))
            .sum()
    }

    /// Writebacks still on their way to a controller.
    pub fn posted_writebacks(&self) -> usize {
        self.posted.len()
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn caches(&self) -> &[CacheLevel] {
        &self.caches
    }

    pub fn cache(&self, name: &str) -> Option<&CacheLevel> {
        self.caches.iter().find(|c| c.name == name)
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    /// Frozen copy of the statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zeroes the statistics without touching cache, TLB or queue state.
    pub fn reset_stats(&mut self) {
        self.stats.start();
    }

    /// Smallest latency any request on `port` can see: a TLB hit plus a hit
    /// in the first level, or an idle memory round trip for an uncached port.
    pub fn min_latency(&self, port: PortId) -> Option<u64> {
        let p = self.ports.get(port)?;
        let translate = self.mmu.hit_latency();
        match p.chain.first() {
            Some(&level) => {
                let c = &self.caches[level];
                Some(translate + c.tag_latency + c.data_latency)
            }
            None => {
                let memory = self
                    .system
                    .controllers
                    .iter()
                    .filter_map(|ctrl| {
                        self.system
                            .min_round_trip(PhysAddr::new(ctrl.range().0), p.line_bytes)
                    })
                    .min()?;
                Some(translate + memory)
            }
        }
    }

    /// Queues a request on its port's inbox.
    ///
    /// A request for a port the topology does not define is malformed and
    /// halts the run.
    pub fn submit(&mut self, desc: RequestDescriptor) -> Result<RequestId, SimError> {
        if self.halted {
            return Err(SimError::Halted);
        }
        let id = self.next_id;
        self.next_id += 1;

        match self.ports.get_mut(desc.port) {
            Some(port) => {
                port.inbox.push_back(MemoryRequest::new(id, &desc));
                Ok(id)
            }
            None => {
                self.halted = true;
                let err = SimError::UnknownPort {
                    port: desc.port,
                    request_id: id,
                };
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Advances simulated time until the next request retires.
    ///
    /// Returns `Ok(None)` once every request has retired and every posted
    /// writeback has reached its controller.
    pub fn step(&mut self) -> Result<Option<Completion>, SimError> {
        if self.halted {
            return Err(SimError::Halted);
        }

        while let Some(event) = self.next_event() {
            match self.dispatch(event) {
                Ok(Some(done)) => return Ok(Some(done)),
                Ok(None) => {}
                Err(err) => {
                    self.halted = true;
                    error!("simulation aborted: {}", err);
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    /// Submits one request and runs until it retires.
    ///
    /// Requests from other ports that retire first are kept for
    /// [`RequestScheduler::take_completions`]. Writebacks posted on the way
    /// may still be in flight afterwards; see [`RequestScheduler::drain`].
    pub fn issue(&mut self, desc: RequestDescriptor) -> Result<Completion, SimError> {
        let id = self.submit(desc)?;
        while let Some(done) = self.step()? {
            if done.id == id {
                return Ok(done);
            }
            self.retired.push(done);
        }
        Err(SimError::Halted)
    }

    /// Completions retired as a side effect of [`RequestScheduler::issue`].
    pub fn take_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.retired)
    }

    /// Runs everything outstanding to completion, posted writebacks included.
    pub fn drain(&mut self) -> Result<Vec<Completion>, SimError> {
        self.run(std::iter::empty())
    }

    /// Submits a batch and runs until the hierarchy is idle.
    ///
    /// Completions come back in retirement order.
    pub fn run<I>(&mut self, requests: I) -> Result<Vec<Completion>, SimError>
    where
        I: IntoIterator<Item = RequestDescriptor>,
    {
        let mut done = Vec::new();
        self.run_with(requests, |c| done.push(*c))?;
        Ok(done)
    }

    /// Like [`RequestScheduler::run`], reporting each completion to `on_retire`.
    ///
    /// Returns the number of requests retired.
    pub fn run_with<I, F>(&mut self, requests: I, mut on_retire: F) -> Result<u64, SimError>
    where
        I: IntoIterator<Item = RequestDescriptor>,
        F: FnMut(&Completion),
    {
        for desc in requests {
            self.submit(desc)?;
        }
        let mut count = 0;
        while let Some(done) = self.step()? {
            on_retire(&done);
            count += 1;
        }
        Ok(count)
    }

    /// Picks the pending step with the smallest cycle. A writeback arriving
    /// in the same cycle as a port step goes first.
    fn next_event(&self) -> Option<Event> {
        let port = self
            .ports
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.next_at().map(|(at, start)| (at, i, start)))
            .min_by_key(|&(at, i, _)| (at, i));
        let writeback = self.posted.peek().map(|Reverse(wb)| wb.arrives_at);

        match (writeback, port) {
            (Some(wb_at), Some((at, _, _))) if wb_at <= at => Some(Event::Writeback),
            (Some(_), None) => Some(Event::Writeback),
            (_, Some((at, i, true))) => Some(Event::Start(i, at)),
            (_, Some((_, i, false))) => Some(Event::Resume(i)),
            (None, None) => None,
        }
    }

    fn dispatch(&mut self, event: Event) -> Result<Option<Completion>, SimError> {
        match event {
            Event::Writeback => {
                self.deliver_writeback();
                Ok(None)
            }
            Event::Start(port, at) => {
                self.start(port, at);
                Ok(None)
            }
            Event::Resume(port) => self.resume(port),
        }
    }

    /// Takes the next request off `port`'s inbox and translates it.
    fn start(&mut self, port: PortId, at: Cycle) {
        let Some(mut req) = self.ports[port].inbox.pop_front() else {
            return;
        };
        req.begin(at);

        req.advance(RequestStage::Translating);
        let translation = self.mmu.translate(req.vaddr, req.kind, &mut self.stats);
        req.charge(translation.cycles);

        let step = match translation.paddr {
            Some(paddr) => {
                req.set_paddr(paddr);
                if self.ports[port].chain.is_empty() {
                    Step::Request
                } else {
                    Step::Lookup(0)
                }
            }
            None => Step::Retire,
        };

        self.ports[port].active = Some(InFlight {
            req,
            step,
            outcome: translation.outcome,
            serviced_by: ServicedBy::Unmapped,
            missed: 0,
        });
    }

    /// Runs the next step of `port`'s request.
    fn resume(&mut self, port: PortId) -> Result<Option<Completion>, SimError> {
        let Some(mut flight) = self.ports[port].active.take() else {
            return Ok(None);
        };

        let next = match (flight.step, flight.req.paddr()) {
            (Step::Retire, _) | (_, None) => return Ok(Some(self.retire(flight))),
            (Step::Lookup(depth), Some(paddr)) => self.lookup(&mut flight, paddr, depth),
            (Step::Request, Some(paddr)) => self.request_line(&mut flight, paddr)?,
            (Step::Serve(controller), Some(paddr)) => {
                self.serve_line(&mut flight, paddr, controller)?
            }
            (Step::Fill(depth), Some(paddr)) => self.fill(&mut flight, paddr, depth)?,
        };

        flight.step = next;
        self.ports[port].active = Some(flight);
        Ok(None)
    }

    fn lookup(&mut self, flight: &mut InFlight, paddr: PhysAddr, depth: usize) -> Step {
        let chain = &self.ports[flight.req.port].chain;
        let (level, chain_len) = (chain[depth], chain.len());

        flight.req.advance(RequestStage::CacheLookup(depth));
        // Lower levels are searched on behalf of the level above, which
        // is the only one a store dirties.
        let access = if depth == 0 {
            flight.req.kind
        } else {
            AccessType::Read
        };
        let lookup = self.caches[level].lookup(paddr, access, &mut self.stats);
        flight.req.charge(lookup.latency);

        if lookup.hit {
            flight.serviced_by = ServicedBy::Cache(level);
            flight.missed = depth;
            flight.fill_from()
        } else if depth + 1 < chain_len {
            Step::Lookup(depth + 1)
        } else {
            flight.missed = chain_len;
            Step::Request
        }
    }

    fn request_line(&mut self, flight: &mut InFlight, paddr: PhysAddr) -> Result<Step, SimError> {
        let req = &mut flight.req;
        req.advance(RequestStage::MemoryService);

        let now = req.now();
        let grant = self
            .system
            .send_read(now, req.id, req.port, paddr, &mut self.stats)?;
        req.charge(grant.arrives_at - now);
        Ok(Step::Serve(grant.controller))
    }

    fn serve_line(
        &mut self,
        flight: &mut InFlight,
        paddr: PhysAddr,
        controller: usize,
    ) -> Result<Step, SimError> {
        let req = &mut flight.req;
        let line_bytes = self.ports[req.port].line_bytes;

        let now = req.now();
        let service = self
            .system
            .serve(controller, now, paddr, false, &mut self.stats);
        let delivery = self.system.send_line(
            service.completes_at,
            req.id,
            req.port,
            paddr,
            line_bytes,
            &mut self.stats,
        )?;
        req.charge(delivery.arrives_at - now);

        flight.serviced_by = ServicedBy::Memory(controller);
        Ok(flight.fill_from())
    }

    fn fill(
        &mut self,
        flight: &mut InFlight,
        paddr: PhysAddr,
        depth: usize,
    ) -> Result<Step, SimError> {
        let req = &mut flight.req;
        if req.stage() != RequestStage::Filling {
            req.advance(RequestStage::Filling);
        }

        let level = self.ports[req.port].chain[depth];
        let dirty = depth == 0 && req.kind.is_write();
        let at = req.now();
        let fill = self.caches[level].fill(paddr, dirty, at, &mut self.stats);
        req.charge(fill.latency);

        if let Some(victim) = fill.victim.filter(|v| v.dirty) {
            let (port, id) = (req.port, req.id);
            self.write_back(port, depth, victim.addr, at, id)?;
        }

        Ok(match depth.checked_sub(1) {
            Some(above) => Step::Fill(above),
            None => Step::Retire,
        })
    }

    /// Pushes a dirty line evicted from `depth` toward the next level.
    ///
    /// The requester does not wait; the writeback only occupies the levels
    /// and queues it passes through. Allocating the line below may evict
    /// another dirty line, which continues downward. A line that leaves the
    /// chain is posted to memory.
    fn write_back(
        &mut self,
        port: PortId,
        depth: usize,
        addr: PhysAddr,
        at: Cycle,
        request_id: RequestId,
    ) -> Result<(), SimError> {
        let chain_len = self.ports[port].chain.len();
        let mut addr = addr;
        let mut depth = depth + 1;

        while depth < chain_len {
            let level = self.ports[port].chain[depth];
            debug!("writeback {} -> {}", addr, self.caches[level].name);
            match self.caches[level].absorb_writeback(addr, at, &mut self.stats) {
                Some(victim) => {
                    addr = victim.addr;
                    depth += 1;
                }
                None => return Ok(()),
            }
        }

        let line_bytes = self.ports[port].line_bytes;
        let grant = self
            .system
            .post_write_back(at, request_id, port, addr, line_bytes, &mut self.stats)?;
        debug!(
            "writeback {} -> {} (arrives at cycle {})",
            addr, self.system.controllers[grant.controller].name, grant.arrives_at
        );

        self.posted.push(Reverse(PostedWriteback {
            arrives_at: grant.arrives_at,
            seq: self.next_posted,
            controller: grant.controller,
            addr: addr.val(),
        }));
        self.next_posted += 1;
        Ok(())
    }

    /// Queues the earliest posted writeback at its controller.
    fn deliver_writeback(&mut self) {
        if let Some(Reverse(wb)) = self.posted.pop() {
            self.system.serve(
                wb.controller,
                wb.arrives_at,
                PhysAddr::new(wb.addr),
                true,
                &mut self.stats,
            );
        }
    }

    fn retire(&mut self, flight: InFlight) -> Completion {
        let InFlight {
            mut req,
            outcome,
            serviced_by,
            ..
        } = flight;
        req.advance(RequestStage::Retired);
        let latency = req.elapsed();
        let retired_at = req.now();

        self.ports[req.port].ready_at = retired_at;
        self.stats.record_retirement(req.kind, latency);

        debug!(
            "req {} [{}] {} {} -> {:?} in {} cycles ({:?}, {:?})",
            req.id,
            self.ports[req.port].name,
            req.kind,
            req.vaddr,
            req.paddr(),
            latency,
            outcome,
            serviced_by
        );

        Completion {
            id: req.id,
            port: req.port,
            vaddr: req.vaddr,
            kind: req.kind,
            paddr: req.paddr(),
            outcome,
            serviced_by,
            issued_at: req.issued_at,
            started_at: req.started_at(),
            retired_at,
            latency,
        }
    }
}
