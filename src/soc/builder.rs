//! Memory System Builder.
//!
//! This module defines the `System` structure, which acts as the container
//! for the shared memory-side components (interconnect and controllers). It
//! wires them from the topology and exposes the memory side of a line fetch
//! as separate steps (header out, service at the controller, line back) so
//! the caller can run each one at the cycle it actually happens. Dirty lines
//! are posted the same way: link first, controller on arrival.

use log::info;

use crate::common::{ConfigError, Cycle, PhysAddr, SimError, REQUEST_HEADER_BYTES};
use crate::config::Topology;
use crate::soc::interconnect::{Delivery, Grant, Interconnect, Packet};
use crate::soc::memory::{MemoryController, ServiceResult};
use crate::stats::StatsCollector;

/// Shared memory side of the simulated system.
pub struct System {
    /// Crossbar between ports and controllers.
    pub interconnect: Interconnect,
    /// Controllers, indexed as in the topology.
    pub controllers: Vec<MemoryController>,
}

impl System {
    /// Builds the interconnect and controllers described by `topology`.
    pub fn new(topology: &Topology, stats: &mut StatsCollector) -> Result<Self, ConfigError> {
        let endpoints = topology.ports.iter().map(|p| p.name.clone()).collect();
        let interconnect =
            Interconnect::new(&topology.interconnect, &topology.controllers, endpoints)?;

        let controllers = topology
            .controllers
            .iter()
            .map(|cfg| {
                info!(
                    "[Mem] Registered controller: {:<12} @ {:#010x} - {:#010x} ({:?})",
                    cfg.name,
                    cfg.base,
                    cfg.end(),
                    cfg.model
                );
                MemoryController::new(cfg, stats)
            })
            .collect();

        Ok(Self {
            interconnect,
            controllers,
        })
    }

    /// Puts the header of a line fetch on the link toward the controller
    /// owning `addr`.
    pub fn send_read(
        &mut self,
        now: Cycle,
        request_id: u64,
        port: usize,
        addr: PhysAddr,
        stats: &mut StatsCollector,
    ) -> Result<Grant, SimError> {
        let header = Packet {
            request_id,
            origin: port,
            addr,
            bytes: REQUEST_HEADER_BYTES,
        };
        self.interconnect.send_request(now, &header, stats)
    }

    /// Queues a request that reached `controller` at `now`.
    pub fn serve(
        &mut self,
        controller: usize,
        now: Cycle,
        addr: PhysAddr,
        writeback: bool,
        stats: &mut StatsCollector,
    ) -> ServiceResult {
        self.controllers[controller].service(now, addr, writeback, stats)
    }

    /// Carries a `line_bytes` response back to `port`, leaving at `now`.
    pub fn send_line(
        &mut self,
        now: Cycle,
        request_id: u64,
        port: usize,
        addr: PhysAddr,
        line_bytes: usize,
        stats: &mut StatsCollector,
    ) -> Result<Delivery, SimError> {
        let response = Packet {
            request_id,
            origin: port,
            addr,
            bytes: line_bytes,
        };
        self.interconnect.send_response(now, &response, stats)
    }

    /// Puts a dirty line on the link toward memory.
    ///
    /// Nobody waits for it. The caller queues it at `grant.controller` once
    /// simulated time reaches `grant.arrives_at`.
    pub fn post_write_back(
        &mut self,
        now: Cycle,
        request_id: u64,
        port: usize,
        addr: PhysAddr,
        line_bytes: usize,
        stats: &mut StatsCollector,
    ) -> Result<Grant, SimError> {
        let packet = Packet {
            request_id,
            origin: port,
            addr,
            bytes: line_bytes,
        };
        self.interconnect.send_request(now, &packet, stats)
    }

    /// Smallest memory round trip for a `line_bytes` fill with idle queues.
    pub fn min_round_trip(&self, addr: PhysAddr, line_bytes: usize) -> Option<u64> {
        let controller = self.interconnect.route(addr, 0).ok()?;
        Some(
            self.interconnect.calculate_transit_time(REQUEST_HEADER_BYTES)
                + self.controllers[controller].min_latency()
                + self.interconnect.calculate_transit_time(line_bytes),
        )
    }
}
