//! Memory Interconnect.
//!
//! This module implements the crossbar between the CPU-side cache chains and
//! the memory controllers. It routes requests by physical address to the
//! controller that owns the range, arbitrates each controller link at a fixed
//! number of grants per cycle, and routes responses back to the port that
//! issued them.
//!
//! Routing is static: the controller ranges are disjoint and sorted once at
//! construction, so every address maps to at most one controller.

use crate::common::{ConfigError, Cycle, PhysAddr, SimError};
use crate::config::{ControllerConfig, InterconnectConfig};
use crate::stats::StatsCollector;

/// A message crossing the interconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub request_id: u64,
    /// Port the request originated from; responses are delivered there.
    pub origin: usize,
    pub addr: PhysAddr,
    /// Payload size in bytes.
    pub bytes: usize,
}

/// A request admitted onto a controller link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub controller: usize,
    /// Cycle the link accepted the request.
    pub granted_at: Cycle,
    /// Cycle the request reaches the controller.
    pub arrives_at: Cycle,
    /// Cycles spent waiting for link bandwidth.
    pub queue_delay: u64,
}

/// A response delivered to its origin port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub port: usize,
    pub arrives_at: Cycle,
}

#[derive(Debug, Clone)]
struct Route {
    base: u64,
    end: u64,
    controller: usize,
}

/// Per-controller link state: the cycle currently being granted and how many
/// grants it has already issued.
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    epoch: Cycle,
    granted: u32,
}

/// Crossbar between cache-hierarchy endpoints and memory controllers.
pub struct Interconnect {
    /// Interconnect width in bytes (determines transfer size).
    pub width_bytes: u64,
    /// Base latency in cycles per traversal.
    pub latency_cycles: u64,
    requests_per_cycle: u32,
    routes: Vec<Route>,
    links: Vec<Link>,
    endpoints: Vec<String>,
}

impl Interconnect {
    /// Builds the routing table.
    ///
    /// Controller indices follow the order of `controllers`. Overlapping
    /// ranges are rejected here so routing never has to break a tie.
    pub fn new(
        config: &InterconnectConfig,
        controllers: &[ControllerConfig],
        endpoints: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let mut routes: Vec<Route> = controllers
            .iter()
            .enumerate()
            .map(|(i, c)| Route {
                base: c.base,
                end: c.end(),
                controller: i,
            })
            .collect();
        routes.sort_by_key(|r| r.base);

        for pair in routes.windows(2) {
            if pair[1].base < pair[0].end {
                return Err(ConfigError::OverlappingRanges {
                    first: controllers[pair[0].controller].name.clone(),
                    second: controllers[pair[1].controller].name.clone(),
                });
            }
        }

        Ok(Self {
            width_bytes: config.width_bytes,
            latency_cycles: config.latency,
            requests_per_cycle: config.requests_per_cycle,
            routes,
            links: vec![Link::default(); controllers.len()],
            endpoints,
        })
    }

    /// Calculates the transit time for a transfer of the specified size.
    ///
    /// Base latency plus one cycle per `width_bytes` beat.
    pub fn calculate_transit_time(&self, bytes: usize) -> u64 {
        let transfers = (bytes as u64 + self.width_bytes - 1) / self.width_bytes;
        self.latency_cycles + transfers
    }

    /// Returns the controller owning `addr`.
    pub fn route(&self, addr: PhysAddr, request_id: u64) -> Result<usize, SimError> {
        let raw = addr.val();
        let idx = self.routes.partition_point(|r| r.base <= raw);
        match idx.checked_sub(1).map(|i| &self.routes[i]) {
            Some(route) if raw < route.end => Ok(route.controller),
            _ => Err(SimError::Routing {
                addr: raw,
                request_id,
            }),
        }
    }

    /// Returns the port a response must be delivered to.
    pub fn route_response(&self, packet: &Packet) -> Result<usize, SimError> {
        if packet.origin < self.endpoints.len() {
            Ok(packet.origin)
        } else {
            Err(SimError::UnknownPort {
                port: packet.origin,
                request_id: packet.request_id,
            })
        }
    }

    /// Name of a CPU-side endpoint.
    pub fn endpoint(&self, port: usize) -> Option<&str> {
        self.endpoints.get(port).map(String::as_str)
    }

    /// Grants a link slot in the order requests reach the link.
    ///
    /// A link issues `requests_per_cycle` grants per cycle; later requests in
    /// the same cycle slide to the next one. Callers present requests in
    /// non-decreasing `now`.
    fn arbitrate(&mut self, controller: usize, now: Cycle) -> Cycle {
        let per_cycle = self.requests_per_cycle;
        let link = &mut self.links[controller];
        if now > link.epoch {
            link.epoch = now;
            link.granted = 0;
        }
        if link.granted >= per_cycle {
            link.epoch += 1;
            link.granted = 0;
        }
        link.granted += 1;
        link.epoch
    }

    /// Sends a request toward its controller.
    pub fn send_request(
        &mut self,
        now: Cycle,
        packet: &Packet,
        stats: &mut StatsCollector,
    ) -> Result<Grant, SimError> {
        let controller = self.route(packet.addr, packet.request_id)?;
        let granted_at = self.arbitrate(controller, now);
        let queue_delay = granted_at - now;
        stats.record_xbar_request(queue_delay);
        Ok(Grant {
            controller,
            granted_at,
            arrives_at: granted_at + self.calculate_transit_time(packet.bytes),
            queue_delay,
        })
    }

    /// Carries a response of `packet.bytes` back to its origin port.
    pub fn send_response(
        &mut self,
        now: Cycle,
        packet: &Packet,
        stats: &mut StatsCollector,
    ) -> Result<Delivery, SimError> {
        let port = self.route_response(packet)?;
        stats.record_xbar_response();
        Ok(Delivery {
            port,
            arrives_at: now + self.calculate_transit_time(packet.bytes),
        })
    }
}
