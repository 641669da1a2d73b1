//! Queueing Memory Controller.
//!
//! A controller owns one contiguous physical range and serves it with a
//! single FIFO server. Each accepted request occupies the server for the
//! access latency reported by the timing model, so a request that arrives
//! behind `n` others waits for all of them: the queueing term grows with the
//! queue depth. The queue is bounded; a request that finds it full pays the
//! configured backpressure latency and waits for the oldest entry to drain.
//! Saturation is therefore a stall, never an error.
//!
//! Requests complete strictly in arrival order, which keeps a dirty
//! writeback ahead of a later fill of the same line.

use log::debug;
use std::collections::VecDeque;

use super::timing::{AccessTiming, TimingModel};
use crate::common::{Cycle, PhysAddr};
use crate::config::ControllerConfig;
use crate::stats::StatsCollector;

/// Result of queueing one request at a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceResult {
    /// Cycles from arrival to completion.
    pub latency: u64,
    /// Portion of `latency` spent waiting for earlier requests.
    pub queue_delay: u64,
    /// Whether the request found the queue full.
    pub backpressured: bool,
    /// Cycle at which the data is ready at the controller.
    pub completes_at: Cycle,
}

pub struct MemoryController {
    pub name: String,
    base: u64,
    end: u64,
    timing: TimingModel,
    /// Completion cycles of accepted requests, in arrival order.
    pending: VecDeque<Cycle>,
    capacity: usize,
    backpressure_latency: u64,
    stats_id: usize,
}

impl MemoryController {
    pub fn new(config: &ControllerConfig, stats: &mut StatsCollector) -> Self {
        Self {
            name: config.name.clone(),
            base: config.base,
            end: config.end(),
            timing: TimingModel::from_config(config),
            pending: VecDeque::with_capacity(config.queue_capacity),
            capacity: config.queue_capacity,
            backpressure_latency: config.backpressure_latency,
            stats_id: stats.register_controller(&config.name),
        }
    }

    /// `[base, end)` range owned by this controller.
    pub fn range(&self) -> (u64, u64) {
        (self.base, self.end)
    }

    pub fn owns(&self, addr: PhysAddr) -> bool {
        addr.val() >= self.base && addr.val() < self.end
    }

    /// Smallest latency an access can see with an empty queue.
    pub fn min_latency(&self) -> u64 {
        self.timing.min_latency()
    }

    /// Requests still outstanding at `now`.
    pub fn queue_depth(&self, now: Cycle) -> usize {
        self.pending.iter().filter(|&&done| done > now).count()
    }

    fn retire_completed(&mut self, now: Cycle) {
        while let Some(&done) = self.pending.front() {
            if done > now {
                break;
            }
            self.pending.pop_front();
        }
    }

    /// Queues a request arriving at `now` and returns when it completes.
    ///
    /// `writeback` only selects the counter the request is charged to.
    pub fn service(
        &mut self,
        now: Cycle,
        addr: PhysAddr,
        writeback: bool,
        stats: &mut StatsCollector,
    ) -> ServiceResult {
        self.retire_completed(now);

        let mut start = self.pending.back().map_or(now, |&last| last.max(now));
        let backpressured = self.pending.len() >= self.capacity;
        if backpressured {
            if let Some(oldest) = self.pending.pop_front() {
                start = start.max(oldest);
            }
            start += self.backpressure_latency;
            debug!(
                "{}: queue full ({} entries) at cycle {}, {} stalls until {}",
                self.name, self.capacity, now, addr, start
            );
        }

        let completes_at = start + self.timing.access_latency(addr.val());
        self.pending.push_back(completes_at);

        let queue_delay = start - now;
        stats.record_controller(self.stats_id, queue_delay, backpressured, writeback);

        ServiceResult {
            latency: completes_at - now,
            queue_delay,
            backpressured,
            completes_at,
        }
    }
}
