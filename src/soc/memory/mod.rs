//! Main-memory side of the hierarchy.
//!
//! * `timing`: per-access latency models (fixed or open-row DRAM).
//! * `controller`: the queueing front end that owns a physical range.

/// Queueing memory controller.
pub mod controller;

/// Access latency models.
pub mod timing;

pub use controller::{MemoryController, ServiceResult};
pub use timing::{AccessTiming, TimingModel};
