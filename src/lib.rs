//! Memory Hierarchy Simulator Library.
//!
//! This crate implements a cycle-approximate model of a CPU memory
//! subsystem: address translation, a configurable multi-level cache
//! hierarchy, a crossbar interconnect and queueing memory controllers. It
//! reports per-request latency and aggregate statistics for a stream of
//! memory requests.
//!
//! # Architecture
//!
//! * **Translation**: TLB with a page-table walker and pluggable page-table
//!   backings (identity, explicit, demand-paged).
//! * **Caches**: set-associative, write-back and write-allocate, LRU or FIFO
//!   replacement, one linear chain per CPU port.
//! * **Memory**: range-routed crossbar with per-link bandwidth, FIFO
//!   controllers with bounded queues and simple or open-row DRAM timing.
//!
//! # Modules
//!
//! * `common`: Shared types, constants, and error handling.
//! * `config`: Topology loading, defaults and validation.
//! * `core`: Request scheduler, MMU and caches.
//! * `sim`: Trace loading.
//! * `soc`: Interconnect and memory controllers.
//! * `stats`: Statistics collection and reporting.

/// Shared types, constants, and error handling.
///
/// Provides the address newtypes, the access classification and the error
/// enums used throughout the simulator.
pub mod common;

/// Topology descriptor for translation, caches, ports, interconnect and
/// memory controllers.
///
/// Loads and validates TOML files describing the simulated hierarchy.
pub mod config;

/// CPU-side timing model.
///
/// Drives requests from issue to retirement through the MMU and each port's
/// cache chain.
pub mod core;

/// Simulation harness helpers.
pub mod sim;

/// Memory side of the system: interconnect and memory controllers.
pub mod soc;

/// Performance statistics collection and reporting.
///
/// Tracks translation, cache, interconnect and controller counters plus the
/// request latency distribution.
pub mod stats;
