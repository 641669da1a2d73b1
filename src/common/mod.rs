//! Common types used throughout the memory-hierarchy simulator.
//!
//! This module provides the address newtypes, access classification,
//! error types and constants that are shared by the translation unit,
//! the caches, the interconnect and the memory controllers.

/// Address type definitions (physical and virtual addresses).
pub mod addr;

/// Common constants used throughout the simulator.
pub mod constants;

/// Memory access type definitions.
pub mod data;

/// Configuration and simulation error types.
pub mod error;

pub use addr::{PhysAddr, VirtAddr};
pub use data::AccessType;
pub use error::{ConfigError, SimError};

pub use constants::{DEFAULT_PAGE_SHIFT, REQUEST_HEADER_BYTES, UNCACHED_LINE_BYTES};

/// Simulation time, in core clock cycles.
pub type Cycle = u64;
