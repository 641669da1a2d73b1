//! Memory-side components shared by every CPU port.

/// System container wiring the interconnect to the controllers.
pub mod builder;

/// Address-routed crossbar with per-link bandwidth.
pub mod interconnect;

/// Memory controllers and their timing models.
pub mod memory;

pub use builder::System;
