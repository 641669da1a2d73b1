//! Memory Timing Models.
//!
//! This module defines the `AccessTiming` trait and the latency models a
//! controller can use. It supports both a simple fixed-latency model and a
//! DRAM timing model that accounts for row buffer locality. The set of models
//! is closed: a controller holds a [`TimingModel`] rather than a trait object.

use crate::config::{ControllerConfig, ControllerModel};

/// Latency of a single access, excluding any queueing.
pub trait AccessTiming {
    /// Calculates the latency for a memory access at a specific address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The physical address being accessed.
    ///
    /// # Returns
    ///
    /// The latency in CPU cycles.
    fn access_latency(&mut self, addr: u64) -> u64;

    /// Smallest latency this model can ever return.
    fn min_latency(&self) -> u64;
}

/// A fixed-latency timing model.
///
/// Models an ideal memory system where every access takes a constant amount of time,
/// ignoring row buffer locality or refresh cycles.
#[derive(Debug, Clone)]
pub struct SimpleTiming {
    /// Fixed latency per access.
    latency: u64,
}

impl SimpleTiming {
    pub fn new(latency: u64) -> Self {
        Self { latency }
    }
}

impl AccessTiming for SimpleTiming {
    fn access_latency(&mut self, _addr: u64) -> u64 {
        self.latency
    }

    fn min_latency(&self) -> u64 {
        self.latency
    }
}

/// A DRAM-aware timing model.
///
/// Simulates basic DRAM timing parameters including Row Access Strobe (RAS),
/// Column Access Strobe (CAS), and Precharge (PRE). It tracks the currently
/// open row to simulate row buffer hits (lower latency) and misses (higher latency).
#[derive(Debug, Clone)]
pub struct DramTiming {
    /// The index of the currently open row, if any.
    last_row: Option<u64>,
    /// Column Access Strobe latency (Column command to data).
    t_cas: u64,
    /// Row Access Strobe latency (Row Active command to Column command).
    t_ras: u64,
    /// Precharge latency (Precharge command to Row Active command).
    t_pre: u64,
    /// Bitmask used to extract the row index from a physical address.
    row_mask: u64,
}

impl DramTiming {
    /// Creates a DRAM timing model with no row open.
    ///
    /// `row_bytes` must be a power of two.
    pub fn new(t_cas: u64, t_ras: u64, t_pre: u64, row_bytes: u64) -> Self {
        Self {
            last_row: None,
            t_cas,
            t_ras,
            t_pre,
            row_mask: !(row_bytes - 1),
        }
    }

    /// Row currently held in the row buffer.
    pub fn open_row(&self) -> Option<u64> {
        self.last_row
    }
}

impl AccessTiming for DramTiming {
    /// Calculates latency based on row buffer state.
    ///
    /// * **Row Hit:** If the requested row is already open, latency is just `t_cas`.
    /// * **Row Miss (Open):** If a different row is open, it must be precharged first: `t_pre + t_ras + t_cas`.
    /// * **Row Miss (Closed):** If no row is open, the row must be activated: `t_ras + t_cas`.
    fn access_latency(&mut self, addr: u64) -> u64 {
        let row = addr & self.row_mask;

        match self.last_row {
            Some(open_row) if open_row == row => self.t_cas,
            Some(_) => {
                self.last_row = Some(row);
                self.t_pre + self.t_ras + self.t_cas
            }
            None => {
                self.last_row = Some(row);
                self.t_ras + self.t_cas
            }
        }
    }

    fn min_latency(&self) -> u64 {
        self.t_cas
    }
}

/// The closed set of timing models a controller can be built with.
#[derive(Debug, Clone)]
pub enum TimingModel {
    Simple(SimpleTiming),
    Dram(DramTiming),
}

impl TimingModel {
    pub fn from_config(config: &ControllerConfig) -> Self {
        match config.model {
            ControllerModel::Simple => TimingModel::Simple(SimpleTiming::new(config.latency)),
            ControllerModel::Dram => TimingModel::Dram(DramTiming::new(
                config.t_cas,
                config.t_ras,
                config.t_pre,
                config.row_bytes,
            )),
        }
    }
}

impl AccessTiming for TimingModel {
    fn access_latency(&mut self, addr: u64) -> u64 {
        match self {
            TimingModel::Simple(t) => t.access_latency(addr),
            TimingModel::Dram(t) => t.access_latency(addr),
        }
    }

    fn min_latency(&self) -> u64 {
        match self {
            TimingModel::Simple(t) => t.min_latency(),
            TimingModel::Dram(t) => t.min_latency(),
        }
    }
}
