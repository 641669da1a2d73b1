//! Memory Access Types.
//!
//! This module defines the classification of memory accesses used throughout
//! the simulator. The kind of an access decides whether a cache hit dirties
//! the line and which statistics bucket the retired request lands in.

use serde::Deserialize;
use std::fmt;

/// Type of memory access operation.
///
/// Used to distinguish between instruction fetches, data loads and data
/// stores as they flow through translation and the cache hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub enum AccessType {
    /// Instruction fetch access.
    ///
    /// Issued by an instruction port. Never dirties a cache line.
    Fetch,

    /// Data read access (load).
    Read,

    /// Data write access (store).
    ///
    /// Marks the written line dirty in the first cache level of the port.
    Write,
}

impl AccessType {
    /// Returns `true` for stores.
    pub fn is_write(&self) -> bool {
        matches!(self, AccessType::Write)
    }

    /// Parses the single-letter mnemonic used in trace files.
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s {
            "F" | "f" | "I" | "i" => Some(AccessType::Fetch),
            "R" | "r" | "L" | "l" => Some(AccessType::Read),
            "W" | "w" | "S" | "s" => Some(AccessType::Write),
            _ => None,
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessType::Fetch => "fetch",
            AccessType::Read => "load",
            AccessType::Write => "store",
        };
        f.write_str(s)
    }
}
