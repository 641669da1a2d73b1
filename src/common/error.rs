//! Error Types.
//!
//! Two classes of failure escape the simulator core:
//!
//! * [`ConfigError`]: the topology descriptor is malformed. Detected once, at
//!   construction, before any request is simulated.
//! * [`SimError`]: a fatal condition met while simulating (an address that no
//!   controller owns, a request for a port that does not exist). The run is
//!   halted.
//!
//! Queue saturation and page faults are not errors; they are absorbed into
//! latency and counters by the components that observe them.

use std::error::Error;
use std::fmt;

/// A malformed topology descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The TOML text could not be parsed into a topology.
    Parse(String),
    /// A size or count that must be a power of two is not.
    NotPowerOfTwo { field: String, value: u64 },
    /// A structure was configured with zero capacity.
    ZeroCapacity { field: String },
    /// A cache's size is not divisible into `line_bytes * ways` sets.
    BadGeometry { cache: String, reason: String },
    /// Two controllers claim overlapping address ranges.
    OverlappingRanges { first: String, second: String },
    /// Consecutive controller ranges leave a hole in the physical map.
    GappedRanges { first: String, second: String, gap_start: u64, gap_end: u64 },
    /// A port chain names a cache level that is not defined.
    UnknownCacheLevel { port: String, level: String },
    /// A port chain lists the same cache level twice.
    RepeatedCacheLevel { port: String, level: String },
    /// Two components of the same kind share a name.
    DuplicateName { kind: &'static str, name: String },
    /// A required list is empty.
    Missing(&'static str),
    /// A page-table frame lies outside the memory the controllers cover.
    FrameOutOfRange { field: String, pfn: u64, first: u64, end: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "failed to parse topology: {}", msg),
            ConfigError::NotPowerOfTwo { field, value } => {
                write!(f, "{} must be a power of two (got {})", field, value)
            }
            ConfigError::ZeroCapacity { field } => write!(f, "{} must be greater than zero", field),
            ConfigError::BadGeometry { cache, reason } => {
                write!(f, "cache '{}' has invalid geometry: {}", cache, reason)
            }
            ConfigError::OverlappingRanges { first, second } => write!(
                f,
                "memory controllers '{}' and '{}' have overlapping ranges",
                first, second
            ),
            ConfigError::GappedRanges {
                first,
                second,
                gap_start,
                gap_end,
            } => write!(
                f,
                "gap {:#x}..{:#x} between memory controllers '{}' and '{}'",
                gap_start, gap_end, first, second
            ),
            ConfigError::UnknownCacheLevel { port, level } => {
                write!(f, "port '{}' references unknown cache level '{}'", port, level)
            }
            ConfigError::RepeatedCacheLevel { port, level } => {
                write!(f, "port '{}' lists cache level '{}' more than once", port, level)
            }
            ConfigError::DuplicateName { kind, name } => {
                write!(f, "duplicate {} name '{}'", kind, name)
            }
            ConfigError::Missing(what) => write!(f, "topology defines no {}", what),
            ConfigError::FrameOutOfRange {
                field,
                pfn,
                first,
                end,
            } => write!(
                f,
                "{} frame {:#x} is outside physical memory (frames {:#x}..{:#x})",
                field, pfn, first, end
            ),
        }
    }
}

impl Error for ConfigError {}

/// A fatal simulation failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// The topology was rejected at construction.
    Config(ConfigError),
    /// A translated address falls outside every controller's range.
    Routing { addr: u64, request_id: u64 },
    /// A request named a port index the topology does not define.
    UnknownPort { port: usize, request_id: u64 },
    /// The run was already aborted by an earlier fatal error.
    Halted,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(e) => write!(f, "configuration error: {}", e),
            SimError::Routing { addr, request_id } => write!(
                f,
                "request {} addresses {:#x}, which no memory controller owns",
                request_id, addr
            ),
            SimError::UnknownPort { port, request_id } => {
                write!(f, "request {} targets unknown port {}", request_id, port)
            }
            SimError::Halted => f.write_str("simulation halted by an earlier fatal error"),
        }
    }
}

impl Error for SimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SimError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError::Config(e)
    }
}
