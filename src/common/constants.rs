//! Simulator-wide constants.

/// Page shift used when the topology does not override the page size (4 KiB).
pub const DEFAULT_PAGE_SHIFT: u32 = 12;

/// Size of a request header crossing the interconnect, in bytes.
///
/// Read requests carry only the header; responses and writebacks carry a
/// full cache line.
pub const REQUEST_HEADER_BYTES: usize = 8;

/// Line size assumed for a port with no cache levels.
pub const UNCACHED_LINE_BYTES: usize = 64;
