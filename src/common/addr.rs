//! Address Newtypes.
//!
//! Virtual and physical addresses are kept apart at the type level so a
//! translated address can never be confused with the address the driver
//! issued. Both are `Copy` and immutable once created.

use std::fmt;

/// A virtual address as issued by the external driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Creates a new virtual address.
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw address value.
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns the virtual page number for the given page shift.
    pub const fn vpn(&self, page_shift: u32) -> u64 {
        self.0 >> page_shift
    }

    /// Returns the byte offset within the page for the given page shift.
    pub const fn page_offset(&self, page_shift: u32) -> u64 {
        self.0 & ((1u64 << page_shift) - 1)
    }
}

/// A physical address produced by address translation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Creates a new physical address.
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Builds a physical address from a frame number and a page offset.
    pub const fn from_frame(pfn: u64, offset: u64, page_shift: u32) -> Self {
        Self((pfn << page_shift) | offset)
    }

    /// Returns the raw address value.
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns the address aligned down to a line of `line_bytes`.
    pub const fn line_base(&self, line_bytes: u64) -> u64 {
        self.0 & !(line_bytes - 1)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
