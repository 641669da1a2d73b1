//! Integration tests for common utilities module.

use memhier_sim::common::*;

/// Tests virtual address creation.
#[test]
fn test_virt_addr_creation() {
    let addr = VirtAddr::new(0x8000_0000);
    assert_eq!(addr.val(), 0x8000_0000);
}

/// Tests virtual page number and page offset extraction.
#[test]
fn test_virt_addr_page_split() {
    let addr = VirtAddr::new(0x8000_1234);
    assert_eq!(addr.vpn(DEFAULT_PAGE_SHIFT), 0x8_0001);
    assert_eq!(addr.page_offset(DEFAULT_PAGE_SHIFT), 0x234);

    let addr2 = VirtAddr::new(0xFFFF_FFFF);
    assert_eq!(addr2.page_offset(DEFAULT_PAGE_SHIFT), 0xFFF);
    assert_eq!(addr2.page_offset(16), 0xFFFF);
}

/// Tests physical address construction from a frame number.
#[test]
fn test_phys_addr_from_frame() {
    let addr = PhysAddr::from_frame(0x42, 0x123, DEFAULT_PAGE_SHIFT);
    assert_eq!(addr.val(), 0x42_123);
}

/// Tests line alignment of physical addresses.
#[test]
fn test_phys_addr_line_base() {
    let addr = PhysAddr::new(0x1000_007F);
    assert_eq!(addr.line_base(64), 0x1000_0040);
    assert_eq!(addr.line_base(128), 0x1000_0000);
}

/// Tests address display formatting.
#[test]
fn test_addr_display() {
    assert_eq!(VirtAddr::new(0x1000).to_string(), "0x1000");
    assert_eq!(PhysAddr::new(0xdead).to_string(), "0xdead");
}

/// Tests access type classification.
#[test]
fn test_access_type_is_write() {
    assert!(AccessType::Write.is_write());
    assert!(!AccessType::Read.is_write());
    assert!(!AccessType::Fetch.is_write());
}

/// Tests parsing of trace mnemonics.
#[test]
fn test_access_type_mnemonics() {
    assert_eq!(AccessType::from_mnemonic("R"), Some(AccessType::Read));
    assert_eq!(AccessType::from_mnemonic("l"), Some(AccessType::Read));
    assert_eq!(AccessType::from_mnemonic("W"), Some(AccessType::Write));
    assert_eq!(AccessType::from_mnemonic("s"), Some(AccessType::Write));
    assert_eq!(AccessType::from_mnemonic("F"), Some(AccessType::Fetch));
    assert_eq!(AccessType::from_mnemonic("i"), Some(AccessType::Fetch));
    assert_eq!(AccessType::from_mnemonic("X"), None);
    assert_eq!(AccessType::from_mnemonic("RW"), None);
}

/// Tests access type display names.
#[test]
fn test_access_type_display() {
    assert_eq!(AccessType::Read.to_string(), "load");
    assert_eq!(AccessType::Write.to_string(), "store");
    assert_eq!(AccessType::Fetch.to_string(), "fetch");
}

/// Tests that configuration errors name the offending field.
#[test]
fn test_config_error_display() {
    let err = ConfigError::NotPowerOfTwo {
        field: "cache.l1.sets".to_string(),
        value: 3,
    };
    assert_eq!(err.to_string(), "cache.l1.sets must be a power of two (got 3)");

    let err = ConfigError::GappedRanges {
        first: "a".to_string(),
        second: "b".to_string(),
        gap_start: 0x100,
        gap_end: 0x200,
    };
    assert!(err.to_string().contains("0x100..0x200"));

    let err = ConfigError::FrameOutOfRange {
        field: "page_table.frame_base".to_string(),
        pfn: 0x20,
        first: 0,
        end: 0x10,
    };
    assert_eq!(
        err.to_string(),
        "page_table.frame_base frame 0x20 is outside physical memory (frames 0x0..0x10)"
    );
}

/// Tests that simulation errors carry the request id and wrap config errors.
#[test]
fn test_sim_error_display() {
    let err = SimError::Routing {
        addr: 0x4000_0000,
        request_id: 7,
    };
    let msg = err.to_string();
    assert!(msg.contains("request 7"));
    assert!(msg.contains("0x40000000"));

    let wrapped: SimError = ConfigError::Missing("ports").into();
    assert_eq!(wrapped, SimError::Config(ConfigError::Missing("ports")));
    assert!(std::error::Error::source(&wrapped).is_some());
}
