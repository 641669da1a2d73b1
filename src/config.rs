//! Topology descriptor for the memory-hierarchy simulator.
//!
//! This module defines the configuration structures that describe the
//! simulated hierarchy. It provides:
//! 1. **Defaults:** Baseline hardware constants (TLB, caches, crossbar, DRAM).
//! 2. **Structures:** Sections for general settings, TLB, page-table backing,
//!    cache levels, CPU-side ports, the interconnect and memory controllers.
//! 3. **Validation:** A single pass that rejects malformed topologies before
//!    any component is built.
//!
//! Topologies are usually loaded from TOML; `Topology::default()` mirrors a
//! small timing-CPU system with split 32 KiB L1 caches and one 512 MiB DRAM
//! controller behind a crossbar.

use serde::Deserialize;
use std::collections::HashSet;

use crate::common::ConfigError;

/// Default configuration constants for the simulator.
///
/// These values define the baseline hierarchy when not explicitly
/// overridden in the TOML topology.
pub mod defaults {
    /// Page size in bytes (4 KiB).
    pub const PAGE_SIZE: u64 = 4096;

    /// Core clock frequency, used only to convert cycles to time in reports.
    pub const CLOCK_GHZ: f64 = 2.0;

    /// Number of TLB entries.
    pub const TLB_ENTRIES: usize = 128;

    /// Cycles to look up the TLB.
    pub const TLB_HIT_LATENCY: u64 = 1;

    /// Additional cycles for a page-table walk after a TLB miss.
    pub const WALK_LATENCY: u64 = 30;

    /// Additional cycles charged when the walk finds the page absent.
    pub const FAULT_LATENCY: u64 = 1000;

    /// Cache line size in bytes.
    pub const LINE_BYTES: usize = 64;

    /// Cache capacity in bytes (32 KiB).
    pub const CACHE_SIZE: usize = 32 * 1024;

    /// Cache associativity.
    pub const CACHE_WAYS: usize = 2;

    /// Tag array latency in cycles.
    pub const TAG_LATENCY: u64 = 2;

    /// Data array latency in cycles.
    pub const DATA_LATENCY: u64 = 2;

    /// Interconnect width in bytes (8 bytes = 64-bit crossbar).
    pub const BUS_WIDTH: u64 = 8;

    /// Fixed interconnect traversal latency in cycles.
    pub const BUS_LATENCY: u64 = 4;

    /// Grants each controller link can issue per cycle.
    pub const REQUESTS_PER_CYCLE: u32 = 1;

    /// Memory range owned by the default controller (512 MiB).
    pub const MEM_SIZE: u64 = 512 * 1024 * 1024;

    /// Fixed latency of the simple controller model.
    pub const SIMPLE_LATENCY: u64 = 100;

    /// CAS latency in core cycles.
    pub const T_CAS: u64 = 28;

    /// RAS latency in core cycles.
    pub const T_RAS: u64 = 28;

    /// Precharge latency in core cycles.
    pub const T_PRE: u64 = 28;

    /// DRAM row-buffer size in bytes.
    pub const ROW_BYTES: u64 = 2048;

    /// Outstanding requests a controller queue holds before backpressure.
    pub const QUEUE_CAPACITY: usize = 16;

    /// Extra cycles charged when a request finds the controller queue full.
    pub const BACKPRESSURE_LATENCY: u64 = 10;
}

/// Root of the topology descriptor.
///
/// Immutable once handed to the simulator; every component copies the
/// parameters it needs at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub tlb: TlbConfig,
    #[serde(default)]
    pub page_table: PageTableConfig,
    #[serde(default, rename = "cache")]
    pub caches: Vec<CacheConfig>,
    #[serde(rename = "port")]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub interconnect: InterconnectConfig,
    #[serde(rename = "controller")]
    pub controllers: Vec<ControllerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    #[serde(default = "default_clock_ghz")]
    pub clock_ghz: f64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
            clock_ghz: defaults::CLOCK_GHZ,
        }
    }
}

impl GeneralConfig {
    /// Returns log2 of the page size.
    pub fn page_shift(&self) -> u32 {
        self.page_size.trailing_zeros()
    }
}

/// Replacement policy used by caches and the TLB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ReplacementPolicy {
    #[default]
    Lru,
    Fifo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlbConfig {
    #[serde(default = "default_tlb_entries")]
    pub entries: usize,

    /// Associativity. Omitted means fully associative.
    #[serde(default)]
    pub ways: Option<usize>,

    #[serde(default)]
    pub policy: ReplacementPolicy,

    #[serde(default = "default_tlb_hit")]
    pub hit_latency: u64,

    #[serde(default = "default_walk")]
    pub walk_latency: u64,

    #[serde(default = "default_fault")]
    pub fault_latency: u64,
}

impl Default for TlbConfig {
    fn default() -> Self {
        Self {
            entries: defaults::TLB_ENTRIES,
            ways: None,
            policy: ReplacementPolicy::Lru,
            hit_latency: defaults::TLB_HIT_LATENCY,
            walk_latency: defaults::WALK_LATENCY,
            fault_latency: defaults::FAULT_LATENCY,
        }
    }
}

impl TlbConfig {
    /// Effective associativity.
    pub fn ways(&self) -> usize {
        self.ways.unwrap_or(self.entries)
    }

    /// Number of TLB sets.
    pub fn sets(&self) -> usize {
        let ways = self.ways();
        if ways == 0 {
            0
        } else {
            self.entries / ways
        }
    }
}

/// Backing model consulted on a TLB miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum PageTableKind {
    /// Every page is present; `pfn = vpn + frame_base`.
    Identity,
    /// Only the listed mappings are present.
    Explicit,
    /// Pages are absent until their first fault, then mapped to the next free frame.
    #[default]
    Demand,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageTableConfig {
    #[serde(default)]
    pub kind: PageTableKind,

    #[serde(default)]
    pub frame_base: u64,

    /// `[vpn, pfn]` pairs for the explicit backing.
    #[serde(default)]
    pub mappings: Vec<[u64; 2]>,
}

/// What a cache level holds. Descriptive only; it does not change behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum CacheKind {
    Instruction,
    Data,
    #[default]
    Unified,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub name: String,

    #[serde(default)]
    pub kind: CacheKind,

    #[serde(default = "d_c_size")]
    pub size_bytes: usize,

    #[serde(default = "d_c_line")]
    pub line_bytes: usize,

    #[serde(default = "d_c_ways")]
    pub ways: usize,

    #[serde(default)]
    pub policy: ReplacementPolicy,

    #[serde(default = "d_c_tag")]
    pub tag_latency: u64,

    #[serde(default = "d_c_data")]
    pub data_latency: u64,

    /// Cycles to install a returned line. Defaults to the data latency.
    #[serde(default)]
    pub fill_latency: Option<u64>,
}

impl CacheConfig {
    /// Builds a cache description with default geometry and latencies.
    pub fn named(name: &str, kind: CacheKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            size_bytes: defaults::CACHE_SIZE,
            line_bytes: defaults::LINE_BYTES,
            ways: defaults::CACHE_WAYS,
            policy: ReplacementPolicy::Lru,
            tag_latency: defaults::TAG_LATENCY,
            data_latency: defaults::DATA_LATENCY,
            fill_latency: None,
        }
    }

    /// Number of sets implied by size, line size and associativity.
    pub fn sets(&self) -> usize {
        let per_set = self.line_bytes * self.ways;
        if per_set == 0 {
            0
        } else {
            self.size_bytes / per_set
        }
    }

    /// Effective fill latency.
    pub fn fill_latency(&self) -> u64 {
        self.fill_latency.unwrap_or(self.data_latency)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    pub name: String,

    /// Cache levels from closest to the CPU outwards.
    #[serde(default)]
    pub levels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterconnectConfig {
    #[serde(default = "default_bus_width")]
    pub width_bytes: u64,

    #[serde(default = "default_bus_latency")]
    pub latency: u64,

    #[serde(default = "default_requests_per_cycle")]
    pub requests_per_cycle: u32,
}

impl Default for InterconnectConfig {
    fn default() -> Self {
        Self {
            width_bytes: defaults::BUS_WIDTH,
            latency: defaults::BUS_LATENCY,
            requests_per_cycle: defaults::REQUESTS_PER_CYCLE,
        }
    }
}

/// Latency model of a memory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ControllerModel {
    /// Fixed access latency.
    Simple,
    /// Open-row DRAM timing.
    #[default]
    Dram,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    pub name: String,

    #[serde(default)]
    pub base: u64,

    #[serde(default = "default_mem_size")]
    pub size: u64,

    #[serde(default)]
    pub model: ControllerModel,

    #[serde(default = "default_simple_latency")]
    pub latency: u64,

    #[serde(default = "default_t_cas")]
    pub t_cas: u64,

    #[serde(default = "default_t_ras")]
    pub t_ras: u64,

    #[serde(default = "default_t_pre")]
    pub t_pre: u64,

    #[serde(default = "default_row_bytes")]
    pub row_bytes: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_backpressure")]
    pub backpressure_latency: u64,
}

impl ControllerConfig {
    /// Builds a controller description with default timing over `[base, base + size)`.
    pub fn named(name: &str, base: u64, size: u64) -> Self {
        Self {
            name: name.to_string(),
            base,
            size,
            model: ControllerModel::Dram,
            latency: defaults::SIMPLE_LATENCY,
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            t_pre: defaults::T_PRE,
            row_bytes: defaults::ROW_BYTES,
            queue_capacity: defaults::QUEUE_CAPACITY,
            backpressure_latency: defaults::BACKPRESSURE_LATENCY,
        }
    }

    /// Exclusive end of the owned range.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

fn default_page_size() -> u64 {
    defaults::PAGE_SIZE
}

fn default_clock_ghz() -> f64 {
    defaults::CLOCK_GHZ
}

fn default_tlb_entries() -> usize {
    defaults::TLB_ENTRIES
}

fn default_tlb_hit() -> u64 {
    defaults::TLB_HIT_LATENCY
}

fn default_walk() -> u64 {
    defaults::WALK_LATENCY
}

fn default_fault() -> u64 {
    defaults::FAULT_LATENCY
}

fn d_c_size() -> usize {
    defaults::CACHE_SIZE
}

fn d_c_line() -> usize {
    defaults::LINE_BYTES
}

fn d_c_ways() -> usize {
    defaults::CACHE_WAYS
}

fn d_c_tag() -> u64 {
    defaults::TAG_LATENCY
}

fn d_c_data() -> u64 {
    defaults::DATA_LATENCY
}

fn default_bus_width() -> u64 {
    defaults::BUS_WIDTH
}

fn default_bus_latency() -> u64 {
    defaults::BUS_LATENCY
}

fn default_requests_per_cycle() -> u32 {
    defaults::REQUESTS_PER_CYCLE
}

fn default_mem_size() -> u64 {
    defaults::MEM_SIZE
}

fn default_simple_latency() -> u64 {
    defaults::SIMPLE_LATENCY
}

fn default_t_cas() -> u64 {
    defaults::T_CAS
}

fn default_t_ras() -> u64 {
    defaults::T_RAS
}

fn default_t_pre() -> u64 {
    defaults::T_PRE
}

fn default_row_bytes() -> u64 {
    defaults::ROW_BYTES
}

fn default_queue_capacity() -> usize {
    defaults::QUEUE_CAPACITY
}

fn default_backpressure() -> u64 {
    defaults::BACKPRESSURE_LATENCY
}

impl Default for Topology {
    /// Split L1 instruction/data caches on two ports, one DRAM controller.
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            tlb: TlbConfig::default(),
            page_table: PageTableConfig::default(),
            caches: vec![
                CacheConfig::named("l1i", CacheKind::Instruction),
                CacheConfig::named("l1d", CacheKind::Data),
            ],
            ports: vec![
                PortConfig {
                    name: "icache_port".to_string(),
                    levels: vec!["l1i".to_string()],
                },
                PortConfig {
                    name: "dcache_port".to_string(),
                    levels: vec!["l1d".to_string()],
                },
            ],
            interconnect: InterconnectConfig::default(),
            controllers: vec![ControllerConfig::named("mem_ctrl", 0, defaults::MEM_SIZE)],
        }
    }
}

impl Topology {
    /// Parses and validates a TOML topology.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let topology: Topology =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        topology.validate()?;
        Ok(topology)
    }

    /// Looks up a cache description by name.
    pub fn cache(&self, name: &str) -> Option<&CacheConfig> {
        self.caches.iter().find(|c| c.name == name)
    }

    /// Rejects malformed topologies.
    ///
    /// Runs once before any component is constructed; nothing downstream
    /// re-checks these properties.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_pow2("general.page_size", self.general.page_size)?;

        self.validate_tlb()?;
        self.validate_caches()?;
        self.validate_ports()?;

        if self.interconnect.width_bytes == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "interconnect.width_bytes".to_string(),
            });
        }
        if self.interconnect.requests_per_cycle == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "interconnect.requests_per_cycle".to_string(),
            });
        }

        self.validate_controllers()?;
        self.validate_page_table()
    }

    /// Physical frames covered by the controllers, as `[first, end)`.
    ///
    /// Only meaningful once the controller ranges are known to be
    /// contiguous.
    pub fn frame_range(&self) -> (u64, u64) {
        let page = self.general.page_size.max(1);
        let base = self.controllers.iter().map(|c| c.base).min().unwrap_or(0);
        let top = self.controllers.iter().map(|c| c.end()).max().unwrap_or(0);
        ((base + page - 1) / page, top / page)
    }

    fn validate_tlb(&self) -> Result<(), ConfigError> {
        let tlb = &self.tlb;
        if tlb.entries == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "tlb.entries".to_string(),
            });
        }
        if tlb.ways() == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "tlb.ways".to_string(),
            });
        }
        if tlb.entries % tlb.ways() != 0 {
            return Err(ConfigError::BadGeometry {
                cache: "tlb".to_string(),
                reason: format!("{} entries do not divide into {} ways", tlb.entries, tlb.ways()),
            });
        }
        require_pow2("tlb sets", tlb.sets() as u64)
    }

    fn validate_caches(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for cache in &self.caches {
            if !names.insert(cache.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "cache",
                    name: cache.name.clone(),
                });
            }
            for (field, value) in [
                ("size_bytes", cache.size_bytes),
                ("line_bytes", cache.line_bytes),
                ("ways", cache.ways),
            ] {
                if value == 0 {
                    return Err(ConfigError::ZeroCapacity {
                        field: format!("cache.{}.{}", cache.name, field),
                    });
                }
            }
            require_pow2(&format!("cache.{}.line_bytes", cache.name), cache.line_bytes as u64)?;
            if cache.size_bytes % (cache.line_bytes * cache.ways) != 0 || cache.sets() == 0 {
                return Err(ConfigError::BadGeometry {
                    cache: cache.name.clone(),
                    reason: format!(
                        "{} bytes cannot hold whole sets of {} x {}-byte lines",
                        cache.size_bytes, cache.ways, cache.line_bytes
                    ),
                });
            }
            require_pow2(&format!("cache.{}.sets", cache.name), cache.sets() as u64)?;
        }
        Ok(())
    }

    fn validate_ports(&self) -> Result<(), ConfigError> {
        if self.ports.is_empty() {
            return Err(ConfigError::Missing("ports"));
        }
        let mut names = HashSet::new();
        for port in &self.ports {
            if !names.insert(port.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "port",
                    name: port.name.clone(),
                });
            }
            let mut seen = HashSet::new();
            for level in &port.levels {
                if self.cache(level).is_none() {
                    return Err(ConfigError::UnknownCacheLevel {
                        port: port.name.clone(),
                        level: level.clone(),
                    });
                }
                if !seen.insert(level.as_str()) {
                    return Err(ConfigError::RepeatedCacheLevel {
                        port: port.name.clone(),
                        level: level.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_controllers(&self) -> Result<(), ConfigError> {
        if self.controllers.is_empty() {
            return Err(ConfigError::Missing("memory controllers"));
        }
        let mut names = HashSet::new();
        for ctrl in &self.controllers {
            if !names.insert(ctrl.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "controller",
                    name: ctrl.name.clone(),
                });
            }
            if ctrl.size == 0 {
                return Err(ConfigError::ZeroCapacity {
                    field: format!("controller.{}.size", ctrl.name),
                });
            }
            if ctrl.queue_capacity == 0 {
                return Err(ConfigError::ZeroCapacity {
                    field: format!("controller.{}.queue_capacity", ctrl.name),
                });
            }
            if ctrl.model == ControllerModel::Dram {
                require_pow2(&format!("controller.{}.row_bytes", ctrl.name), ctrl.row_bytes)?;
            }
        }

        let mut sorted: Vec<&ControllerConfig> = self.controllers.iter().collect();
        sorted.sort_by_key(|c| c.base);
        for pair in sorted.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if hi.base < lo.end() {
                return Err(ConfigError::OverlappingRanges {
                    first: lo.name.clone(),
                    second: hi.name.clone(),
                });
            }
            if hi.base > lo.end() {
                return Err(ConfigError::GappedRanges {
                    first: lo.name.clone(),
                    second: hi.name.clone(),
                    gap_start: lo.end(),
                    gap_end: hi.base,
                });
            }
        }
        Ok(())
    }

    fn validate_page_table(&self) -> Result<(), ConfigError> {
        let (first, end) = self.frame_range();
        let check = |field: &str, pfn: u64| {
            if pfn >= first && pfn < end {
                Ok(())
            } else {
                Err(ConfigError::FrameOutOfRange {
                    field: field.to_string(),
                    pfn,
                    first,
                    end,
                })
            }
        };

        let table = &self.page_table;
        match table.kind {
            PageTableKind::Identity | PageTableKind::Demand => {
                check("page_table.frame_base", table.frame_base)
            }
            PageTableKind::Explicit => table
                .mappings
                .iter()
                .try_for_each(|&[_, pfn]| check("page_table.mappings", pfn)),
        }
    }
}

fn require_pow2(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroCapacity {
            field: field.to_string(),
        });
    }
    if !value.is_power_of_two() {
        return Err(ConfigError::NotPowerOfTwo {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}
