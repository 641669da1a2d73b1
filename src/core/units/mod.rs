/// Set-associative caches and their replacement policies.
pub mod cache;

/// TLB, page-table backings and the translation unit.
pub mod mmu;
