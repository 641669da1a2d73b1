//! Simulation statistics collection and reporting.
//!
//! A [`StatsCollector`] is owned by one simulation run and handed by `&mut`
//! to each component operation. Counters only ever grow between `start()`
//! and the end of the run. Readers never see the live counters: they take a
//! [`StatsSnapshot`], a frozen flat map of counter name to value plus the
//! bucketed latency histogram, and compute every rate from that one snapshot.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::common::AccessType;
use crate::core::units::mmu::TranslationOutcome;

/// Number of power-of-two latency buckets.
pub const LATENCY_BUCKETS: usize = 16;

/// Power-of-two latency histogram.
///
/// Bucket 0 holds latencies 0 and 1; bucket `i` holds `[2^i, 2^(i+1))`;
/// the last bucket is open-ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyHistogram {
    pub buckets: [u64; LATENCY_BUCKETS],
}

impl LatencyHistogram {
    pub fn record(&mut self, latency: u64) {
        let idx = Self::bucket_of(latency);
        self.buckets[idx] = self.buckets[idx].saturating_add(1);
    }

    pub fn bucket_of(latency: u64) -> usize {
        if latency < 2 {
            0
        } else {
            ((63 - latency.leading_zeros()) as usize).min(LATENCY_BUCKETS - 1)
        }
    }

    /// Inclusive bounds of bucket `idx`.
    pub fn bounds(idx: usize) -> (u64, u64) {
        let lo = if idx == 0 { 0 } else { 1u64 << idx };
        let hi = if idx + 1 >= LATENCY_BUCKETS {
            u64::MAX
        } else {
            (1u64 << (idx + 1)) - 1
        };
        (lo, hi)
    }

    pub fn count(&self) -> u64 {
        self.buckets.iter().sum()
    }

    fn to_buckets(self) -> Vec<HistogramBucket> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let (lo, hi) = Self::bounds(i);
                HistogramBucket { lo, hi, count }
            })
            .collect()
    }
}

/// One bucket of a serialized histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistogramBucket {
    pub lo: u64,
    pub hi: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Default)]
struct CacheCounters {
    name: String,
    lookups: u64,
    hits: u64,
    misses: u64,
    fills: u64,
    writebacks: u64,
}

#[derive(Debug, Clone, Default)]
struct ControllerCounters {
    name: String,
    requests: u64,
    writebacks: u64,
    queue_cycles: u64,
    backpressure_stalls: u64,
}

/// Run-scoped statistics aggregator.
#[derive(Debug, Clone, Default)]
pub struct StatsCollector {
    tlb_hits: u64,
    tlb_misses: u64,
    page_faults: u64,

    caches: Vec<CacheCounters>,
    controllers: Vec<ControllerCounters>,

    xbar_requests: u64,
    xbar_responses: u64,
    xbar_queue_cycles: u64,

    requests: u64,
    loads: u64,
    stores: u64,
    fetches: u64,
    latency_sum: u64,
    latency: LatencyHistogram,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache level and returns its counter slot.
    pub fn register_cache(&mut self, name: &str) -> usize {
        self.caches.push(CacheCounters {
            name: name.to_string(),
            ..CacheCounters::default()
        });
        self.caches.len() - 1
    }

    /// Registers a memory controller and returns its counter slot.
    pub fn register_controller(&mut self, name: &str) -> usize {
        self.controllers.push(ControllerCounters {
            name: name.to_string(),
            ..ControllerCounters::default()
        });
        self.controllers.len() - 1
    }

    /// Zeroes every counter, keeping registrations.
    pub fn start(&mut self) {
        let caches = self
            .caches
            .iter()
            .map(|c| CacheCounters {
                name: c.name.clone(),
                ..CacheCounters::default()
            })
            .collect();
        let controllers = self
            .controllers
            .iter()
            .map(|c| ControllerCounters {
                name: c.name.clone(),
                ..ControllerCounters::default()
            })
            .collect();
        *self = Self {
            caches,
            controllers,
            ..Self::default()
        };
    }

    pub fn record_translation(&mut self, outcome: TranslationOutcome) {
        let counter = match outcome {
            TranslationOutcome::TlbHit => &mut self.tlb_hits,
            TranslationOutcome::WalkHit => &mut self.tlb_misses,
            TranslationOutcome::PageFault => &mut self.page_faults,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn record_cache_lookup(&mut self, id: usize, hit: bool) {
        let c = &mut self.caches[id];
        c.lookups = c.lookups.saturating_add(1);
        if hit {
            c.hits = c.hits.saturating_add(1);
        } else {
            c.misses = c.misses.saturating_add(1);
        }
    }

    pub fn record_cache_fill(&mut self, id: usize) {
        let c = &mut self.caches[id];
        c.fills = c.fills.saturating_add(1);
    }

    /// A dirty line left cache `id`.
    pub fn record_cache_writeback(&mut self, id: usize) {
        let c = &mut self.caches[id];
        c.writebacks = c.writebacks.saturating_add(1);
    }

    pub fn record_controller(
        &mut self,
        id: usize,
        queue_delay: u64,
        backpressured: bool,
        writeback: bool,
    ) {
        let c = &mut self.controllers[id];
        if writeback {
            c.writebacks = c.writebacks.saturating_add(1);
        } else {
            c.requests = c.requests.saturating_add(1);
        }
        c.queue_cycles = c.queue_cycles.saturating_add(queue_delay);
        if backpressured {
            c.backpressure_stalls = c.backpressure_stalls.saturating_add(1);
        }
    }

    pub fn record_xbar_request(&mut self, queue_delay: u64) {
        self.xbar_requests = self.xbar_requests.saturating_add(1);
        self.xbar_queue_cycles = self.xbar_queue_cycles.saturating_add(queue_delay);
    }

    pub fn record_xbar_response(&mut self) {
        self.xbar_responses = self.xbar_responses.saturating_add(1);
    }

    /// Records a retired request and its end-to-end latency.
    pub fn record_retirement(&mut self, access: AccessType, latency: u64) {
        self.requests = self.requests.saturating_add(1);
        let kind = match access {
            AccessType::Read => &mut self.loads,
            AccessType::Write => &mut self.stores,
            AccessType::Fetch => &mut self.fetches,
        };
        *kind = kind.saturating_add(1);
        self.latency_sum = self.latency_sum.saturating_add(latency);
        self.latency.record(latency);
    }

    /// Freezes the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut counters = BTreeMap::new();
        let mut put = |name: String, value: u64| {
            counters.insert(name, value);
        };

        put("tlb.hits".into(), self.tlb_hits);
        put("tlb.misses".into(), self.tlb_misses);
        put("tlb.page_faults".into(), self.page_faults);
        put(
            "tlb.translations".into(),
            self.tlb_hits + self.tlb_misses + self.page_faults,
        );

        for c in &self.caches {
            put(format!("cache.{}.lookups", c.name), c.lookups);
            put(format!("cache.{}.hits", c.name), c.hits);
            put(format!("cache.{}.misses", c.name), c.misses);
            put(format!("cache.{}.fills", c.name), c.fills);
            put(format!("cache.{}.writebacks", c.name), c.writebacks);
        }

        for c in &self.controllers {
            put(format!("mem.{}.requests", c.name), c.requests);
            put(format!("mem.{}.writebacks", c.name), c.writebacks);
            put(format!("mem.{}.queue_cycles", c.name), c.queue_cycles);
            put(
                format!("mem.{}.backpressure_stalls", c.name),
                c.backpressure_stalls,
            );
        }

        put("xbar.requests".into(), self.xbar_requests);
        put("xbar.responses".into(), self.xbar_responses);
        put("xbar.queue_cycles".into(), self.xbar_queue_cycles);

        put("requests.total".into(), self.requests);
        put("requests.loads".into(), self.loads);
        put("requests.stores".into(), self.stores);
        put("requests.fetches".into(), self.fetches);
        put("requests.latency_sum".into(), self.latency_sum);

        let mut histograms = BTreeMap::new();
        histograms.insert("requests.latency".to_string(), self.latency.to_buckets());

        StatsSnapshot {
            counters,
            histograms,
            cache_levels: self.caches.iter().map(|c| c.name.clone()).collect(),
            controllers: self.controllers.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

/// Immutable view of the statistics at one quiescent point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, Vec<HistogramBucket>>,
    #[serde(skip)]
    cache_levels: Vec<String>,
    #[serde(skip)]
    controllers: Vec<String>,
}

impl StatsSnapshot {
    /// Value of a counter; unknown names read as zero.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// `numerator / denominator`, both read from this snapshot.
    pub fn rate(&self, numerator: &str, denominator: &str) -> f64 {
        let den = self.counter(denominator);
        if den == 0 {
            0.0
        } else {
            self.counter(numerator) as f64 / den as f64
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.counter("requests.total")
    }

    pub fn tlb_miss_rate(&self) -> f64 {
        self.rate("tlb.misses", "requests.total")
    }

    pub fn page_fault_rate(&self) -> f64 {
        self.rate("tlb.page_faults", "requests.total")
    }

    pub fn mean_latency(&self) -> f64 {
        self.rate("requests.latency_sum", "requests.total")
    }

    /// Upper bound of the bucket containing the `p`-th percentile latency.
    pub fn latency_percentile(&self, p: f64) -> Option<u64> {
        let buckets = self.histograms.get("requests.latency")?;
        let total: u64 = buckets.iter().map(|b| b.count).sum();
        if total == 0 {
            return None;
        }
        let target = ((p.clamp(0.0, 100.0) / 100.0) * total as f64).ceil().max(1.0) as u64;
        let mut seen = 0;
        for bucket in buckets {
            seen += bucket.count;
            if seen >= target {
                return Some(bucket.hi);
            }
        }
        buckets.last().map(|b| b.hi)
    }

    /// Names of the cache levels, in construction order.
    pub fn cache_levels(&self) -> &[String] {
        &self.cache_levels
    }

    /// Names of the memory controllers, in construction order.
    pub fn controllers(&self) -> &[String] {
        &self.controllers
    }

    /// Serializes the counter and histogram maps as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Prints a formatted summary.
    ///
    /// `clock_ghz` converts cycle counts to simulated time.
    pub fn print(&self, clock_ghz: f64) {
        let total = self.total_requests();
        let tlb_misses = self.counter("tlb.misses");
        let faults = self.counter("tlb.page_faults");
        let mean = self.mean_latency();

        println!("\n==========================================================");
        println!("MEMORY HIERARCHY SIMULATION STATISTICS");
        println!("==========================================================");
        println!("sim_requests             {}", total);
        println!(
            "  loads/stores/fetches   {} / {} / {}",
            self.counter("requests.loads"),
            self.counter("requests.stores"),
            self.counter("requests.fetches")
        );
        println!("----------------------------------------------------------");
        println!("TRANSLATION");
        println!("  tlb.hits               {}", self.counter("tlb.hits"));
        println!("  tlb.misses             {}", tlb_misses);
        println!("  tlb.page_faults        {}", faults);
        println!(
            "  tlb.miss_rate          {:.2}% ({} / {})",
            self.tlb_miss_rate() * 100.0,
            tlb_misses,
            total
        );
        println!(
            "  page_fault_rate        {:.2}% ({} / {})",
            self.page_fault_rate() * 100.0,
            faults,
            total
        );
        println!("----------------------------------------------------------");
        println!("MEMORY HIERARCHY");
        for name in &self.cache_levels {
            let hits = self.counter(&format!("cache.{}.hits", name));
            let lookups = self.counter(&format!("cache.{}.lookups", name));
            let miss_rate = if lookups > 0 {
                100.0 * self.counter(&format!("cache.{}.misses", name)) as f64 / lookups as f64
            } else {
                0.0
            };
            println!(
                "  {:<6} accesses: {:<10} | hits: {:<10} | miss_rate: {:.2}% | writebacks: {}",
                name,
                lookups,
                hits,
                miss_rate,
                self.counter(&format!("cache.{}.writebacks", name))
            );
        }
        for name in &self.controllers {
            println!(
                "  {:<10} requests: {:<8} | writebacks: {:<8} | queue_cycles: {:<8} | stalls: {}",
                name,
                self.counter(&format!("mem.{}.requests", name)),
                self.counter(&format!("mem.{}.writebacks", name)),
                self.counter(&format!("mem.{}.queue_cycles", name)),
                self.counter(&format!("mem.{}.backpressure_stalls", name))
            );
        }
        println!(
            "  xbar       requests: {:<8} | queue_cycles: {}",
            self.counter("xbar.requests"),
            self.counter("xbar.queue_cycles")
        );
        println!("----------------------------------------------------------");
        println!("LATENCY");
        println!("  avg_latency            {:.2} cycles", mean);
        if clock_ghz > 0.0 {
            println!("  avg_latency_time       {:.2} ns", mean / clock_ghz);
        }
        if let Some(p50) = self.latency_percentile(50.0) {
            println!("  p50_bucket_max         {} cycles", p50);
        }
        if let Some(p99) = self.latency_percentile(99.0) {
            println!("  p99_bucket_max         {} cycles", p99);
        }
        println!("==========================================================");
    }
}
