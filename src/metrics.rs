use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonically increasing counter
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Gauge that can increase or decrease
pub(crate) struct Gauge(AtomicI64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: i64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    pub fn sub(&self, value: i64) {
        self.0.fetch_sub(value, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-segment statistics.
///
/// Each segment shares one of these with the cache through an `Arc`, so
/// aggregated statistics reads never take a segment lock. All updates use
/// relaxed ordering; reporting tolerates being a step behind a concurrent
/// writer.
pub(crate) struct SegmentStats {
    /// Successful non-peek gets
    pub hit_count: Counter,
    /// Probes that found nothing (absent or expired)
    pub miss_count: Counter,
    /// Live entries reachable through the slot index
    pub entry_count: Gauge,
    /// Entries on the arena, tombstones included, until vacuumed
    pub total_count: Gauge,
    /// Sum of on-arena entries' access times; drives the cold test
    pub total_time: Gauge,
    /// Eviction actions: head drops and tail relocations
    pub total_evacuate: Counter,
    /// Entries removed because their TTL lapsed
    pub total_expired: Counter,
    /// In-place value overwrites
    pub overwrites: Counter,
    /// Successful touch operations
    pub touched: Counter,
}

impl SegmentStats {
    pub fn new() -> Self {
        Self {
            hit_count: Counter::new(),
            miss_count: Counter::new(),
            entry_count: Gauge::new(),
            total_count: Gauge::new(),
            total_time: Gauge::new(),
            total_evacuate: Counter::new(),
            total_expired: Counter::new(),
            overwrites: Counter::new(),
            touched: Counter::new(),
        }
    }
}

impl Default for SegmentStats {
    fn default() -> Self {
        Self::new()
    }
}
