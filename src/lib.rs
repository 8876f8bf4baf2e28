mod entry;
mod iterator;
mod metrics;
mod ringbuf;
mod segment;
mod timer;


pub use iterator::{CacheIterator, Entry};
pub use timer::{MockTimer, Timer, UnixTimer};

use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;

use metrics::SegmentStats;
use segment::Segment;

/// Number of independent segments a cache is partitioned into.
pub const SEGMENT_COUNT: usize = 256;

/// Floor on a single segment's arena. A cache built with a tiny capacity
/// still gets usable segments, so the effective size may exceed the
/// request.
const MIN_SEGMENT_SIZE: usize = 2048;

/// Error type for cache operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Key absent or expired
    NotFound,
    /// Key or entry size exceeds the per-segment ceiling; never retryable
    LargeEntry,
    /// Eviction budget exhausted before room was available; retryable,
    /// but usually means the working set exceeds the configured capacity
    NoSpace,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => f.write_str("entry not found"),
            Error::LargeEntry => f.write_str("entry is larger than a quarter of a segment"),
            Error::NoSpace => f.write_str("could not make room for entry"),
        }
    }
}

impl std::error::Error for Error {}

/// A fixed-capacity, in-process byte cache.
///
/// All entries live in 256 ring-buffered byte arenas allocated once at
/// construction; the cache never grows past its configured budget. When
/// an arena fills, new writes evict the oldest entries, giving recently
/// accessed ones a second chance (CLOCK-style). Every operation routes by
/// key hash to one segment and holds only that segment's mutex, so the
/// cache is linearizable per key and lock contention is spread 256 ways.
pub struct Cache {
    segments: Vec<Mutex<Segment>>,
    stats: Vec<Arc<SegmentStats>>,
    hash_builder: RandomState,
    segment_size: usize,
}

/// Builder for constructing a Cache with custom configuration
pub struct CacheBuilder {
    capacity: usize,
    timer: Arc<dyn Timer>,
}

impl CacheBuilder {
    /// Create a new CacheBuilder with default settings
    pub fn new() -> Self {
        Self {
            capacity: 64 * 1024 * 1024, // 64MB
            timer: Arc::new(UnixTimer),
        }
    }

    /// Set the total cache capacity in bytes
    ///
    /// Default is 64MB. The capacity is split evenly across 256 segments,
    /// each rounded up to a power of two and floored at 2KiB, so the
    /// effective capacity can exceed a small request.
    pub fn capacity(mut self, bytes: usize) -> Self {
        self.capacity = bytes;
        self
    }

    /// Set the time source used for access times and TTL checks
    ///
    /// Default is the coarse system clock. Tests inject a [`MockTimer`]
    /// to drive expiry deterministically.
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    /// Build the Cache with the configured settings
    pub fn build(self) -> Cache {
        let segment_size = (self.capacity / SEGMENT_COUNT)
            .next_power_of_two()
            .max(MIN_SEGMENT_SIZE);

        let mut segments = Vec::with_capacity(SEGMENT_COUNT);
        let mut stats = Vec::with_capacity(SEGMENT_COUNT);
        for _ in 0..SEGMENT_COUNT {
            let segment = Segment::new(segment_size, self.timer.clone());
            stats.push(segment.stats().clone());
            segments.push(Mutex::new(segment));
        }

        Cache {
            segments,
            stats,
            hash_builder: Cache::hash_builder(),
            segment_size,
        }
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create a cache holding at most `size_bytes` of entry data.
    ///
    /// For custom configuration, use CacheBuilder:
    /// ```
    /// use ringcache::CacheBuilder;
    ///
    /// let cache = CacheBuilder::new()
    ///     .capacity(256 * 1024 * 1024) // 256MB
    ///     .build();
    /// ```
    pub fn new(size_bytes: usize) -> Self {
        CacheBuilder::new().capacity(size_bytes).build()
    }

    // Fixed seeds in tests for deterministic behavior, random seeds in production
    #[cfg(test)]
    fn hash_builder() -> RandomState {
        RandomState::with_seeds(
            0xbb8c484891ec6c86,
            0x0522a25ae9c769f9,
            0xeed2797b9571bc75,
            0x4feb29c1fbbd59d0,
        )
    }

    #[cfg(not(test))]
    fn hash_builder() -> RandomState {
        RandomState::new()
    }

    fn hash(&self, key: &[u8]) -> u64 {
        let mut hasher = self.hash_builder.build_hasher();
        hasher.write(key);
        hasher.finish()
    }

    fn segment_id(hash: u64) -> usize {
        ((hash >> 8) & 0xff) as usize
    }

    pub(crate) fn segment(&self, id: usize) -> &Mutex<Segment> {
        &self.segments[id]
    }

    /// Store `key` → `value`, expiring `expire_seconds` from now.
    ///
    /// `expire_seconds == 0` means the entry never expires. An existing
    /// entry is overwritten in place when its allocated capacity allows.
    /// When the segment's arena is full, older entries are evicted to make
    /// room.
    ///
    /// # Errors
    ///
    /// - [`Error::LargeEntry`] if the key exceeds 64KiB or the entry would
    ///   exceed a quarter of its segment's arena
    /// - [`Error::NoSpace`] if eviction could not free enough room within
    ///   its visit budget
    pub fn set(&self, key: &[u8], value: &[u8], expire_seconds: u32) -> Result<(), Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)]
            .lock()
            .set(key, value, hash, expire_seconds)
    }

    /// Look up `key`, returning a copy of its value.
    ///
    /// A hit refreshes the entry's access time, which is what keeps it
    /// warm for eviction purposes. An entry past its expiration is
    /// tombstoned and reported as [`Error::NotFound`].
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)]
            .lock()
            .get(key, hash, false)
            .map(|(value, _)| value)
    }

    /// Like [`get`](Cache::get), additionally returning the entry's
    /// absolute expiration time in epoch seconds (0 = never expires).
    pub fn get_with_expiration(&self, key: &[u8]) -> Result<(Vec<u8>, u32), Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)]
            .lock()
            .get(key, hash, false)
    }

    /// Apply `f` to the value bytes without copying them out of the arena
    /// when the value is physically contiguous.
    ///
    /// The segment lock is held for the duration of `f`; keep it short.
    pub fn get_with<T>(&self, key: &[u8], f: impl FnOnce(&[u8]) -> T) -> Result<T, Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)]
            .lock()
            .get_with(key, hash, f)
    }

    /// Look at `key` without disturbing it: no access-time bump, no
    /// hit/miss accounting, no expiry processing.
    pub fn peek(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)]
            .lock()
            .get(key, hash, true)
            .map(|(value, _)| value)
    }

    /// Remove `key`. Returns whether it existed.
    pub fn del(&self, key: &[u8]) -> bool {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)].lock().del(key, hash)
    }

    /// Reset the expiration of an existing entry to `expire_seconds` from
    /// now; 0 removes the expiry rather than expiring immediately.
    pub fn touch(&self, key: &[u8], expire_seconds: u32) -> Result<(), Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)]
            .lock()
            .touch(key, hash, expire_seconds)
    }

    /// Replace the value of an existing entry, keeping its expiration.
    ///
    /// The update happens in place when the entry's capacity allows or
    /// when it sits at its arena's tail; otherwise it is re-appended.
    pub fn update_value(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)]
            .lock()
            .update_value(key, hash, value)
    }

    /// Seconds until `key` expires; 0 means it never does.
    pub fn ttl(&self, key: &[u8]) -> Result<u32, Error> {
        let hash = self.hash(key);
        self.segments[Self::segment_id(hash)].lock().ttl(key, hash)
    }

    /// Drop every entry in the cache.
    ///
    /// Segments are cleared one at a time under their own locks; readers
    /// in other segments are not blocked.
    pub fn clear(&self) {
        for segment in &self.segments {
            segment.lock().clear();
        }
    }

    /// Zero the monotonic counters (hits, misses, evictions, ...).
    /// Entry counts and occupancy are untouched.
    pub fn reset_statistics(&self) {
        for segment in &self.segments {
            segment.lock().reset_statistics();
        }
    }

    // Statistics reads sum per-segment atomics without taking any segment
    // lock; a reader racing a writer may be one update behind.

    /// Number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.stats
            .iter()
            .map(|s| s.entry_count.value().max(0) as u64)
            .sum()
    }

    /// Lookups that found a live entry.
    pub fn hit_count(&self) -> u64 {
        self.stats.iter().map(|s| s.hit_count.value()).sum()
    }

    /// Lookups that found nothing (absent or expired).
    pub fn miss_count(&self) -> u64 {
        self.stats.iter().map(|s| s.miss_count.value()).sum()
    }

    /// Eviction actions taken: head entries dropped plus entries
    /// relocated to their arena's tail.
    pub fn evacuate_count(&self) -> u64 {
        self.stats.iter().map(|s| s.total_evacuate.value()).sum()
    }

    /// Entries removed because their TTL lapsed.
    pub fn expired_count(&self) -> u64 {
        self.stats.iter().map(|s| s.total_expired.value()).sum()
    }

    /// Values rewritten in place.
    pub fn overwrite_count(&self) -> u64 {
        self.stats.iter().map(|s| s.overwrites.value()).sum()
    }

    /// Successful touch operations.
    pub fn touched_count(&self) -> u64 {
        self.stats.iter().map(|s| s.touched.value()).sum()
    }

    /// Fraction of lookups that hit, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let lookups = hits + self.miss_count();
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }

    /// Mean access time (epoch seconds) over all on-arena entries.
    pub fn average_access_time(&self) -> i64 {
        let total_time: i64 = self.stats.iter().map(|s| s.total_time.value()).sum();
        let total_count: i64 = self.stats.iter().map(|s| s.total_count.value()).sum();
        if total_count == 0 {
            0
        } else {
            total_time / total_count
        }
    }

    /// Total bytes of arena backing the cache. At least the requested
    /// capacity, independent of workload.
    pub fn capacity(&self) -> usize {
        self.segment_size * SEGMENT_COUNT
    }

    /// Number of segments the key space is partitioned into.
    pub fn segment_count(&self) -> usize {
        SEGMENT_COUNT
    }

    /// Iterate all live entries. Order is unspecified; consistency is per
    /// segment only.
    pub fn iter(&self) -> CacheIterator<'_> {
        CacheIterator::new(self)
    }
}

impl<'a> IntoIterator for &'a Cache {
    type Item = Entry;
    type IntoIter = CacheIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
