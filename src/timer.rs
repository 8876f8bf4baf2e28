use std::sync::atomic::{AtomicU32, Ordering};

use clocksource::coarse::UnixInstant;

/// Clock used for entry timestamps and TTL checks.
///
/// Reports whole seconds since the unix epoch. Second granularity is all
/// the eviction policy needs, and a coarse clock read keeps the hot path
/// cheap. Injectable so tests can drive expiry deterministically.
pub trait Timer: Send + Sync {
    fn now(&self) -> u32;
}

/// Default timer backed by the coarse system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixTimer;

impl Timer for UnixTimer {
    fn now(&self) -> u32 {
        UnixInstant::now().duration_since(UnixInstant::EPOCH).as_secs()
    }
}

/// Manually advanced timer for tests.
///
/// ```
/// use std::sync::Arc;
/// use ringcache::{CacheBuilder, MockTimer};
///
/// let timer = Arc::new(MockTimer::new(100));
/// let cache = CacheBuilder::new().timer(timer.clone()).build();
/// cache.set(b"k", b"v", 5).unwrap();
/// timer.advance(6);
/// assert!(cache.get(b"k").is_err());
/// ```
#[derive(Debug, Default)]
pub struct MockTimer {
    now: AtomicU32,
}

impl MockTimer {
    pub fn new(start: u32) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, secs: u32) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Timer for MockTimer {
    fn now(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }
}
