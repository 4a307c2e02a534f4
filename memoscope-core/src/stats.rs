use std::sync::atomic::{AtomicU64, Ordering};

/// Per-cache counters for memoized calls.
///
/// Tracks how often a [`ScopedCache`](crate::ScopedCache) served a stored
/// result, how often it had to compute one, how often the computation
/// failed (and was therefore not stored), and how many entries were evicted
/// through the accessor write path.
///
/// # Thread Safety
///
/// All counters are atomics updated with `Relaxed` ordering. Snapshots taken
/// while other threads record events may be mutually inconsistent by a few
/// counts.
///
/// # Examples
///
/// ```
/// use memoscope_core::MemoStats;
///
/// let stats = MemoStats::new();
/// stats.record_miss();
/// stats.record_hit();
/// stats.record_hit();
///
/// assert_eq!(stats.calls(), 3);
/// assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct MemoStats {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

impl MemoStats {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Records a call answered from the cache.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a call that ran the computation.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a computation that returned an error.
    ///
    /// A failure is always also a miss.
    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an entry removed by an explicit eviction.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Total number of memoized calls (hits + misses).
    #[inline]
    pub fn calls(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Fraction of calls answered from the cache, `0.0` before any call.
    pub fn hit_rate(&self) -> f64 {
        let calls = self.calls();
        if calls == 0 {
            0.0
        } else {
            self.hits() as f64 / calls as f64
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            failures: AtomicU64::new(self.failures()),
            evictions: AtomicU64::new(self.evictions()),
        }
    }
}
