use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::MemoStats;

/// Global registry of memoization statistics, indexed by cache name.
///
/// Caches created with [`ScopedCache::registered`](crate::ScopedCache::registered)
/// (which is what `#[memoize]` uses) add themselves here, so statistics can
/// be queried without holding on to the cache.
///
/// # Examples
///
/// ```
/// use memoscope_core::{stats_registry, ScopedCache, Unscoped};
///
/// let cache: ScopedCache<u32> = ScopedCache::registered("doc_square");
/// cache.fetch(&Unscoped, &(4,), || 16);
/// cache.fetch(&Unscoped, &(4,), || 16);
///
/// let stats = stats_registry::get("doc_square").unwrap();
/// assert_eq!(stats.hits(), 1);
/// assert_eq!(stats.misses(), 1);
/// ```
static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<MemoStats>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `stats` under `name`, replacing any previous registration.
pub fn register(name: &str, stats: Arc<MemoStats>) {
    STATS_REGISTRY.write().insert(name.to_string(), stats);
}

/// Returns a snapshot of the statistics registered under `name`.
pub fn get(name: &str) -> Option<MemoStats> {
    STATS_REGISTRY.read().get(name).map(|stats| (**stats).clone())
}

/// Returns the live statistics registered under `name`.
pub fn get_ref(name: &str) -> Option<Arc<MemoStats>> {
    STATS_REGISTRY.read().get(name).cloned()
}

/// Lists every registered cache name.
pub fn list() -> Vec<String> {
    STATS_REGISTRY.read().keys().cloned().collect()
}

/// Removes every registration. The statistics themselves are untouched.
pub fn clear() {
    STATS_REGISTRY.write().clear();
}

/// Resets the counters registered under `name`.
///
/// Returns `false` if nothing is registered under that name.
pub fn reset(name: &str) -> bool {
    match STATS_REGISTRY.read().get(name) {
        Some(stats) => {
            stats.reset();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_register_and_get() {
        let stats = Arc::new(MemoStats::new());
        register("registry_test_fn", Arc::clone(&stats));
        stats.record_miss();

        let snapshot = get("registry_test_fn").unwrap();
        assert_eq!(snapshot.misses(), 1);
        assert!(get("registry_missing").is_none());
    }

    #[test]
    #[serial]
    fn test_get_ref_is_live() {
        let stats = Arc::new(MemoStats::new());
        register("registry_live_fn", Arc::clone(&stats));

        let live = get_ref("registry_live_fn").unwrap();
        stats.record_hit();
        assert_eq!(live.hits(), 1);
        assert!(Arc::ptr_eq(&live, &stats));
    }

    #[test]
    #[serial]
    fn test_reset_and_list() {
        let stats = Arc::new(MemoStats::new());
        register("registry_reset_fn", Arc::clone(&stats));
        stats.record_hit();

        assert!(list().contains(&"registry_reset_fn".to_string()));
        assert!(reset("registry_reset_fn"));
        assert_eq!(stats.hits(), 0);
        assert!(!reset("registry_nonexistent"));
    }

    #[test]
    #[serial]
    fn test_clear() {
        register("registry_clear_fn", Arc::new(MemoStats::new()));
        assert!(!list().is_empty());
        clear();
        assert!(list().is_empty());
    }
}
