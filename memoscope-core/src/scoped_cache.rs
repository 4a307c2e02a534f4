use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::keys::{ArgumentList, CompositeKey};
use crate::{Liveness, Receiver, ScopeKey};

#[cfg(feature = "stats")]
use crate::MemoStats;

/// Default threshold of the automatic purge.
///
/// A purge runs when the scope count reaches the scope trigger, or when this
/// many results have been stored since the last purge (scaled up to the
/// total entry count). Between purges a cache therefore holds at most
/// about `threshold` results whose receiver or shared argument is gone,
/// plus as many dead scopes as the scope trigger allows.
/// [`ScopedCache::purge_unreachable`] reclaims them at once.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 64;

type Slot<R> = Arc<OnceCell<R>>;

/// Entries of one receiver, keyed by composite argument key.
///
/// Every entry is a compute-once cell. A cell is inserted empty before its
/// computation starts, so concurrent callers with the same key wait on the
/// same cell instead of computing twice.
struct ArgumentTable<R> {
    entries: RwLock<HashMap<CompositeKey, Slot<R>>>,
}

impl<R> ArgumentTable<R> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cell for `key`, inserting an empty one if needed.
    fn slot(&self, key: &CompositeKey) -> Slot<R> {
        if let Some(slot) = self.entries.read().get(key) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write();
        Arc::clone(
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    fn get(&self, key: &CompositeKey) -> Option<Slot<R>> {
        self.entries.read().get(key).cloned()
    }

    /// Drops `slot` if it is still the (empty) cell stored under `key`.
    fn discard_pending(&self, key: &CompositeKey, slot: &Slot<R>) {
        let mut entries = self.entries.write();
        let is_same_pending = entries
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, slot) && current.get().is_none());
        if is_same_pending {
            entries.remove(key);
        }
    }

    /// Removes the entry under `key`, returning whether it held a value.
    fn remove(&self, key: &CompositeKey) -> bool {
        self.entries
            .write()
            .remove(key)
            .map_or(false, |slot| slot.get().is_some())
    }

    fn store(&self, key: CompositeKey, value: R) {
        self.entries
            .write()
            .insert(key, Arc::new(OnceCell::with_value(value)));
    }

    fn populated(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Drops entries whose key mentions a dropped shared argument.
    ///
    /// Returns the number of dropped entries that held a value. A pending
    /// cell dropped here still completes for the callers waiting on it.
    fn purge_unreachable(&self) -> usize {
        let mut entries = self.entries.write();
        let mut removed = 0;
        entries.retain(|key, slot| {
            let reachable = key.is_reachable();
            if !reachable && slot.get().is_some() {
                removed += 1;
            }
            reachable
        });
        removed
    }
}

/// Cache scope of one receiver.
///
/// Holds only a weak liveness handle of its receiver. Once the receiver is
/// dropped the scope can no longer be reached (its key is never produced
/// again) and is removed by the next purge.
struct ReceiverScope<R> {
    liveness: Option<Box<dyn Liveness>>,
    table: ArgumentTable<R>,
}

impl<R> ReceiverScope<R> {
    fn new(liveness: Option<Box<dyn Liveness>>) -> Self {
        Self {
            liveness,
            table: ArgumentTable::new(),
        }
    }

    fn is_reachable(&self) -> bool {
        self.liveness.as_ref().map_or(true, |handle| handle.is_alive())
    }
}

/// A two-level memoization cache: receiver scope, then argument list.
///
/// `ScopedCache` is the single storage primitive behind every memoized call
/// site. The outer level maps a receiver's [`ScopeKey`] to its scope, the
/// inner level maps the [`CompositeKey`] of an argument list to the stored
/// result.
///
/// # Type Parameters
///
/// * `R` - The cached result type. Results are returned by `clone`, so
///   expensive results are usually stored as `Arc<T>`.
///
/// # Guarantees
///
/// - **At most one result per (receiver, key)**: the first successful
///   computation is stored and returned by every later call.
/// - **At most one concurrent computation per (receiver, key)**: callers
///   arriving while a computation runs wait for it and share its result.
/// - **No negative caching**: a computation returning `Err` stores nothing;
///   the next call computes again.
/// - **No keep-alive**: receivers are held through weak handles, and
///   reference-typed arguments only appear as `<id>` surrogates.
///
/// # Thread Safety
///
/// Scopes live in a `DashMap`, each argument table behind a
/// `parking_lot::RwLock`, and each entry in a `once_cell::sync::OnceCell`.
/// No lock is held while the computation runs, so a computation may call
/// other memoized functions freely. Calling back into the *same* receiver
/// and key from inside its own computation blocks forever.
///
/// # Examples
///
/// ```
/// use memoscope_core::{ScopedCache, Unscoped};
/// use std::sync::Arc;
///
/// let cache: ScopedCache<u64> = ScopedCache::new("answer");
/// let receiver = Arc::new(String::from("receiver"));
///
/// assert_eq!(cache.fetch(&receiver, &(1, "a"), || 42), 42);
/// // Same receiver, equal arguments: the stored value wins
/// assert_eq!(cache.fetch(&receiver, &(1, "a"), || 99), 42);
/// // Free functions use the sentinel scope
/// assert_eq!(cache.fetch(&Unscoped, &(1, "a"), || 7), 7);
/// ```
pub struct ScopedCache<R> {
    name: String,
    scopes: DashMap<ScopeKey, Arc<ReceiverScope<R>>>,
    sweep_threshold: usize,
    sweep_at: AtomicUsize,
    entries_since_purge: AtomicUsize,
    entry_sweep_at: AtomicUsize,
    purging: AtomicBool,
    #[cfg(feature = "stats")]
    stats: Arc<MemoStats>,
}

impl<R: Clone> ScopedCache<R> {
    /// Creates an empty cache. `name` appears in log events.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scopes: DashMap::new(),
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            sweep_at: AtomicUsize::new(DEFAULT_SWEEP_THRESHOLD),
            entries_since_purge: AtomicUsize::new(0),
            entry_sweep_at: AtomicUsize::new(DEFAULT_SWEEP_THRESHOLD),
            purging: AtomicBool::new(false),
            #[cfg(feature = "stats")]
            stats: Arc::new(MemoStats::new()),
        }
    }

    /// Creates an empty cache and registers its statistics under `name`
    /// in the [`stats_registry`](crate::stats_registry).
    ///
    /// Without the `stats` feature this is the same as [`ScopedCache::new`].
    pub fn registered(name: impl Into<String>) -> Self {
        let cache = Self::new(name);
        #[cfg(feature = "stats")]
        crate::stats_registry::register(&cache.name, Arc::clone(&cache.stats));
        cache
    }

    /// Sets the threshold of the automatic purge of unreachable scopes and
    /// entries.
    ///
    /// A purge runs when the scope count reaches the scope trigger or when
    /// the number of results stored since the last purge reaches the entry
    /// trigger. Afterwards the scope trigger moves to twice the surviving
    /// scope count and the entry trigger to the surviving entry count,
    /// neither below `threshold`.
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        self.sweep_threshold = threshold;
        *self.sweep_at.get_mut() = threshold;
        *self.entry_sweep_at.get_mut() = threshold;
        self
    }

    /// Name given at construction, used in log events and as the
    /// statistics key.
    ///
    /// ```
    /// use memoscope_core::ScopedCache;
    ///
    /// let cache: ScopedCache<u8> = ScopedCache::new("totals");
    /// assert_eq!(cache.name(), "totals");
    /// ```
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &Arc<MemoStats> {
        &self.stats
    }

    /// Returns the stored result for `(receiver, arguments)`, computing and
    /// storing it on the first call.
    ///
    /// `compute` runs only on a miss. If it panics, nothing is stored.
    pub fn fetch<C, A, F>(&self, receiver: &C, arguments: &A, compute: F) -> R
    where
        C: Receiver + ?Sized,
        A: ArgumentList + ?Sized,
        F: FnOnce() -> R,
    {
        match self.try_fetch(receiver, arguments, || Ok::<R, Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`ScopedCache::fetch`].
    ///
    /// # Errors
    ///
    /// Returns the error of `compute` unchanged. Nothing is stored for the
    /// key, so the next call runs `compute` again.
    pub fn try_fetch<C, A, E, F>(&self, receiver: &C, arguments: &A, compute: F) -> Result<R, E>
    where
        C: Receiver + ?Sized,
        A: ArgumentList + ?Sized,
        F: FnOnce() -> Result<R, E>,
    {
        self.try_fetch_keyed(receiver, arguments.composite_key(), compute)
    }

    pub(crate) fn try_fetch_keyed<C, E, F>(
        &self,
        receiver: &C,
        key: CompositeKey,
        compute: F,
    ) -> Result<R, E>
    where
        C: Receiver + ?Sized,
        F: FnOnce() -> Result<R, E>,
    {
        let scope = self.scope_for(receiver);
        let slot = scope.table.slot(&key);

        if let Some(value) = slot.get() {
            self.record_hit(&key);
            return Ok(value.clone());
        }

        let mut computed = false;
        let outcome = slot.get_or_try_init(|| {
            computed = true;
            compute()
        });

        match outcome {
            Ok(value) => {
                let value = value.clone();
                if computed {
                    self.record_miss(&key);
                    self.note_new_entry();
                } else {
                    // Another caller finished the computation while we waited
                    self.record_hit(&key);
                }
                Ok(value)
            }
            Err(err) => {
                scope.table.discard_pending(&key, &slot);
                #[cfg(feature = "stats")]
                {
                    self.stats.record_miss();
                    self.stats.record_failure();
                }
                debug!(cache = %self.name, key = %key, "memoized computation failed, nothing stored");
                Err(err)
            }
        }
    }

    /// Returns the stored result without computing anything.
    ///
    /// Does not create a scope and is not counted in the statistics.
    pub fn peek<C, A>(&self, receiver: &C, arguments: &A) -> Option<R>
    where
        C: Receiver + ?Sized,
        A: ArgumentList + ?Sized,
    {
        let scope = self.existing_scope(receiver)?;
        let slot = scope.table.get(&arguments.composite_key())?;
        slot.get().cloned()
    }

    /// Returns `true` if a result is stored for `(receiver, arguments)`.
    pub fn contains<C, A>(&self, receiver: &C, arguments: &A) -> bool
    where
        C: Receiver + ?Sized,
        A: ArgumentList + ?Sized,
    {
        self.existing_scope(receiver)
            .and_then(|scope| scope.table.get(&arguments.composite_key()))
            .map_or(false, |slot| slot.get().is_some())
    }

    /// Removes the entry for `(receiver, arguments)`.
    ///
    /// Returns `true` if a stored result was removed. An in-flight
    /// computation for the key still completes for its own caller, but its
    /// result is not visible to later calls.
    pub fn evict<C, A>(&self, receiver: &C, arguments: &A) -> bool
    where
        C: Receiver + ?Sized,
        A: ArgumentList + ?Sized,
    {
        let Some(scope) = self.existing_scope(receiver) else {
            return false;
        };
        let key = arguments.composite_key();
        let removed = scope.table.remove(&key);
        if removed {
            #[cfg(feature = "stats")]
            self.stats.record_eviction();
            trace!(cache = %self.name, key = %key, "entry evicted");
        }
        removed
    }

    /// Stores `value` for `(receiver, arguments)`, replacing any entry.
    pub fn store<C, A>(&self, receiver: &C, arguments: &A, value: R)
    where
        C: Receiver + ?Sized,
        A: ArgumentList + ?Sized,
    {
        let scope = self.scope_for(receiver);
        scope.table.store(arguments.composite_key(), value);
        self.note_new_entry();
    }

    /// Drops every scope and entry.
    pub fn clear(&self) {
        self.scopes.clear();
    }

    /// Number of stored results across all scopes.
    pub fn len(&self) -> usize {
        self.scopes
            .iter()
            .map(|scope| scope.value().table.populated())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of receiver scopes, including unreachable ones not yet purged.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Removes every scope whose receiver has been dropped, and every entry
    /// whose arguments include a dropped shared value.
    ///
    /// Returns the number of removed results. Runs automatically when the
    /// scope count or the number of newly stored results crosses the sweep
    /// threshold (see [`DEFAULT_SWEEP_THRESHOLD`]).
    pub fn purge_unreachable(&self) -> usize {
        let mut dead_scopes = 0;
        let mut removed = 0;
        self.scopes.retain(|_, scope| {
            if scope.is_reachable() {
                removed += scope.table.purge_unreachable();
                true
            } else {
                dead_scopes += 1;
                removed += scope.table.populated();
                false
            }
        });
        if removed > 0 || dead_scopes > 0 {
            debug!(
                cache = %self.name,
                removed,
                dead_scopes,
                remaining = self.scopes.len(),
                "unreachable entries purged"
            );
        }
        removed
    }

    fn existing_scope<C>(&self, receiver: &C) -> Option<Arc<ReceiverScope<R>>>
    where
        C: Receiver + ?Sized,
    {
        self.scopes
            .get(&receiver.scope_key())
            .map(|scope| Arc::clone(scope.value()))
    }

    fn scope_for<C>(&self, receiver: &C) -> Arc<ReceiverScope<R>>
    where
        C: Receiver + ?Sized,
    {
        let key = receiver.scope_key();
        if let Some(scope) = self.scopes.get(&key) {
            return Arc::clone(scope.value());
        }

        let mut created = false;
        let scope = Arc::clone(
            self.scopes
                .entry(key)
                .or_insert_with(|| {
                    created = true;
                    Arc::new(ReceiverScope::new(receiver.liveness()))
                })
                .value(),
        );

        if created {
            debug!(cache = %self.name, scope = ?key, "receiver scope created");
            self.maybe_purge();
        }
        scope
    }

    /// Counts a newly stored result and purges once enough have piled up.
    ///
    /// Must be called with no slot or table lock held.
    fn note_new_entry(&self) {
        let stored = self.entries_since_purge.fetch_add(1, Ordering::AcqRel) + 1;
        if stored >= self.entry_sweep_at.load(Ordering::Acquire) {
            self.run_purge();
        }
    }

    fn maybe_purge(&self) {
        if self.scopes.len() >= self.sweep_at.load(Ordering::Acquire) {
            self.run_purge();
        }
    }

    /// Runs one automatic purge and moves both triggers. Concurrent callers
    /// that lose the race skip the purge.
    fn run_purge(&self) {
        if self
            .purging
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.purge_unreachable();

        let scopes = self.scopes.len();
        let entries: usize = self
            .scopes
            .iter()
            .map(|scope| scope.value().table.entry_count())
            .sum();
        self.sweep_at
            .store((scopes * 2).max(self.sweep_threshold), Ordering::Release);
        self.entry_sweep_at
            .store(entries.max(self.sweep_threshold), Ordering::Release);
        self.entries_since_purge.store(0, Ordering::Release);
        self.purging.store(false, Ordering::Release);
    }

    #[inline]
    fn record_hit(&self, key: &CompositeKey) {
        #[cfg(feature = "stats")]
        self.stats.record_hit();
        trace!(cache = %self.name, key = %key, "memo hit");
    }

    #[inline]
    fn record_miss(&self, key: &CompositeKey) {
        #[cfg(feature = "stats")]
        self.stats.record_miss();
        trace!(cache = %self.name, key = %key, "memo miss");
    }
}

impl<R> fmt::Debug for ScopedCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCache")
            .field("name", &self.name)
            .field("scopes", &self.scopes.len())
            .field("entries_since_purge", &self.entries_since_purge.load(Ordering::Relaxed))
            .finish()
    }
}
