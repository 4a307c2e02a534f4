//! # Identity Registry
//!
//! Surrogate ids for reference-typed values.
//!
//! Values compared by identity (objects, callables) cannot be hashed by
//! content when building a composite key. Instead each allocation gets a
//! small integer id the first time it is seen, and that id is what ends up
//! in the key text as `<id>`.
//!
//! The registry never holds a strong reference. Each slot keeps a [`Weak`]
//! handle, which pins the *allocation* (so its address cannot be handed to a
//! different value while the slot exists) but not the value itself. Slots
//! whose value has been dropped are removed by [`IdentityRegistry::sweep`],
//! which also runs automatically each time the table doubles in size.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Slot count below which the automatic sweep never runs.
const MIN_SWEEP_THRESHOLD: usize = 64;

/// Integer surrogate standing in for a reference-typed value.
///
/// Ids are allocated from a process-wide monotonic counter starting at 1 and
/// are never reused, so an id observed in a cache key can never be confused
/// with a value that was allocated later.
///
/// The `Display` form is the composite-key token: the id wrapped in angle
/// brackets.
///
/// ```
/// use memoscope_core::IdentityRegistry;
/// use std::sync::Arc;
///
/// let value = Arc::new(vec![1, 2, 3]);
/// let id = IdentityRegistry::global().id_for(&value);
/// assert_eq!(id.to_string(), format!("<{}>", id.get()));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Returns the raw counter value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// Answers whether a weakly tracked value is still alive.
///
/// Implemented for [`Weak`] so both the identity registry and receiver
/// scopes can track liveness without keeping anything alive.
pub trait Liveness: Send + Sync {
    /// Returns `true` while at least one strong reference exists.
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Liveness for Weak<T> {
    #[inline]
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

struct Slot {
    id: ObjectId,
    handle: Box<dyn Liveness>,
}

/// Side table from allocation address to [`ObjectId`].
///
/// # Thread Safety
///
/// Backed by a `DashMap`, so lookups from different threads only contend
/// when they hash to the same shard. Registration of a new address is
/// atomic: two threads registering the same `Arc` concurrently observe the
/// same id.
///
/// # Examples
///
/// ```
/// use memoscope_core::IdentityRegistry;
/// use std::sync::Arc;
///
/// let registry = IdentityRegistry::new();
/// let a = Arc::new(String::from("same"));
/// let b = Arc::new(String::from("same"));
///
/// // Identity, not content, decides the id
/// assert_eq!(registry.id_for(&a), registry.id_for(&Arc::clone(&a)));
/// assert_ne!(registry.id_for(&a), registry.id_for(&b));
/// ```
pub struct IdentityRegistry {
    slots: DashMap<usize, Slot>,
    next_id: AtomicU64,
    sweep_at: AtomicUsize,
}

impl IdentityRegistry {
    /// Creates an empty registry with its own id counter.
    ///
    /// Most callers want [`IdentityRegistry::global`]; separate instances are
    /// mainly useful in tests.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_id: AtomicU64::new(1),
            sweep_at: AtomicUsize::new(MIN_SWEEP_THRESHOLD),
        }
    }

    /// Returns the process-wide registry used when building composite keys.
    pub fn global() -> &'static IdentityRegistry {
        static INSTANCE: Lazy<IdentityRegistry> = Lazy::new(IdentityRegistry::new);
        &INSTANCE
    }

    /// Allocates a fresh id without registering any address.
    ///
    /// Used by values that carry their own identity, such as
    /// [`Anchor`](crate::Anchor).
    pub fn allocate(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the surrogate id of the allocation behind `value`,
    /// registering it on first sight.
    ///
    /// The id is stable for as long as any strong reference to the value
    /// exists. The registry itself only keeps a weak handle.
    pub fn id_for<T>(&self, value: &Arc<T>) -> ObjectId
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let address = Arc::as_ptr(value) as *const () as usize;

        if let Some(slot) = self.slots.get(&address) {
            return slot.id;
        }

        // The entry guard must be released before a sweep can run
        let id = self
            .slots
            .entry(address)
            .or_insert_with(|| Slot {
                id: self.allocate(),
                handle: Box::new(Arc::downgrade(value)),
            })
            .id;

        self.maybe_sweep();
        id
    }

    /// Number of registered slots, including ones not yet swept.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slot is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Removes the slots of values that have been dropped.
    ///
    /// Returns the number of removed slots. Removing a slot releases the
    /// weak handle, which lets the allocator reuse the address; a value
    /// allocated there later receives a new id.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.slots.retain(|_, slot| {
            let alive = slot.handle.is_alive();
            if !alive {
                removed += 1;
            }
            alive
        });
        if removed > 0 {
            debug!(removed, remaining = self.slots.len(), "identity registry swept");
        }
        removed
    }

    fn maybe_sweep(&self) {
        let threshold = self.sweep_at.load(Ordering::Acquire);
        if self.slots.len() < threshold {
            return;
        }
        // Only one thread sweeps at a time; the others keep registering
        if self
            .sweep_at
            .compare_exchange(threshold, usize::MAX, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.sweep();
        let next = (self.slots.len() * 2).max(MIN_SWEEP_THRESHOLD);
        self.sweep_at.store(next, Ordering::Release);
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("slots", &self.slots.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
