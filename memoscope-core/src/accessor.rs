use std::fmt;
use tracing::trace;

use crate::{CallSite, Receiver, ScopedCache};

/// What a write through a memoized accessor does to the cached value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WritePolicy {
    /// Drop the cached value; the next read runs the getter.
    #[default]
    Evict,
    /// Drop the cached value, run the setter, then cache the written value
    /// so the next read is a hit. Only correct when the getter returns
    /// exactly what was written.
    Restore,
}

/// Whether a receiver currently has a cached getter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessorState {
    Empty,
    Populated,
}

/// Memoized getter/setter pair.
///
/// Each receiver has at most one cached getter value, keyed by the empty
/// argument list. The per-receiver state machine is:
///
/// - `Empty -> Populated` on a read (the getter runs and its value is stored)
/// - `Populated -> Empty` on a write
/// - `Empty -> Empty` on a write (the setter still runs)
///
/// With [`WritePolicy::Restore`] a write ends in `Populated`, holding the
/// written value.
///
/// # Examples
///
/// ```
/// use memoscope_core::{AccessorState, Anchor, MemoizedAccessor, WritePolicy};
/// use std::cell::Cell;
///
/// let accessor = MemoizedAccessor::new("celsius", WritePolicy::Evict);
/// let instance = Anchor::new();
/// let backing = Cell::new(20);
///
/// assert_eq!(accessor.get(&instance, || backing.get()), 20);
/// assert_eq!(accessor.state(&instance), AccessorState::Populated);
///
/// accessor.set(&instance, 25, |value| backing.set(value));
/// assert_eq!(accessor.state(&instance), AccessorState::Empty);
/// assert_eq!(accessor.get(&instance, || backing.get()), 25);
/// ```
pub struct MemoizedAccessor<R> {
    cache: ScopedCache<R>,
    policy: WritePolicy,
}

impl<R: Clone> MemoizedAccessor<R> {
    /// Creates an accessor with no cached values. `name` labels its cache
    /// in log events.
    pub fn new(name: impl Into<String>, policy: WritePolicy) -> Self {
        Self {
            cache: ScopedCache::new(name),
            policy,
        }
    }

    /// Like [`MemoizedAccessor::new`], registering the statistics under
    /// `name`.
    pub fn registered(name: impl Into<String>, policy: WritePolicy) -> Self {
        Self {
            cache: ScopedCache::registered(name),
            policy,
        }
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Returns the cached value for `receiver`, running `getter` on the
    /// first read.
    pub fn get<F>(&self, receiver: &dyn Receiver, getter: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.cache.invoke(CallSite::Getter(receiver), &(), getter)
    }

    /// Fallible read; a failing getter leaves the state `Empty`.
    pub fn try_get<E, F>(&self, receiver: &dyn Receiver, getter: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
    {
        self.cache.try_invoke(CallSite::Getter(receiver), &(), getter)
    }

    /// Writes `value` through `setter`, evicting the cached value first.
    ///
    /// With [`WritePolicy::Restore`] the written value is cached afterwards.
    pub fn set<S>(&self, receiver: &dyn Receiver, value: R, setter: S)
    where
        S: FnOnce(R),
    {
        let evicted = self.cache.evict(receiver, &());
        match self.policy {
            WritePolicy::Evict => setter(value),
            WritePolicy::Restore => {
                setter(value.clone());
                self.cache.store(receiver, &(), value);
            }
        }
        trace!(cache = %self.cache.name(), evicted, policy = ?self.policy, "accessor written");
    }

    /// Drops the cached value without writing anything.
    pub fn invalidate(&self, receiver: &dyn Receiver) -> bool {
        self.cache.evict(receiver, &())
    }

    pub fn state(&self, receiver: &dyn Receiver) -> AccessorState {
        if self.cache.contains(receiver, &()) {
            AccessorState::Populated
        } else {
            AccessorState::Empty
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &ScopedCache<R> {
        &self.cache
    }
}

impl<R> fmt::Debug for MemoizedAccessor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizedAccessor")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish()
    }
}
