//! # Call Sites
//!
//! Every memoized callable reaches [`ScopedCache`] through one of four
//! call-site shapes. [`CallSite`] is the tagged variant over those shapes;
//! each case decides which scope the call lands in and which argument list
//! forms the key:
//!
//! | Shape | Scope | Key |
//! |-------|-------|-----|
//! | `Function` | the shared [`Unscoped`](crate::Unscoped) sentinel | call arguments |
//! | `Method` | the instance | call arguments |
//! | `Constructor` | the constructed type | constructor arguments |
//! | `Getter` | the instance | always the empty list |
//!
//! Accessor writes are not a call site of their own; they go through
//! [`MemoizedAccessor::set`](crate::MemoizedAccessor::set).

use std::any::TypeId;
use std::convert::Infallible;
use std::fmt;
use tracing::trace;

use crate::keys::{ArgumentList, CompositeKey};
use crate::{Liveness, Receiver, ScopeKey, ScopedCache};

/// Tag of a [`CallSite`], used for logging and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallSiteKind {
    Function,
    Method,
    Constructor,
    Getter,
}

impl CallSiteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallSiteKind::Function => "function",
            CallSiteKind::Method => "method",
            CallSiteKind::Constructor => "constructor",
            CallSiteKind::Getter => "getter",
        }
    }
}

impl fmt::Display for CallSiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a memoized invocation together with its receiver.
#[derive(Clone, Copy)]
pub enum CallSite<'a> {
    /// A free function: every call shares one scope.
    Function,
    /// An instance method: one scope per instance.
    Method(&'a dyn Receiver),
    /// A constructor-style factory: one scope per constructed type, so equal
    /// arguments yield the same shared instance.
    Constructor(TypeId),
    /// A property getter: one entry per instance, keyed by no arguments.
    Getter(&'a dyn Receiver),
}

impl<'a> CallSite<'a> {
    /// Constructor call site for the type `T`.
    pub fn constructor<T: ?Sized + 'static>() -> Self {
        CallSite::Constructor(TypeId::of::<T>())
    }

    pub fn kind(&self) -> CallSiteKind {
        match self {
            CallSite::Function => CallSiteKind::Function,
            CallSite::Method(_) => CallSiteKind::Method,
            CallSite::Constructor(_) => CallSiteKind::Constructor,
            CallSite::Getter(_) => CallSiteKind::Getter,
        }
    }

    /// Composite key of this call site for `arguments`.
    ///
    /// Getters ignore `arguments` and always use the empty key.
    pub fn key<A: ArgumentList + ?Sized>(&self, arguments: &A) -> CompositeKey {
        match self {
            CallSite::Getter(_) => CompositeKey::empty(),
            _ => arguments.composite_key(),
        }
    }
}

impl Receiver for CallSite<'_> {
    fn scope_key(&self) -> ScopeKey {
        match self {
            CallSite::Function => ScopeKey::Unscoped,
            CallSite::Method(receiver) | CallSite::Getter(receiver) => receiver.scope_key(),
            CallSite::Constructor(type_id) => ScopeKey::Type(*type_id),
        }
    }

    fn liveness(&self) -> Option<Box<dyn Liveness>> {
        match self {
            CallSite::Method(receiver) | CallSite::Getter(receiver) => receiver.liveness(),
            CallSite::Function | CallSite::Constructor(_) => None,
        }
    }
}

impl fmt::Debug for CallSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallSite")
            .field(&self.kind())
            .field(&self.scope_key())
            .finish()
    }
}

impl<R: Clone> ScopedCache<R> {
    /// Memoizes one invocation at `site`.
    ///
    /// This is the entry point used by the `#[memoize]` attribute.
    ///
    /// # Examples
    ///
    /// ```
    /// use memoscope_core::{Anchor, CallSite, ScopedCache};
    ///
    /// let cache: ScopedCache<i64> = ScopedCache::new("square");
    /// assert_eq!(cache.invoke(CallSite::Function, &(12,), || 144), 144);
    ///
    /// let instance = Anchor::new();
    /// let value = cache.invoke(CallSite::Method(&instance), &(12,), || -1);
    /// assert_eq!(value, -1); // different scope than the free call
    /// ```
    pub fn invoke<A, F>(&self, site: CallSite<'_>, arguments: &A, compute: F) -> R
    where
        A: ArgumentList + ?Sized,
        F: FnOnce() -> R,
    {
        match self.try_invoke(site, arguments, || Ok::<R, Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`ScopedCache::invoke`]; errors are not stored.
    pub fn try_invoke<A, E, F>(&self, site: CallSite<'_>, arguments: &A, compute: F) -> Result<R, E>
    where
        A: ArgumentList + ?Sized,
        F: FnOnce() -> Result<R, E>,
    {
        let key = site.key(arguments);
        trace!(cache = %self.name(), site = %site.kind(), key = %key, "memoized call");
        self.try_fetch_keyed(&site, key, compute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Anchor, TypeScope, Unscoped};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_function_site_uses_sentinel_scope() {
        let cache = ScopedCache::new("fn_site");
        cache.invoke(CallSite::Function, &(3,), || 9);
        assert_eq!(cache.peek(&Unscoped, &(3,)), Some(9));
        assert_eq!(CallSite::Function.kind(), CallSiteKind::Function);
    }

    #[test]
    fn test_method_site_per_instance() {
        let cache = ScopedCache::new("method_site");
        let a = Anchor::new();
        let b = Anchor::new();
        assert_eq!(cache.invoke(CallSite::Method(&a), &(1,), || "a"), "a");
        assert_eq!(cache.invoke(CallSite::Method(&b), &(1,), || "b"), "b");
        assert_eq!(cache.invoke(CallSite::Method(&a), &(1,), || "z"), "a");
    }

    #[test]
    fn test_constructor_site_shares_instances() {
        let cache: ScopedCache<Arc<Point>> = ScopedCache::new("ctor_site");
        let built = AtomicUsize::new(0);
        let make = |x, y| {
            cache.invoke(CallSite::constructor::<Point>(), &(x, y), || {
                built.fetch_add(1, Ordering::SeqCst);
                Arc::new(Point { x, y })
            })
        };

        let first = make(1, 2);
        let second = make(1, 2);
        let third = make(2, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!((third.x, third.y), (2, 1));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(
            CallSite::constructor::<Point>().scope_key(),
            TypeScope::<Point>::new().scope_key()
        );
    }

    #[test]
    fn test_getter_ignores_arguments() {
        let cache = ScopedCache::new("getter_site");
        let instance = Anchor::new();
        cache.invoke(CallSite::Getter(&instance), &(1, 2, 3), || 5);
        assert_eq!(cache.invoke(CallSite::Getter(&instance), &(), || 6), 5);
        assert_eq!(cache.peek(&instance, &()), Some(5));
    }

    #[test]
    fn test_try_invoke_propagates_errors() {
        let cache: ScopedCache<u8> = ScopedCache::new("try_site");
        let result: Result<u8, &str> = cache.try_invoke(CallSite::Function, &(), || Err("nope"));
        assert_eq!(result, Err("nope"));
        let result: Result<u8, &str> = cache.try_invoke(CallSite::Function, &(), || Ok(1));
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn test_method_site_scope_dies_with_instance() {
        let cache = ScopedCache::new("method_liveness");
        let instance = Anchor::new();
        cache.invoke(CallSite::Method(&instance), &(), || 1);
        drop(instance);
        assert_eq!(cache.purge_unreachable(), 1);
    }
}
