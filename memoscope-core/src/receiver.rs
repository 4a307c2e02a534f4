//! # Receivers
//!
//! The outer level of a [`ScopedCache`](crate::ScopedCache) is keyed by the
//! identity of the value a memoized callable is invoked on. This module
//! defines what can act as such a receiver:
//!
//! - [`Unscoped`] - the fixed sentinel scope used by free functions
//! - [`TypeScope`] - one scope per type, used by memoized constructors
//! - `Arc<T>` - identity of the shared allocation
//! - [`Anchor`] - an identity token embedded in a plain struct
//!
//! Receivers only ever hand out a weak [`Liveness`] handle, so a cache scope
//! never keeps its receiver alive.

use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::keys::{ArgumentLiveness, KeyToken};
use crate::{IdentityRegistry, Liveness, ObjectId};

/// Identity of a cache scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// The shared scope of free functions.
    Unscoped,
    /// The scope of a type, shared by all of its memoized constructions.
    Type(TypeId),
    /// The scope of one live object.
    Object(ObjectId),
}

/// A value that identifies a cache scope.
///
/// This trait is object safe; call sites pass receivers as
/// `&dyn Receiver`.
///
/// # Implementing for your own types
///
/// Embed an [`Anchor`] and delegate to it, either by hand or with the
/// `delegate_receiver!` macro of the `memoscope` crate:
///
/// ```
/// use memoscope_core::{Anchor, Liveness, Receiver, ScopeKey};
///
/// struct Document {
///     anchor: Anchor,
///     text: String,
/// }
///
/// impl Receiver for Document {
///     fn scope_key(&self) -> ScopeKey {
///         self.anchor.scope_key()
///     }
///
///     fn liveness(&self) -> Option<Box<dyn Liveness>> {
///         self.anchor.liveness()
///     }
/// }
/// ```
pub trait Receiver {
    /// Returns the key of this receiver's scope.
    fn scope_key(&self) -> ScopeKey;

    /// Returns a handle reporting whether the receiver is still alive.
    ///
    /// `None` means the scope lives as long as the cache (the sentinel and
    /// type scopes).
    fn liveness(&self) -> Option<Box<dyn Liveness>>;
}

impl<R: Receiver + ?Sized> Receiver for &R {
    #[inline]
    fn scope_key(&self) -> ScopeKey {
        (**self).scope_key()
    }

    #[inline]
    fn liveness(&self) -> Option<Box<dyn Liveness>> {
        (**self).liveness()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Receiver for Arc<T> {
    fn scope_key(&self) -> ScopeKey {
        ScopeKey::Object(IdentityRegistry::global().id_for(self))
    }

    fn liveness(&self) -> Option<Box<dyn Liveness>> {
        Some(Box::new(Arc::downgrade(self)))
    }
}

/// Sentinel receiver for callables without a meaningful receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Unscoped;

impl Receiver for Unscoped {
    #[inline]
    fn scope_key(&self) -> ScopeKey {
        ScopeKey::Unscoped
    }

    #[inline]
    fn liveness(&self) -> Option<Box<dyn Liveness>> {
        None
    }
}

/// Receiver standing for the type `T` itself.
///
/// Memoized constructors use it so that all constructions of `T` share one
/// scope.
pub struct TypeScope<T: ?Sized + 'static>(PhantomData<fn() -> *const T>);

impl<T: ?Sized + 'static> TypeScope<T> {
    /// Returns the receiver for `T`. Every value of it maps to the same scope.
    pub const fn new() -> Self {
        TypeScope(PhantomData)
    }
}

impl<T: ?Sized + 'static> Default for TypeScope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> Clone for TypeScope<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized + 'static> Copy for TypeScope<T> {}

impl<T: ?Sized + 'static> fmt::Debug for TypeScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeScope<{}>", type_name::<T>())
    }
}

impl<T: ?Sized + 'static> Receiver for TypeScope<T> {
    #[inline]
    fn scope_key(&self) -> ScopeKey {
        ScopeKey::Type(TypeId::of::<T>())
    }

    #[inline]
    fn liveness(&self) -> Option<Box<dyn Liveness>> {
        None
    }
}

#[derive(Debug)]
struct AnchorCell {
    id: ObjectId,
}

/// Identity token for values that are not shared through an `Arc`.
///
/// Each anchor owns a fresh [`ObjectId`]. Embed one in a struct to make
/// instances of that struct usable as receivers and as identity-compared
/// arguments. When the struct is dropped, the anchor goes with it and every
/// cache scope keyed by it becomes unreachable.
///
/// Cloning an anchor produces a **new** identity: a cloned struct is a
/// distinct instance and must not see the original's cached results.
///
/// # Examples
///
/// ```
/// use memoscope_core::{Anchor, KeyToken, Receiver};
///
/// let a = Anchor::new();
/// let b = a.clone();
/// assert_ne!(a.scope_key(), b.scope_key());
/// assert_eq!(a.to_token(), a.id().to_string());
/// ```
pub struct Anchor {
    cell: Arc<AnchorCell>,
}

impl Anchor {
    /// Creates an anchor with a fresh surrogate id.
    pub fn new() -> Self {
        Self {
            cell: Arc::new(AnchorCell {
                id: IdentityRegistry::global().allocate(),
            }),
        }
    }

    /// Returns this anchor's surrogate id.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.cell.id
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Anchor {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Anchor").field(&self.cell.id).finish()
    }
}

impl PartialEq for Anchor {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id == other.cell.id
    }
}

impl Eq for Anchor {}

impl Receiver for Anchor {
    #[inline]
    fn scope_key(&self) -> ScopeKey {
        ScopeKey::Object(self.cell.id)
    }

    fn liveness(&self) -> Option<Box<dyn Liveness>> {
        Some(Box::new(Arc::downgrade(&self.cell)))
    }
}

impl KeyToken for Anchor {
    fn push_token(&self, key: &mut String) {
        use std::fmt::Write;
        let _ = write!(key, "{}", self.cell.id);
    }

    fn push_liveness(&self, handles: &mut Vec<ArgumentLiveness>) {
        handles.push(Arc::new(Arc::downgrade(&self.cell)));
    }
}
