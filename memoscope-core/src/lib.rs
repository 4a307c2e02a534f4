//! # Memoscope Core
//!
//! Core building blocks of the memoscope memoization library.
//!
//! A memoized call is answered from a two-level cache: first by the identity
//! of the receiver it was invoked on, then by the ordered list of its
//! arguments. Neither level keeps anything alive: receivers are tracked
//! through weak handles and reference-typed arguments are reduced to integer
//! surrogates. An entry only disappears when its receiver does.
//!
//! ## Features
//!
//! - **Identity Registry**: Stable surrogate ids for shared values, held weakly
//! - **Composite Keys**: Order-sensitive, type-safe rendering of argument lists
//! - **Scoped Cache**: Per-receiver tables with compute-once entries
//! - **Call Sites**: Functions, methods, constructors and getters through one `invoke`
//! - **Accessors**: Memoized getters whose setters invalidate the cached value
//! - **Statistics**: Optional hit/miss/failure tracking (with `stats` feature)
//!
//! ## Module Organization
//!
//! - [`identity`] - Surrogate ids and the weak side table behind them
//! - [`keys`] - `KeyToken`, `ArgumentList` and `CompositeKey`
//! - [`receiver`] - What can own a cache scope
//! - [`call_site`] - The four memoized call-site shapes
//!
mod accessor;
mod error;
mod scoped_cache;
mod value;

pub mod call_site;
pub mod identity;
pub mod keys;
pub mod receiver;

#[cfg(feature = "stats")]
mod stats;

#[cfg(feature = "stats")]
pub mod stats_registry;

pub use accessor::{AccessorState, MemoizedAccessor, WritePolicy};
pub use call_site::{CallSite, CallSiteKind};
pub use error::MemoError;
pub use identity::{IdentityRegistry, Liveness, ObjectId};
pub use keys::{ArgumentList, ArgumentLiveness, CompositeKey, KeyBuilder, KeyToken};
pub use receiver::{Anchor, Receiver, ScopeKey, TypeScope, Unscoped};
pub use scoped_cache::{ScopedCache, DEFAULT_SWEEP_THRESHOLD};
pub use value::{Callable, Value};

#[cfg(feature = "stats")]
pub use stats::MemoStats;

// Used by code generated with `#[memoize]`. Not part of the public API.
#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}
