//! # Memoscope
//!
//! Receiver-scoped memoization for Rust. Every cached result belongs first
//! to the value a call was made on and second to the ordered list of its
//! arguments. The cache never keeps either alive: receivers are tracked
//! through weak handles and shared arguments are reduced to integer
//! surrogate ids, so dropping an object retires all of its results.
//!
//! ## Features
//!
//! - **One attribute**: `#[memoize]` on functions, methods and constructors
//! - **Identity-aware keys**: `Arc` arguments compare by identity, values by content
//! - **Scoped results**: Methods cache per instance, constructors per type
//! - **Memoized accessors**: Getters cached per instance, evicted by setters
//! - **Result-aware**: Only `Ok` values are cached
//! - **Thread-safe**: Concurrent callers with the same key share one computation
//!
//! ## Quick Start
//!
//! ```rust
//! use memoscope::memoize;
//!
//! #[memoize]
//! fn fibonacci(n: u64) -> u64 {
//!     if n < 2 {
//!         return n;
//!     }
//!     fibonacci(n - 1) + fibonacci(n - 2)
//! }
//!
//! assert_eq!(fibonacci(50), 12586269025);
//! ```
//!
//! ## Caching with Methods
//!
//! Methods need a receiver identity. Embed an [`Anchor`] and delegate to it:
//!
//! ```rust
//! use memoscope::{delegate_receiver, memoize, Anchor};
//!
//! struct Catalog {
//!     anchor: Anchor,
//!     prices: Vec<u32>,
//! }
//!
//! delegate_receiver!(Catalog => anchor);
//!
//! impl Catalog {
//!     #[memoize]
//!     fn total(&self, discount: u32) -> u32 {
//!         self.prices.iter().map(|p| p.saturating_sub(discount)).sum()
//!     }
//! }
//!
//! let spring = Catalog { anchor: Anchor::new(), prices: vec![10, 20] };
//! let autumn = Catalog { anchor: Anchor::new(), prices: vec![5] };
//! assert_eq!(spring.total(2), 26);
//! assert_eq!(autumn.total(2), 3);
//! ```
//!
//! ## Constructors
//!
//! ```rust
//! use memoscope::memoize;
//! use std::sync::Arc;
//!
//! struct Color(u8, u8, u8);
//!
//! impl Color {
//!     #[memoize(kind = "constructor")]
//!     fn rgb(r: u8, g: u8, b: u8) -> Arc<Color> {
//!         Arc::new(Color(r, g, b))
//!     }
//! }
//!
//! assert!(Arc::ptr_eq(&Color::rgb(1, 2, 3), &Color::rgb(1, 2, 3)));
//! ```
//!
//! ## Error Handling
//!
//! Functions returning `Result<T, E>` only cache successful results:
//!
//! ```rust
//! use memoscope::memoize;
//!
//! #[memoize]
//! fn divide(a: i32, b: i32) -> Result<i32, String> {
//!     if b == 0 {
//!         Err("Division by zero".to_string())
//!     } else {
//!         Ok(a / b)
//!     }
//! }
//!
//! // Ok results are cached
//! assert_eq!(divide(10, 2), Ok(5));
//! // Err results are NOT cached
//! assert!(divide(10, 0).is_err());
//! ```

pub use memoscope_core::*;
pub use memoscope_macros::memoize;

/// Implements [`Receiver`] and [`KeyToken`] for a struct by delegating to
/// one of its [`Anchor`] fields.
///
/// With both traits in place, instances can receive `#[memoize]` methods and
/// can be passed as arguments that compare by identity.
///
/// # Examples
///
/// ```rust
/// use memoscope::{delegate_receiver, Anchor, KeyToken, Receiver};
///
/// struct Session {
///     anchor: Anchor,
///     user: String,
/// }
///
/// delegate_receiver!(Session => anchor);
///
/// let a = Session { anchor: Anchor::new(), user: "ana".into() };
/// let b = Session { anchor: Anchor::new(), user: "ana".into() };
/// assert_ne!(a.scope_key(), b.scope_key());
/// assert_ne!(a.to_token(), b.to_token());
/// ```
#[macro_export]
macro_rules! delegate_receiver {
    ($ty:ty => $field:ident) => {
        impl $crate::Receiver for $ty {
            #[inline]
            fn scope_key(&self) -> $crate::ScopeKey {
                $crate::Receiver::scope_key(&self.$field)
            }

            #[inline]
            fn liveness(&self) -> ::std::option::Option<::std::boxed::Box<dyn $crate::Liveness>> {
                $crate::Receiver::liveness(&self.$field)
            }
        }

        impl $crate::KeyToken for $ty {
            #[inline]
            fn push_token(&self, key: &mut ::std::string::String) {
                $crate::KeyToken::push_token(&self.$field, key)
            }

            #[inline]
            fn push_liveness(
                &self,
                handles: &mut ::std::vec::Vec<$crate::ArgumentLiveness>,
            ) {
                $crate::KeyToken::push_liveness(&self.$field, handles)
            }
        }
    };
}
