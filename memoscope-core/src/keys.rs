//! # Composite Keys
//!
//! Rendering of ordered argument lists into the text key used by the inner
//! level of a [`ScopedCache`](crate::ScopedCache).
//!
//! Each argument renders to one token and tokens are joined with `,`:
//!
//! | Argument | Token |
//! |----------|-------|
//! | `None`, [`Value::Null`](crate::Value::Null) | `null` |
//! | `()`, [`Value::Undefined`](crate::Value::Undefined) | `undefined` |
//! | `Arc<T>`, [`Anchor`](crate::Anchor), objects, callables | `<id>` |
//! | `str`, `String`, `char` | `"..."` with `"` and `\` escaped |
//! | numbers, booleans | the plain literal |
//!
//! Reference tokens are bracketed and text tokens are quoted with every
//! quote and backslash escaped, so no text value can render the same as a
//! reference, a literal, or a run of several tokens. Numbers of different
//! Rust types with the same value (`1u8`, `1i64`, `1.0f64`) render to the
//! same literal and therefore share an entry.
//!
//! Besides its text, a [`CompositeKey`] carries a weak handle for every
//! shared value it refers to. Once any of them is dropped the key can never
//! be rendered again, and the cache drops the entry on its next purge.

use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{IdentityRegistry, Liveness};

/// Weak handle of a shared argument, carried by the key that mentions it.
pub type ArgumentLiveness = Arc<dyn Liveness>;

/// Separator placed between argument tokens.
pub const TOKEN_SEPARATOR: char = ',';

/// Renders a single argument as a composite-key token.
///
/// Implement this for argument types that should be compared by value with
/// a custom rendering, or delegate to an embedded [`Anchor`](crate::Anchor)
/// for types compared by identity.
///
/// # Examples
///
/// ```
/// use memoscope_core::{KeyToken, CompositeKey};
///
/// struct Celsius(f64);
///
/// impl KeyToken for Celsius {
///     fn push_token(&self, key: &mut String) {
///         self.0.push_token(key);
///     }
/// }
///
/// let key = CompositeKey::from_tokens(&[&Celsius(21.5), &"room"]);
/// assert_eq!(key.as_str(), "21.5,\"room\"");
/// ```
pub trait KeyToken {
    /// Appends this value's token to `key`.
    fn push_token(&self, key: &mut String);

    /// Appends handles for the shared values this token refers to.
    ///
    /// Types compared by value keep the default, which records nothing.
    /// Types rendered as `<id>` must push a handle for that identity, or
    /// entries keyed by them are never reclaimed.
    fn push_liveness(&self, _handles: &mut Vec<ArgumentLiveness>) {}

    /// Returns this value's token as a new string.
    fn to_token(&self) -> String {
        let mut token = String::new();
        self.push_token(&mut token);
        token
    }
}

/// Appends `text` as a quoted token, escaping every quote and backslash.
pub fn push_quoted(key: &mut String, text: &str) {
    key.reserve(text.len() + 2);
    key.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            key.push('\\');
        }
        key.push(c);
    }
    key.push('"');
}

macro_rules! literal_token {
    ($($t:ty),* $(,)?) => {
        $(
            impl KeyToken for $t {
                #[inline]
                fn push_token(&self, key: &mut String) {
                    // Writing into a String cannot fail
                    let _ = write!(key, "{}", self);
                }
            }
        )*
    };
}

literal_token!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool);

impl KeyToken for str {
    #[inline]
    fn push_token(&self, key: &mut String) {
        push_quoted(key, self);
    }
}

impl KeyToken for String {
    #[inline]
    fn push_token(&self, key: &mut String) {
        push_quoted(key, self);
    }
}

impl KeyToken for char {
    fn push_token(&self, key: &mut String) {
        let mut buf = [0u8; 4];
        push_quoted(key, self.encode_utf8(&mut buf));
    }
}

impl KeyToken for () {
    #[inline]
    fn push_token(&self, key: &mut String) {
        key.push_str("undefined");
    }
}

/// `None` renders as `null` and `Some(v)` as the token of `v`. When that
/// token is itself absent (`Some(None)`), it is wrapped as `some(null)` so
/// nested options stay distinct.
impl<T: KeyToken> KeyToken for Option<T> {
    fn push_token(&self, key: &mut String) {
        match self {
            Some(value) => {
                let start = key.len();
                value.push_token(key);
                let inner = &key[start..];
                if inner == "null" || inner.starts_with("some(") {
                    key.insert_str(start, "some(");
                    key.push(')');
                }
            }
            None => key.push_str("null"),
        }
    }

    fn push_liveness(&self, handles: &mut Vec<ArgumentLiveness>) {
        if let Some(value) = self {
            value.push_liveness(handles);
        }
    }
}

impl<T: KeyToken + ?Sized> KeyToken for &T {
    #[inline]
    fn push_token(&self, key: &mut String) {
        (**self).push_token(key);
    }

    #[inline]
    fn push_liveness(&self, handles: &mut Vec<ArgumentLiveness>) {
        (**self).push_liveness(handles);
    }
}

/// Shared values are compared by identity: every clone of the same `Arc`
/// renders the same `<id>`, two separately allocated `Arc`s never do.
///
/// This holds for every `T`, text included: two `Arc<str>` holding `"x"`
/// are different arguments. Pass `&*arc` (a `&str`) to compare shared text
/// by value.
impl<T: ?Sized + Send + Sync + 'static> KeyToken for Arc<T> {
    fn push_token(&self, key: &mut String) {
        let id = IdentityRegistry::global().id_for(self);
        let _ = write!(key, "{}", id);
    }

    fn push_liveness(&self, handles: &mut Vec<ArgumentLiveness>) {
        handles.push(Arc::new(Arc::downgrade(self)));
    }
}

/// Rendered key for one ordered argument list.
///
/// Two argument lists map to the same `CompositeKey` exactly when they have
/// the same length and their tokens are pairwise equal. Equality and
/// hashing only look at the text; the handles travel along so the cache can
/// tell when the key has become unreachable.
#[derive(Clone, Default)]
pub struct CompositeKey {
    text: String,
    handles: Vec<ArgumentLiveness>,
}

impl CompositeKey {
    /// Key of the empty argument list (used by getters).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a key from a heterogeneous list of tokens.
    pub fn from_tokens(tokens: &[&dyn KeyToken]) -> Self {
        let mut builder = KeyBuilder::new();
        for token in tokens {
            builder.push(*token);
        }
        builder.finish()
    }

    /// Returns the rendered key text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns `false` once any shared argument of this key is dropped.
    ///
    /// Keys made only of value-compared arguments are always reachable.
    pub fn is_reachable(&self) -> bool {
        self.handles.iter().all(|handle| handle.is_alive())
    }

    /// Number of shared arguments tracked by this key.
    pub fn tracked_count(&self) -> usize {
        self.handles.len()
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for CompositeKey {}

impl Hash for CompositeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("text", &self.text)
            .field("handles", &self.handles.len())
            .finish()
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Incremental composite-key writer that places separators between tokens.
#[derive(Default)]
pub struct KeyBuilder {
    key: String,
    handles: Vec<ArgumentLiveness>,
    count: usize,
}

impl KeyBuilder {
    /// Creates a builder for an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next argument's token and collects its handles.
    pub fn push<T: KeyToken + ?Sized>(&mut self, value: &T) -> &mut Self {
        if self.count > 0 {
            self.key.push(TOKEN_SEPARATOR);
        }
        value.push_token(&mut self.key);
        value.push_liveness(&mut self.handles);
        self.count += 1;
        self
    }

    /// Consumes the builder, returning the finished key.
    pub fn finish(self) -> CompositeKey {
        CompositeKey {
            text: self.key,
            handles: self.handles,
        }
    }
}

/// An ordered argument list that can be rendered into a [`CompositeKey`].
///
/// Implemented for tuples of up to twelve [`KeyToken`]s, slices, arrays and
/// vectors (including `[&dyn KeyToken]` for mixed lists), and for
/// `CompositeKey` itself (a pre-rendered key).
pub trait ArgumentList {
    fn composite_key(&self) -> CompositeKey;
}

impl ArgumentList for CompositeKey {
    fn composite_key(&self) -> CompositeKey {
        self.clone()
    }
}

impl<T: KeyToken> ArgumentList for [T] {
    fn composite_key(&self) -> CompositeKey {
        let mut builder = KeyBuilder::new();
        for value in self {
            builder.push(value);
        }
        builder.finish()
    }
}

impl<T: KeyToken, const N: usize> ArgumentList for [T; N] {
    fn composite_key(&self) -> CompositeKey {
        self.as_slice().composite_key()
    }
}

impl<T: KeyToken> ArgumentList for Vec<T> {
    fn composite_key(&self) -> CompositeKey {
        self.as_slice().composite_key()
    }
}

impl<A: ArgumentList + ?Sized> ArgumentList for &A {
    fn composite_key(&self) -> CompositeKey {
        (**self).composite_key()
    }
}

impl ArgumentList for () {
    fn composite_key(&self) -> CompositeKey {
        CompositeKey::empty()
    }
}

macro_rules! tuple_argument_list {
    ($($name:ident)+) => {
        impl<$($name: KeyToken),+> ArgumentList for ($($name,)+) {
            #[allow(non_snake_case)]
            fn composite_key(&self) -> CompositeKey {
                let ($($name,)+) = self;
                let mut builder = KeyBuilder::new();
                $( builder.push($name); )+
                builder.finish()
            }
        }
    };
}

tuple_argument_list!(A);
tuple_argument_list!(A B);
tuple_argument_list!(A B C);
tuple_argument_list!(A B C D);
tuple_argument_list!(A B C D E);
tuple_argument_list!(A B C D E F);
tuple_argument_list!(A B C D E F G);
tuple_argument_list!(A B C D E F G H);
tuple_argument_list!(A B C D E F G H I);
tuple_argument_list!(A B C D E F G H I J);
tuple_argument_list!(A B C D E F G H I J K);
tuple_argument_list!(A B C D E F G H I J K L);
