use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::keys::{push_quoted, ArgumentLiveness, KeyToken};
use crate::{IdentityRegistry, MemoError, ObjectId};

/// Shared callable carried by [`Value::Callable`].
pub type Callable = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A dynamically typed argument.
///
/// Useful when the argument list of a memoized call is only known at run
/// time. Primitives are compared by value, objects and callables by
/// identity.
///
/// # Examples
///
/// ```
/// use memoscope_core::{ArgumentList, Value};
/// use std::sync::Arc;
///
/// let object = Value::object(Arc::new(vec![1u8, 2, 3]));
/// let args = vec![Value::Int(1), Value::from("a"), Value::Null, object.clone()];
///
/// let key = args.composite_key();
/// assert!(key.as_str().starts_with("1,\"a\",null,<"));
/// assert_eq!(key, vec![Value::Int(1), Value::from("a"), Value::Null, object].composite_key());
/// ```
#[derive(Clone)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Object(Arc<dyn Any + Send + Sync>),
    Callable(Callable),
}

impl Value {
    /// Wraps a shared object.
    pub fn object<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Value::Object(value)
    }

    /// Wraps a shared callable.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Callable(Arc::new(f))
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Text(_) => "text",
            Value::Object(_) => "object",
            Value::Callable(_) => "callable",
        }
    }

    /// Returns `true` for objects and callables.
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Callable(_))
    }

    /// Returns the surrogate id of an object or callable.
    ///
    /// # Errors
    ///
    /// [`MemoError::NotAReference`] for every primitive variant.
    pub fn surrogate_id(&self) -> Result<ObjectId, MemoError> {
        IdentityRegistry::global().id_for_value(self)
    }

    /// Returns `true` if both values are the same reference, or equal
    /// primitives.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }
}

impl IdentityRegistry {
    /// Returns the surrogate id of a dynamically typed value.
    ///
    /// # Errors
    ///
    /// [`MemoError::NotAReference`] if `value` is a primitive; those are
    /// rendered as literal tokens and never registered.
    pub fn id_for_value(&self, value: &Value) -> Result<ObjectId, MemoError> {
        match value {
            Value::Object(object) => Ok(self.id_for(object)),
            Value::Callable(callable) => Ok(self.id_for(callable)),
            primitive => Err(MemoError::NotAReference {
                kind: primitive.kind(),
            }),
        }
    }
}

impl KeyToken for Value {
    fn push_token(&self, key: &mut String) {
        match self {
            Value::Null => key.push_str("null"),
            Value::Undefined => key.push_str("undefined"),
            Value::Bool(b) => b.push_token(key),
            Value::Int(i) => i.push_token(key),
            Value::Float(f) => f.push_token(key),
            Value::Text(s) => push_quoted(key, s),
            Value::Object(object) => object.push_token(key),
            Value::Callable(callable) => callable.push_token(key),
        }
    }

    fn push_liveness(&self, handles: &mut Vec<ArgumentLiveness>) {
        match self {
            Value::Object(object) => object.push_liveness(handles),
            Value::Callable(callable) => callable.push_liveness(handles),
            _ => {}
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Undefined => f.write_str("Undefined"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::Object(object) => write!(f, "Object({:p})", Arc::as_ptr(object)),
            Value::Callable(callable) => write!(f, "Callable({:p})", Arc::as_ptr(callable)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArgumentList;

    #[test]
    fn test_primitive_tokens() {
        assert_eq!(Value::Null.to_token(), "null");
        assert_eq!(Value::Undefined.to_token(), "undefined");
        assert_eq!(Value::Bool(false).to_token(), "false");
        assert_eq!(Value::Int(-12).to_token(), "-12");
        assert_eq!(Value::Float(0.5).to_token(), "0.5");
        assert_eq!(Value::from("q\"t").to_token(), r#""q\"t""#);
    }

    #[test]
    fn test_primitive_has_no_surrogate() {
        let err = Value::Int(3).surrogate_id().unwrap_err();
        assert_eq!(err, MemoError::NotAReference { kind: "number" });
        assert!(Value::from("x").surrogate_id().is_err());
        assert!(Value::Null.surrogate_id().is_err());
    }

    #[test]
    fn test_objects_by_identity() {
        let a = Value::object(Arc::new(()));
        let b = Value::object(Arc::new(()));
        assert_eq!(a.surrogate_id().unwrap(), a.clone().surrogate_id().unwrap());
        assert_ne!(a.surrogate_id().unwrap(), b.surrogate_id().unwrap());
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert_eq!(a.to_token(), a.surrogate_id().unwrap().to_string());
    }

    #[test]
    fn test_callables_by_identity() {
        let f = Value::callable(|args| args.first().cloned().unwrap_or(Value::Undefined));
        let g = Value::callable(|args| args.first().cloned().unwrap_or(Value::Undefined));
        assert!(f.is_reference());
        assert_ne!(f.to_token(), g.to_token());
        assert_eq!(f.to_token(), f.clone().to_token());
    }

    #[test]
    fn test_value_lists_match_typed_lists() {
        let dynamic = vec![Value::Int(1), Value::from("a"), Value::Bool(true)];
        assert_eq!(dynamic.composite_key(), (1, "a", true).composite_key());
    }

    #[test]
    fn test_option_conversion() {
        assert!(matches!(Value::from(None::<i64>), Value::Null));
        assert!(matches!(Value::from(Some(4i64)), Value::Int(4)));
    }
}
