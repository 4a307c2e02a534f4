use thiserror::Error;

/// Errors raised by the memoization core itself.
///
/// Failures of the memoized computation are never wrapped in this type: they
/// are returned unchanged by [`ScopedCache::try_fetch`](crate::ScopedCache::try_fetch).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoError {
    /// A surrogate id was requested for a value compared by value.
    ///
    /// Only objects and callables have an identity; primitives must be
    /// rendered through their literal token instead.
    #[error("cannot assign a surrogate id to a {kind} value: only objects and callables have an identity")]
    NotAReference { kind: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_reference_message() {
        let err = MemoError::NotAReference { kind: "text" };
        assert!(err.to_string().contains("text value"));
    }
}
