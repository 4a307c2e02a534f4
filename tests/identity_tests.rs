/// Integration tests for surrogate ids and dynamically typed arguments

use memoscope::{
    delegate_receiver, Anchor, ArgumentList, IdentityRegistry, MemoError, ScopedCache, Unscoped,
    Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_ids_are_stable_for_a_live_object() {
    let registry = IdentityRegistry::new();
    let object = Arc::new(String::from("payload"));
    let first = registry.id_for(&object);
    let second = registry.id_for(&Arc::clone(&object));
    assert_eq!(first, second);
    assert_eq!(first.to_string(), format!("<{}>", first.get()));
}

#[test]
fn test_ids_are_never_reused() {
    let registry = IdentityRegistry::new();
    let mut seen = Vec::new();
    for _ in 0..32 {
        let object = Arc::new(0u64);
        seen.push(registry.id_for(&object));
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 32);
}

#[test]
fn test_registry_does_not_keep_objects_alive() {
    let registry = IdentityRegistry::new();
    let object = Arc::new(vec![1, 2, 3]);
    let weak = Arc::downgrade(&object);
    registry.id_for(&object);
    drop(object);
    assert!(weak.upgrade().is_none());
    assert_eq!(registry.sweep(), 1);
    assert!(registry.is_empty());
}

#[test]
fn test_primitives_have_no_surrogate() {
    let err = Value::Int(3).surrogate_id().unwrap_err();
    assert!(matches!(err, MemoError::NotAReference { kind: "number" }));
    assert!(Value::Null.surrogate_id().is_err());
    assert!(Value::from("text").surrogate_id().is_err());
    assert!(Value::object(Arc::new(1u8)).surrogate_id().is_ok());
}

#[test]
fn test_dynamic_arguments_mix_values_and_identities() {
    let cache: ScopedCache<String> = ScopedCache::new("dynamic_arguments");
    let computed = AtomicUsize::new(0);
    let config = Arc::new(vec!["verbose"]);

    let call = |args: &[Value]| {
        cache.fetch(&Unscoped, args, || {
            computed.fetch_add(1, Ordering::SeqCst);
            format!("{} args", args.len())
        })
    };

    let with_config = vec![Value::from("run"), Value::object(Arc::clone(&config))];
    let with_copy = vec![Value::from("run"), Value::object(Arc::new(vec!["verbose"]))];

    assert_eq!(call(&with_config), "2 args");
    assert_eq!(call(&with_config.clone()), "2 args");
    assert_eq!(computed.load(Ordering::SeqCst), 1);

    // Same contents, different object
    assert_eq!(call(&with_copy), "2 args");
    assert_eq!(computed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_null_and_undefined_are_distinct_keys() {
    assert_ne!(
        [Value::Null].composite_key(),
        [Value::Undefined].composite_key()
    );
    assert_ne!(
        [Value::from("null")].composite_key(),
        [Value::Null].composite_key()
    );
}

#[test]
fn test_callables_compare_by_identity() {
    let double = Value::callable(|args| match args.first() {
        Some(Value::Int(i)) => Value::Int(i * 2),
        _ => Value::Null,
    });
    let same = double.clone();
    let other = Value::callable(|_| Value::Null);

    assert!(double.same(&same));
    assert!(!double.same(&other));
    assert_eq!([double.clone()].composite_key(), [same].composite_key());
    assert_ne!([double].composite_key(), [other].composite_key());
}

#[test]
fn test_dropped_dynamic_objects_are_reclaimed() {
    let cache: ScopedCache<usize> = ScopedCache::new("dynamic_reclaim");
    let kept = Value::object(Arc::new("kept"));
    cache.fetch(&Unscoped, &[Value::from(1), kept.clone()], || 1);
    for i in 0..16 {
        let transient = Value::callable(move |_| Value::Int(i));
        cache.fetch(&Unscoped, &[transient], || 2);
    }

    assert_eq!(cache.purge_unreachable(), 16);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.peek(&Unscoped, &[Value::from(1), kept]), Some(1));
}

struct Session {
    anchor: Anchor,
}

delegate_receiver!(Session => anchor);

#[test]
fn test_delegated_arguments_are_reclaimed() {
    let cache: ScopedCache<u8> = ScopedCache::new("delegated_argument");
    let session = Session {
        anchor: Anchor::new(),
    };
    assert_eq!([&session].composite_key().as_str(), session.anchor.id().to_string());
    cache.fetch(&Unscoped, &(&session, "login"), || 7);

    drop(session);
    assert_eq!(cache.purge_unreachable(), 1);
    assert!(cache.is_empty());
}
