/// Integration tests for `#[memoize]` on methods

use memoscope::{delegate_receiver, memoize, Anchor, Receiver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Catalog {
    anchor: Anchor,
    prices: Vec<u32>,
    computed: AtomicUsize,
}

delegate_receiver!(Catalog => anchor);

impl Catalog {
    fn new(prices: Vec<u32>) -> Self {
        Self {
            anchor: Anchor::new(),
            prices,
            computed: AtomicUsize::new(0),
        }
    }

    #[memoize]
    fn total(&self, discount: u32) -> u32 {
        self.computed.fetch_add(1, Ordering::SeqCst);
        self.prices.iter().map(|p| p.saturating_sub(discount)).sum()
    }

    #[memoize(name = "catalog_cheapest")]
    fn cheapest(&self) -> Option<u32> {
        self.computed.fetch_add(1, Ordering::SeqCst);
        self.prices.iter().copied().min()
    }
}

#[test]
fn test_method_caches_per_instance() {
    let a = Catalog::new(vec![10, 20, 30]);
    let b = Catalog::new(vec![10, 20, 30]);

    assert_eq!(a.total(5), 45);
    assert_eq!(a.total(5), 45);
    assert_eq!(a.computed.load(Ordering::SeqCst), 1);

    // Equal contents, distinct receiver: separate scope
    assert_eq!(b.total(5), 45);
    assert_eq!(b.computed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_arguments_distinguish_entries_within_instance() {
    let catalog = Catalog::new(vec![4, 8]);
    assert_eq!(catalog.total(0), 12);
    assert_eq!(catalog.total(1), 10);
    assert_eq!(catalog.total(0), 12);
    assert_eq!(catalog.computed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_methods_have_separate_caches() {
    let catalog = Catalog::new(vec![7, 3]);
    assert_eq!(catalog.cheapest(), Some(3));
    assert_eq!(catalog.total(0), 10);
    assert_eq!(catalog.cheapest(), Some(3));
    assert_eq!(catalog.computed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_replaced_instance_starts_empty() {
    let first = Catalog::new(vec![1]);
    let first_scope = first.scope_key();
    assert_eq!(first.total(0), 1);
    drop(first);

    let second = Catalog::new(vec![1]);
    assert_ne!(second.scope_key(), first_scope);
    assert_eq!(second.total(0), 1);
    assert_eq!(second.computed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cloned_anchor_is_a_new_receiver() {
    let original = Catalog::new(vec![2, 2]);
    let copy = Catalog {
        anchor: original.anchor.clone(),
        prices: original.prices.clone(),
        computed: AtomicUsize::new(0),
    };
    assert_eq!(original.total(1), 2);
    assert_eq!(copy.total(1), 2);
    assert_eq!(copy.computed.load(Ordering::SeqCst), 1);
}

struct Polygon {
    sides: Vec<f64>,
    computed: AtomicUsize,
}

impl Polygon {
    #[memoize]
    fn perimeter(self: Arc<Self>, scale: u32) -> u64 {
        self.computed.fetch_add(1, Ordering::SeqCst);
        (self.sides.iter().sum::<f64>() * scale as f64) as u64
    }
}

#[test]
fn test_arc_receiver_scopes_by_allocation() {
    let triangle = Arc::new(Polygon {
        sides: vec![3.0, 4.0, 5.0],
        computed: AtomicUsize::new(0),
    });

    assert_eq!(Arc::clone(&triangle).perimeter(2), 24);
    assert_eq!(Arc::clone(&triangle).perimeter(2), 24);
    assert_eq!(triangle.computed.load(Ordering::SeqCst), 1);

    let weak = Arc::downgrade(&triangle);
    drop(triangle);
    assert!(weak.upgrade().is_none(), "cache must not keep the receiver alive");
}
