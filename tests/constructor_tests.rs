/// Integration tests for memoized constructors

use memoscope::memoize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static COLORS_BUILT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, PartialEq)]
struct Color {
    r: u8,
    g: u8,
    b: u8,
}

impl Color {
    #[memoize(kind = "constructor")]
    fn rgb(r: u8, g: u8, b: u8) -> Arc<Color> {
        COLORS_BUILT.fetch_add(1, Ordering::SeqCst);
        Arc::new(Color { r, g, b })
    }
}

#[test]
fn test_equal_arguments_share_instance() {
    let red = Color::rgb(255, 0, 0);
    let also_red = Color::rgb(255, 0, 0);
    let blue = Color::rgb(0, 0, 255);

    assert!(Arc::ptr_eq(&red, &also_red));
    assert!(!Arc::ptr_eq(&red, &blue));
    assert_eq!(*blue, Color { r: 0, g: 0, b: 255 });
    assert_eq!(COLORS_BUILT.load(Ordering::SeqCst), 2);
}

#[derive(Clone, Debug, PartialEq)]
struct Port(u16);

impl Port {
    #[memoize(kind = "constructor")]
    fn parse(text: &str) -> Result<Self, String> {
        text.parse()
            .map(Port)
            .map_err(|_| format!("not a port: {}", text))
    }
}

#[test]
fn test_fallible_constructor_caches_only_success() {
    assert_eq!(Port::parse("8080"), Ok(Port(8080)));
    assert_eq!(Port::parse("8080"), Ok(Port(8080)));
    assert_eq!(Port::parse("http"), Err("not a port: http".to_string()));
    assert_eq!(Port::parse("http"), Err("not a port: http".to_string()));
}

#[derive(Clone, Debug, PartialEq)]
struct Label(String);

static LABELS_BUILT: AtomicUsize = AtomicUsize::new(0);

impl Label {
    #[memoize(kind = "constructor", name = "label_new")]
    fn new(text: &str) -> Self {
        LABELS_BUILT.fetch_add(1, Ordering::SeqCst);
        Label(text.to_string())
    }
}

#[test]
fn test_constructor_returning_self() {
    assert_eq!(Label::new("a"), Label("a".to_string()));
    assert_eq!(Label::new("a"), Label("a".to_string()));
    assert_eq!(Label::new("b"), Label("b".to_string()));
    assert_eq!(LABELS_BUILT.load(Ordering::SeqCst), 2);
}
