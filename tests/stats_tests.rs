/// Integration tests for cache statistics and custom cache names

#[cfg(feature = "stats")]
#[cfg(test)]
mod tests {
    use memoscope::memoize;
    use serial_test::serial;

    // Define functions outside tests to ensure they share the same statics
    #[memoize(name = "custom_stats_cache")]
    fn triple_with_custom_name(x: i32) -> i32 {
        x * 3
    }

    #[memoize]
    fn triple_default_name(x: i32) -> i32 {
        x * 3
    }

    #[memoize(name = "checked_halve")]
    fn checked_halve(x: i32) -> Result<i32, String> {
        if x % 2 == 0 {
            Ok(x / 2)
        } else {
            Err(format!("{} is odd", x))
        }
    }

    #[test]
    #[serial]
    fn test_custom_name_registration() {
        triple_with_custom_name(1);
        triple_default_name(1);

        let registered = memoscope::stats_registry::list();
        assert!(
            registered.contains(&"custom_stats_cache".to_string()),
            "Custom name should be registered"
        );
        assert!(
            registered.contains(&"triple_default_name".to_string()),
            "Default name should be registered"
        );
    }

    #[test]
    #[serial]
    fn test_hits_and_misses() {
        // Register before resetting
        triple_with_custom_name(0);
        memoscope::stats_registry::reset("custom_stats_cache");

        triple_with_custom_name(1001); // Miss
        triple_with_custom_name(1001); // Hit
        triple_with_custom_name(1002); // Miss
        triple_with_custom_name(1001); // Hit

        let stats = memoscope::stats_registry::get("custom_stats_cache")
            .expect("Stats should be available for custom_stats_cache");
        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 2);
        assert_eq!(stats.calls(), 4);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    #[serial]
    fn test_failures_are_counted_as_misses() {
        checked_halve(0);
        memoscope::stats_registry::reset("checked_halve");

        assert!(checked_halve(3).is_err()); // Miss, failure
        assert!(checked_halve(3).is_err()); // Miss, failure
        assert_eq!(checked_halve(8), Ok(4)); // Miss
        assert_eq!(checked_halve(8), Ok(4)); // Hit

        let stats = memoscope::stats_registry::get_ref("checked_halve").unwrap();
        assert_eq!(stats.failures(), 2);
        assert_eq!(stats.misses(), 3);
        assert_eq!(stats.hits(), 1);
    }

    #[test]
    #[serial]
    fn test_unknown_name() {
        assert!(memoscope::stats_registry::get("never_registered_cache").is_none());
        assert!(!memoscope::stats_registry::reset("never_registered_cache"));
    }
}
