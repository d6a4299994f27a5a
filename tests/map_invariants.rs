// ==============================================
// CROSS-OPERATION INVARIANT TESTS (integration)
// ==============================================
//
// Behavior that spans several operations and the promotion machinery, pinned
// from the outside through the public surface.

use adaptivemap::prelude::*;

// ==============================================
// Slow-path reads report what they found
// ==============================================
//
// An easy regression in this design is computing the overlay result under
// the lock and still reporting a miss. These tests pin the contract: a value
// present in either tier is returned.

mod slow_path_found_flag {
    use super::*;

    #[test]
    fn overlay_only_key_is_found() {
        let map = AdaptiveMap::new();
        map.insert(1u64, 10u64);
        // The map went stale on first insert; key 1 exists only in the
        // overlay right now.
        assert_eq!(map.get(&1).as_deref(), Some(&10));
    }

    #[test]
    fn overlay_only_key_is_plucked_with_its_value() {
        let map = AdaptiveMap::new();
        map.insert(1u64, 10u64);
        map.insert(2u64, 20u64);
        assert_eq!(map.remove(&2).as_deref(), Some(&20));
        assert_eq!(map.get(&2), None);
        assert_eq!(map.get(&1).as_deref(), Some(&10));
    }

    #[test]
    fn get_or_insert_reports_insert_flag_truthfully() {
        let map = AdaptiveMap::new();
        let (_, inserted) = map.get_or_insert(1u64, 10u64);
        assert!(inserted, "first call must report the insert");
        let (existing, inserted) = map.get_or_insert(1, 99);
        assert!(!inserted, "second call found the key and must say so");
        assert_eq!(*existing, 10);
    }
}

// ==============================================
// Promotion threshold and miss-counter reset
// ==============================================

mod promotion_accounting {
    use super::*;

    #[test]
    fn single_entry_overlay_promotes_on_first_consultation() {
        let map = AdaptiveMap::new();
        map.insert(1u64, 10u64);
        assert_eq!(map.metrics().promotions, 0);
        // One overlay consultation: miss counter 1 >= overlay size 1.
        assert_eq!(map.get(&1).as_deref(), Some(&10));
        assert_eq!(map.metrics().promotions, 1);
    }

    #[test]
    fn promoted_snapshot_serves_reads_without_further_promotions() {
        let map = AdaptiveMap::new();
        for key in 0..10u64 {
            map.insert(key, key);
        }
        for probe in 0..20u64 {
            let _ = map.get(&(100 + probe));
        }
        let promotions = map.metrics().promotions;
        assert!(promotions >= 1);
        // Every key is now in the snapshot; hits cannot promote again.
        for key in 0..10u64 {
            assert_eq!(map.get(&key).as_deref(), Some(&key));
        }
        assert_eq!(map.metrics().promotions, promotions);
    }

    #[test]
    fn miss_counter_resets_across_promotions() {
        let map = AdaptiveMap::new();
        for key in 0..8u64 {
            map.insert(key, key);
        }
        // Drain the first staleness.
        for probe in 0..16u64 {
            let _ = map.get(&(100 + probe));
        }
        assert_eq!(map.metrics().promotions, 1);
        // Re-introduce staleness; the counter must start from zero, so a
        // single miss against the 9-entry overlay cannot promote.
        map.insert(50, 50);
        let _ = map.get(&777);
        assert_eq!(map.metrics().promotions, 1);
        map.check_invariants().unwrap();
    }
}

// ==============================================
// Misuse surface
// ==============================================

mod contracts {
    use super::*;

    #[test]
    fn delete_is_remove_with_result_discarded() {
        let map = AdaptiveMap::new();
        map.insert(1u64, 10u64);
        map.delete(&1);
        assert_eq!(map.get(&1), None);
        // Absent delete is a no-op, not an error.
        map.delete(&1);
        map.check_invariants().unwrap();
    }

    #[test]
    fn default_constructed_map_is_immediately_usable() {
        let map: AdaptiveMap<String, Vec<u8>> = AdaptiveMap::default();
        map.insert("k".into(), vec![1, 2, 3]);
        assert_eq!(map.get(&"k".to_string()).as_deref(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn map_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AdaptiveMap<u64, String>>();
    }

    #[test]
    fn shared_value_is_not_copied() {
        let map = AdaptiveMap::new();
        map.insert(1u64, "payload".to_string());
        let a = map.get(&1).unwrap();
        let b = map.get(&1).unwrap();
        assert!(
            std::sync::Arc::ptr_eq(&a, &b),
            "both reads must reference the same stored allocation"
        );
    }

    #[test]
    fn invariant_error_is_reportable() {
        // The diagnostic error type behaves like a std error.
        let err = InvariantError::new("example");
        let dynamic: &dyn std::error::Error = &err;
        assert_eq!(dynamic.to_string(), "example");
    }
}
