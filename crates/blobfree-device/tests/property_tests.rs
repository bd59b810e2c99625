//! Property-based tests for property parsing and catalog matching

use blobfree_device::prelude::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,24}"
}

fn arb_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./:-]{0,24}"
}

proptest! {
    #[test]
    fn prop_parse_never_panics(dump in ".{0,512}") {
        let _ = parse_properties(&dump);
    }

    #[test]
    fn prop_well_formed_dump_round_trips(pairs in prop::collection::btree_map(arb_key(), arb_value(), 0..16)) {
        let dump: String = pairs.iter().map(|(k, v)| format!("[{k}]: [{v}]\n")).collect();
        let parsed = parse_properties(&dump);
        prop_assert_eq!(parsed.len(), pairs.len());
        for (k, v) in &pairs {
            prop_assert_eq!(parsed.get(k), Some(v));
        }
    }

    #[test]
    fn prop_exact_matches_only_equal(expected in arb_value(), actual in arb_value()) {
        let criterion = Criterion::Exact(expected.clone());
        prop_assert_eq!(criterion.accepts(Some(&actual)), expected == actual);
    }

    #[test]
    fn prop_one_of_is_membership(accepted in prop::collection::vec(arb_value(), 1..6), actual in arb_value()) {
        let criterion = Criterion::OneOf(accepted.clone());
        prop_assert_eq!(criterion.accepts(Some(&actual)), accepted.contains(&actual));
    }

    #[test]
    fn prop_missing_property_never_matches(key in arb_key(), value in arb_value()) {
        let descriptor = DeviceDescriptor {
            id: None,
            adb: BTreeMap::from([(key, Criterion::Exact(value))]),
            fastboot: BTreeMap::new(),
        };
        prop_assert!(!descriptor.matches_adb(&HashMap::new()));
    }
}
