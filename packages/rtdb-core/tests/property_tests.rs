use std::cmp::Ordering;

use proptest::prelude::*;
use rtdb_core::{compare_keys, CompoundWrite, Node, Path, MAX_NAME, MIN_NAME};
use rtdb_test_support::{
    arb_path, arb_round_trip_value, arb_tree_value, arb_write_ops, node, overlay_mismatch,
    run_write_ops,
};

fn arb_any_key() -> impl Strategy<Value = String> {
    prop_oneof![
        "-?[0-9]{1,3}",
        "[a-z0-9]{1,3}",
        Just("01".to_string()),
        Just("-0".to_string()),
        Just("2147483648".to_string()),
        Just(MIN_NAME.to_string()),
        Just(MAX_NAME.to_string()),
    ]
}

fn non_overlapping(writes: Vec<(Path, serde_json::Value)>) -> Vec<(Path, Node)> {
    let mut kept: Vec<(Path, Node)> = Vec::new();
    for (path, value) in writes {
        if kept
            .iter()
            .any(|(other, _)| other.contains(&path) || path.contains(other))
        {
            continue;
        }
        kept.push((path, node(value)));
    }
    kept
}

fn apply_all(writes: &[(Path, Node)]) -> CompoundWrite {
    writes
        .iter()
        .fold(CompoundWrite::empty(), |write, (path, n)| write.add_write(path, n.clone()))
}

proptest! {
    #[test]
    fn key_order_is_total(a in arb_any_key(), b in arb_any_key(), c in arb_any_key()) {
        prop_assert_eq!(compare_keys(&a, &b), compare_keys(&b, &a).reverse());
        prop_assert_eq!(compare_keys(&a, &a), Ordering::Equal);
        if compare_keys(&a, &b) != Ordering::Greater && compare_keys(&b, &c) != Ordering::Greater {
            prop_assert_ne!(compare_keys(&a, &c), Ordering::Greater);
        }
        if a != MIN_NAME {
            prop_assert_eq!(compare_keys(MIN_NAME, &a), Ordering::Less);
        }
        if a != MAX_NAME {
            prop_assert_eq!(compare_keys(&a, MAX_NAME), Ordering::Less);
        }
    }

    #[test]
    fn node_round_trips_plain_values(value in arb_round_trip_value()) {
        let n = Node::from_value(&value).unwrap();
        prop_assert_eq!(n.val(false), value);
    }

    #[test]
    fn hash_is_stable_and_separates_values(a in arb_tree_value(), b in arb_tree_value()) {
        let (na, nb) = (node(a.clone()), node(b.clone()));
        prop_assert_eq!(na.data_hash(), na.data_hash());
        prop_assert_eq!(na.data_hash(), node(a).data_hash());
        if na != nb {
            prop_assert_ne!(na.data_hash(), nb.data_hash());
        } else {
            prop_assert_eq!(na.data_hash(), nb.data_hash());
        }
    }

    #[test]
    fn disjoint_writes_commute(
        writes in prop::collection::vec((arb_path(3), arb_tree_value()), 0..6),
        base in arb_tree_value(),
    ) {
        let writes = non_overlapping(writes);
        let mut reversed = writes.clone();
        reversed.reverse();
        let base = node(base);
        prop_assert_eq!(
            apply_all(&writes).apply_to_node(&base),
            apply_all(&reversed).apply_to_node(&base)
        );
    }

    #[test]
    fn ancestor_write_absorbs_earlier_descendant(
        ancestor in arb_path(2),
        suffix in arb_path(2),
        deep in arb_tree_value(),
        shallow in arb_tree_value(),
        base in arb_tree_value(),
    ) {
        let deep_path = ancestor.child_path(&suffix);
        let base = node(base);
        let both = CompoundWrite::empty()
            .add_write(&deep_path, node(deep))
            .add_write(&ancestor, node(shallow.clone()));
        let alone = CompoundWrite::empty().add_write(&ancestor, node(shallow));
        prop_assert_eq!(both.apply_to_node(&base), alone.apply_to_node(&base));
    }

    #[test]
    fn write_log_overlay_matches_full_replay(
        ops in arb_write_ops(12),
        base in arb_tree_value(),
    ) {
        let log = run_write_ops(&ops);
        prop_assert_eq!(overlay_mismatch(&log, &node(base)), None);
    }
}
