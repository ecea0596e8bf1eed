//! Shared fixtures for rtdb-core test suites: JSON node builders, a
//! full-replay oracle for the write log and proptest strategies.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rtdb_core::{CompoundWrite, Node, Path, WriteId, WriteLog, WritePayload, WriteRecord};
use serde_json::{Map, Value};

/// Build a node from a JSON literal. Panics on values the core rejects.
pub fn node(value: Value) -> Node {
    Node::from_value(&value).unwrap_or_else(|e| panic!("invalid node literal {value}: {e}"))
}

pub fn path(s: &str) -> Path {
    Path::parse(s)
}

/// Overlay obtained by replaying every visible write in id order.
pub fn replay_overlay(writes: &[WriteRecord]) -> CompoundWrite {
    let mut ordered: Vec<&WriteRecord> = writes.iter().filter(|w| w.visible).collect();
    ordered.sort_by_key(|w| w.write_id);
    ordered
        .into_iter()
        .fold(CompoundWrite::empty(), |overlay, write| match &write.payload {
            WritePayload::Overwrite(node) => overlay.add_write(&write.path, node.clone()),
            WritePayload::Merge(children) => overlay.add_compound_write(&write.path, children),
        })
}

/// Paths worth probing when comparing two overlays: every path a write
/// touches, its ancestors, and the root.
pub fn probe_paths(writes: &[WriteRecord]) -> Vec<Path> {
    let mut probes = vec![Path::root()];
    for write in writes {
        for affected in write.affected_paths() {
            let mut current = Some(affected);
            while let Some(p) = current {
                current = p.parent();
                if !probes.contains(&p) {
                    probes.push(p);
                }
            }
        }
    }
    probes
}

/// Compare the log's incrementally maintained overlay against a replay.
/// Returns the first probe path where the two disagree.
pub fn overlay_mismatch(log: &WriteLog, base: &Node) -> Option<Path> {
    let expected = replay_overlay(log.all_writes());
    let actual = log.visible_overlay();
    if expected.apply_to_node(base) != actual.apply_to_node(base) {
        return Some(Path::root());
    }
    probe_paths(log.all_writes())
        .into_iter()
        .find(|p| expected.complete_node_at_path(p) != actual.complete_node_at_path(p))
}

/// Step of a generated write-log workload.
#[derive(Clone, Debug)]
pub enum WriteOp {
    Overwrite {
        path: Path,
        value: Value,
        visible: bool,
    },
    Merge {
        path: Path,
        children: BTreeMap<String, Value>,
    },
    /// Remove the pending write at this position modulo the pending count.
    Remove(usize),
}

/// Run a workload against a fresh log, numbering writes from 1.
pub fn run_write_ops(ops: &[WriteOp]) -> WriteLog {
    let mut log = WriteLog::new();
    let mut next_id: WriteId = 1;
    for op in ops {
        match op {
            WriteOp::Overwrite {
                path,
                value,
                visible,
            } => {
                log.add_overwrite(path.clone(), node(value.clone()), next_id, *visible)
                    .unwrap_or_else(|e| panic!("overwrite {next_id} rejected: {e}"));
                next_id += 1;
            }
            WriteOp::Merge { path, children } => {
                let map: Map<String, Value> = children.clone().into_iter().collect();
                let changed = CompoundWrite::from_value_map(&map)
                    .unwrap_or_else(|e| panic!("merge {next_id} rejected: {e}"));
                log.add_merge(path.clone(), changed, next_id)
                    .unwrap_or_else(|e| panic!("merge {next_id} rejected: {e}"));
                next_id += 1;
            }
            WriteOp::Remove(position) => {
                if log.is_empty() {
                    continue;
                }
                let id = log.all_writes()[position % log.len()].write_id;
                log.remove(id)
                    .unwrap_or_else(|e| panic!("remove {id} failed: {e}"));
            }
        }
    }
    log
}

/// Keys mixing integer-like and plain names so both orderings are exercised.
pub fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("c".to_string()),
        Just("1".to_string()),
        Just("2".to_string()),
        Just("10".to_string()),
    ]
}

pub fn arb_path(max_depth: usize) -> impl Strategy<Value = Path> {
    prop::collection::vec(arb_key(), 0..=max_depth).prop_map(Path::from_segments)
}

pub fn arb_leaf_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

/// JSON values that survive `Node::from_value(..).val(false)` unchanged:
/// no nulls, no empty containers, and object keys that never look like
/// array indices.
pub fn arb_round_trip_value() -> impl Strategy<Value = Value> {
    arb_leaf_value().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 1..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Small trees keyed with `arb_key`, used as write payloads.
pub fn arb_tree_value() -> impl Strategy<Value = Value> {
    arb_leaf_value().prop_recursive(2, 12, 3, |inner| {
        prop::collection::btree_map(arb_key(), inner, 1..3)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    })
}

pub fn arb_write_op() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        3 => (arb_path(3), arb_tree_value(), prop::bool::weighted(0.8)).prop_map(
            |(path, value, visible)| WriteOp::Overwrite { path, value, visible }
        ),
        2 => (arb_path(2), prop::collection::btree_map(arb_key(), arb_tree_value(), 1..3))
            .prop_map(|(path, children)| WriteOp::Merge { path, children }),
        2 => any::<usize>().prop_map(WriteOp::Remove),
    ]
}

pub fn arb_write_ops(max_len: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(arb_write_op(), 0..=max_len)
}
