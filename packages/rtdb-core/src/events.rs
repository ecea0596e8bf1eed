use crate::change::{Change, ChangeKind};
use crate::index::Index;
use crate::indexed_node::IndexedNode;
use crate::node::NamedNode;

/// Put the changes of one operation in delivery order: removals, additions,
/// moves, changes, then the value change. Child changes within a group are
/// sorted under `index` and get the key of their predecessor in
/// `event_cache`. A changed child whose indexed value moved also yields a
/// move.
pub fn order_changes(changes: Vec<Change>, event_cache: &IndexedNode, index: &Index) -> Vec<Change> {
    let moves: Vec<Change> = changes
        .iter()
        .filter(|change| change.kind == ChangeKind::ChildChanged)
        .filter_map(|change| {
            let old = change.old_indexed_node.as_ref()?;
            let key = change.child_key.as_ref()?;
            index
                .indexed_value_changed(old.node(), change.indexed_node.node())
                .then(|| Change::child_moved(key.clone(), change.indexed_node.clone()))
        })
        .collect();

    let mut ordered = Vec::with_capacity(changes.len() + moves.len());
    for kind in [ChangeKind::ChildRemoved, ChangeKind::ChildAdded] {
        push_sorted(&mut ordered, of_kind(&changes, kind), event_cache, index);
    }
    push_sorted(&mut ordered, moves, event_cache, index);
    push_sorted(
        &mut ordered,
        of_kind(&changes, ChangeKind::ChildChanged),
        event_cache,
        index,
    );
    ordered.extend(of_kind(&changes, ChangeKind::Value));
    ordered
}

fn of_kind(changes: &[Change], kind: ChangeKind) -> Vec<Change> {
    changes.iter().filter(|c| c.kind == kind).cloned().collect()
}

fn named(change: &Change) -> NamedNode {
    NamedNode::new(
        change.child_key.clone().unwrap_or_default(),
        change.indexed_node.node().clone(),
    )
}

fn push_sorted(out: &mut Vec<Change>, mut group: Vec<Change>, event_cache: &IndexedNode, index: &Index) {
    group.sort_by(|a, b| index.compare(&named(a), &named(b)));
    for change in group {
        let prev_key = match (change.kind, change.child_key.as_deref()) {
            (ChangeKind::ChildRemoved, _) | (_, None) => None,
            (_, Some(key)) => event_cache.predecessor_child_key(key, change.indexed_node.node(), index),
        };
        out.push(change.with_prev_key(prev_key));
    }
}
