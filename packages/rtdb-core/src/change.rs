use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::indexed_node::IndexedNode;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ChangeKind {
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    ChildMoved,
    Value,
}

/// One observable difference between two event caches.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub indexed_node: IndexedNode,
    pub child_key: Option<String>,
    pub old_indexed_node: Option<IndexedNode>,
    /// Key of the sibling ordered right before this child, filled in when
    /// changes are ordered for delivery.
    pub prev_key: Option<String>,
}

impl Change {
    fn new(
        kind: ChangeKind,
        indexed_node: IndexedNode,
        child_key: Option<String>,
        old_indexed_node: Option<IndexedNode>,
    ) -> Self {
        Self {
            kind,
            indexed_node,
            child_key,
            old_indexed_node,
            prev_key: None,
        }
    }

    pub fn value(snapshot: IndexedNode) -> Self {
        Self::new(ChangeKind::Value, snapshot, None, None)
    }

    pub fn child_added(key: impl Into<String>, snapshot: IndexedNode) -> Self {
        Self::new(ChangeKind::ChildAdded, snapshot, Some(key.into()), None)
    }

    pub fn child_removed(key: impl Into<String>, snapshot: IndexedNode) -> Self {
        Self::new(ChangeKind::ChildRemoved, snapshot, Some(key.into()), None)
    }

    pub fn child_changed(key: impl Into<String>, snapshot: IndexedNode, old: IndexedNode) -> Self {
        Self::new(ChangeKind::ChildChanged, snapshot, Some(key.into()), Some(old))
    }

    pub fn child_moved(key: impl Into<String>, snapshot: IndexedNode) -> Self {
        Self::new(ChangeKind::ChildMoved, snapshot, Some(key.into()), None)
    }

    pub fn with_prev_key(mut self, prev_key: Option<String>) -> Self {
        self.prev_key = prev_key;
        self
    }
}

/// Collects child changes of one operation, coalescing several changes to
/// the same child into the single change a listener should see.
#[derive(Clone, Debug, Default)]
pub struct ChangeAccumulator {
    changes: BTreeMap<String, Change>,
}

impl ChangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn track_child_change(&mut self, change: Change) -> Result<()> {
        let Some(key) = change.child_key.clone() else {
            return Err(Error::InvalidChange(format!(
                "{:?} without a child key",
                change.kind
            )));
        };
        if !matches!(
            change.kind,
            ChangeKind::ChildAdded | ChangeKind::ChildChanged | ChangeKind::ChildRemoved
        ) {
            return Err(Error::InvalidChange(format!(
                "only child changes can be tracked, got {:?}",
                change.kind
            )));
        }
        let Some(old) = self.changes.remove(&key) else {
            self.changes.insert(key, change);
            return Ok(());
        };
        let merged = match (change.kind, old.kind, old.old_indexed_node.clone()) {
            (ChangeKind::ChildAdded, ChangeKind::ChildRemoved, _) => Some(Change::child_changed(
                key.clone(),
                change.indexed_node,
                old.indexed_node,
            )),
            (ChangeKind::ChildRemoved, ChangeKind::ChildAdded, _) => None,
            (ChangeKind::ChildRemoved, ChangeKind::ChildChanged, Some(previous)) => {
                Some(Change::child_removed(key.clone(), previous))
            }
            (ChangeKind::ChildChanged, ChangeKind::ChildAdded, _) => {
                Some(Change::child_added(key.clone(), change.indexed_node))
            }
            (ChangeKind::ChildChanged, ChangeKind::ChildChanged, Some(previous)) => Some(
                Change::child_changed(key.clone(), change.indexed_node, previous),
            ),
            (new_kind, old_kind, _) => {
                self.changes.insert(key.clone(), old);
                return Err(Error::InvalidChange(format!(
                    "{new_kind:?} after {old_kind:?} for child {key}"
                )));
            }
        };
        if let Some(merged) = merged {
            self.changes.insert(key, merged);
        }
        Ok(())
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes.into_values().collect()
    }
}
