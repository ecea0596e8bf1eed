use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::key_order::PRIORITY_KEY;
use crate::node::Node;
use crate::path::Path;

/// Server patch that replaces everything in the path interval `(start, end]`.
/// A missing bound is open.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeMerge {
    start: Option<Path>,
    end: Option<Path>,
    patch: Node,
}

impl RangeMerge {
    pub fn new(start: Option<Path>, end: Option<Path>, patch: Node) -> Self {
        Self { start, end, patch }
    }

    pub fn start(&self) -> Option<&Path> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&Path> {
        self.end.as_ref()
    }

    pub fn patch(&self) -> &Node {
        &self.patch
    }

    pub fn apply_to_node(&self, node: &Node) -> Node {
        self.update_range(&Path::root(), node, &self.patch)
    }

    fn update_range(&self, current: &Path, node: &Node, update: &Node) -> Node {
        let start_cmp = self
            .start
            .as_ref()
            .map_or(Ordering::Greater, |start| current.compare(start));
        let end_cmp = self
            .end
            .as_ref()
            .map_or(Ordering::Less, |end| current.compare(end));
        let start_in_node = self.start.as_ref().is_some_and(|start| current.contains(start));
        let end_in_node = self.end.as_ref().is_some_and(|end| current.contains(end));

        if start_cmp == Ordering::Greater && end_cmp == Ordering::Less && !end_in_node {
            return update.clone();
        }
        if start_cmp == Ordering::Greater && end_in_node && update.is_leaf() {
            return update.clone();
        }
        if start_cmp == Ordering::Greater && end_cmp == Ordering::Equal {
            // The end boundary itself: a leaf there is covered by the patch.
            return if node.is_leaf() { Node::Empty } else { node.clone() };
        }
        if start_in_node || end_in_node {
            let keys: BTreeSet<&str> = node
                .children()
                .chain(update.children())
                .map(|(key, _)| key)
                .collect();
            let mut updated = node.clone();
            let apply = |key: &str, updated: &mut Node| {
                let current_child = node.get_immediate_child(key);
                let new_child =
                    self.update_range(&current.child(key), &current_child, &update.get_immediate_child(key));
                if !new_child.ptr_eq(&current_child) {
                    *updated = updated.update_immediate_child(key, new_child);
                }
            };
            for key in keys {
                apply(key, &mut updated);
            }
            // Priority goes last so the node is not empty when it is applied.
            if !update.priority().is_empty() || !node.priority().is_empty() {
                apply(PRIORITY_KEY, &mut updated);
            }
            return updated;
        }
        debug_assert!(
            end_cmp == Ordering::Greater || start_cmp != Ordering::Greater,
            "invalid range for update"
        );
        node.clone()
    }
}
