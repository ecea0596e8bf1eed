use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use crate::index::Index;
use crate::node::{NamedNode, Node};

/// Children kept in the node's own key order, or sorted under the index.
#[derive(Clone, Debug)]
enum Ordered {
    Fallback,
    Materialized(Arc<Vec<NamedNode>>),
}

/// A node together with the order its children take under an [`Index`].
///
/// The sorted view is built on first use and cached. Any structural update
/// produces a fresh, not yet computed view unless the old one was the key
/// order fallback and the new child leaves it valid.
#[derive(Clone, Debug)]
pub struct IndexedNode {
    node: Node,
    index: Index,
    ordered: OnceLock<Ordered>,
}

impl IndexedNode {
    pub fn new(node: Node, index: Index) -> Self {
        Self {
            node,
            index,
            ordered: OnceLock::new(),
        }
    }

    pub fn with_key_order(node: Node) -> Self {
        Self::new(node, Index::Key)
    }

    fn with_state(node: Node, index: Index, state: Option<Ordered>) -> Self {
        let ordered = state.map(OnceLock::from).unwrap_or_default();
        Self {
            node,
            index,
            ordered,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn has_index(&self, index: &Index) -> bool {
        &self.index == index
    }

    fn ordered(&self) -> &Ordered {
        self.ordered.get_or_init(|| {
            if self.index == Index::Key {
                return Ordered::Fallback;
            }
            let defined = self
                .node
                .children()
                .any(|(_, child)| self.index.is_defined_on(child));
            if !defined {
                return Ordered::Fallback;
            }
            let mut sorted: Vec<NamedNode> = self
                .node
                .children()
                .map(|(name, child)| NamedNode::new(name, child.clone()))
                .collect();
            sorted.sort_by(|a, b| self.index.compare(a, b));
            Ordered::Materialized(Arc::new(sorted))
        })
    }

    /// Whether the children needed an index-specific sort.
    pub fn is_materialized(&self) -> bool {
        matches!(self.ordered(), Ordered::Materialized(_))
    }

    pub fn update_child(&self, key: &str, child: Node) -> IndexedNode {
        let node = self.node.update_immediate_child(key, child.clone());
        let state = match self.ordered.get() {
            Some(Ordered::Fallback) if !self.index.is_defined_on(&child) => Some(Ordered::Fallback),
            _ => None,
        };
        Self::with_state(node, self.index.clone(), state)
    }

    pub(crate) fn update_priority(&self, priority: Node) -> IndexedNode {
        Self::with_state(
            self.node.replace_priority(priority),
            self.index.clone(),
            self.ordered.get().cloned(),
        )
    }

    pub fn with_index(&self, index: Index) -> IndexedNode {
        if index == self.index {
            return self.clone();
        }
        Self::new(self.node.clone(), index)
    }

    pub fn first_child(&self) -> Option<NamedNode> {
        match self.ordered() {
            Ordered::Fallback => self.node.first_child(),
            Ordered::Materialized(sorted) => sorted.first().cloned(),
        }
    }

    pub fn last_child(&self) -> Option<NamedNode> {
        match self.ordered() {
            Ordered::Fallback => self.node.last_child(),
            Ordered::Materialized(sorted) => sorted.last().cloned(),
        }
    }

    /// Key of the child ordered right before `(key, child)`. `index` must be
    /// the index this node is ordered by.
    pub fn predecessor_child_key(&self, key: &str, child: &Node, index: &Index) -> Option<String> {
        debug_assert_eq!(index, &self.index, "predecessor lookup under a foreign index");
        match self.ordered() {
            Ordered::Fallback => self.node.predecessor_child_key(key),
            Ordered::Materialized(sorted) => {
                let target = NamedNode::new(key, child.clone());
                let at = sorted
                    .binary_search_by(|probe| self.index.compare(probe, &target))
                    .ok()?;
                at.checked_sub(1).map(|i| sorted[i].name.clone())
            }
        }
    }

    /// Children in index order.
    pub fn iter(&self) -> Box<dyn DoubleEndedIterator<Item = NamedNode> + '_> {
        match self.ordered() {
            Ordered::Fallback => Box::new(
                self.node
                    .children()
                    .map(|(name, child)| NamedNode::new(name, child.clone())),
            ),
            Ordered::Materialized(sorted) => Box::new(sorted.iter().cloned()),
        }
    }

    /// Children at or after `start` in index order.
    pub fn iter_from<'a>(&'a self, start: &'a NamedNode) -> impl Iterator<Item = NamedNode> + 'a {
        self.iter()
            .skip_while(move |child| self.index.compare(child, start) == Ordering::Less)
    }

    /// Children at or before `start`, walking backwards in index order.
    pub fn rev_from<'a>(&'a self, start: &'a NamedNode) -> impl Iterator<Item = NamedNode> + 'a {
        self.iter()
            .rev()
            .skip_while(move |child| self.index.compare(child, start) == Ordering::Greater)
    }
}

impl PartialEq for IndexedNode {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.node == other.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_value(&value).unwrap()
    }

    fn names(indexed: &IndexedNode) -> Vec<String> {
        indexed.iter().map(|n| n.name).collect()
    }

    #[test]
    fn key_index_never_materializes() {
        let indexed = IndexedNode::with_key_order(node(json!({"b": 1, "a": 2})));
        assert!(!indexed.is_materialized());
        assert_eq!(names(&indexed), vec!["a", "b"]);
    }

    #[test]
    fn falls_back_when_no_child_defines_the_indexed_attribute() {
        let index = Index::path(Path::parse("age")).unwrap();
        let indexed = IndexedNode::new(node(json!({"b": {"x": 1}, "a": {"x": 2}})), index);
        assert!(!indexed.is_materialized());
        assert_eq!(names(&indexed), vec!["a", "b"]);
    }

    #[test]
    fn value_index_sorts_by_value() {
        let indexed = IndexedNode::new(node(json!({"a": 3, "b": 1, "c": 2})), Index::Value);
        assert!(indexed.is_materialized());
        assert_eq!(names(&indexed), vec!["b", "c", "a"]);
        assert_eq!(indexed.first_child().unwrap().name, "b");
        assert_eq!(indexed.last_child().unwrap().name, "a");
        let c = node(json!(2));
        assert_eq!(
            indexed.predecessor_child_key("c", &c, &Index::Value).as_deref(),
            Some("b")
        );
    }

    #[test]
    fn adding_a_defined_child_rebuilds_the_order() {
        let index = Index::path(Path::parse("age")).unwrap();
        let indexed = IndexedNode::new(node(json!({"a": {"x": 1}, "b": {"x": 2}})), index.clone());
        assert!(!indexed.is_materialized());

        let undefined = indexed.update_child("c", node(json!({"x": 3})));
        assert!(!undefined.is_materialized());

        let defined = undefined.update_child("d", node(json!({"age": 1})));
        assert!(defined.is_materialized());
        assert_eq!(names(&defined), vec!["a", "b", "c", "d"]);

        let reordered = defined.update_child("a", node(json!({"age": 5})));
        assert_eq!(names(&reordered), vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn removing_the_last_defined_child_goes_back_to_fallback() {
        let indexed = IndexedNode::new(
            node(json!({"a": {".value": 1, ".priority": 1}, "b": 2})),
            Index::Priority,
        );
        assert!(indexed.is_materialized());
        let removed = indexed.update_child("a", Node::Empty);
        assert!(!removed.is_materialized());
        assert_eq!(names(&removed), vec!["b"]);
    }

    #[test]
    fn iteration_from_a_post() {
        let indexed = IndexedNode::new(node(json!({"a": 1, "b": 2, "c": 3})), Index::Value);
        let post = Index::Value.make_post(&node(json!(2)), "b");
        let forward: Vec<String> = indexed.iter_from(&post).map(|n| n.name).collect();
        assert_eq!(forward, vec!["b", "c"]);
        let backward: Vec<String> = indexed.rev_from(&post).map(|n| n.name).collect();
        assert_eq!(backward, vec!["b", "a"]);
    }
}
