use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::key_order::PRIORITY_KEY;
use crate::node::{NamedNode, Node};
use crate::path::Path;
use crate::trie::PersistentTrie;

/// Sparse set of node replacements keyed by path.
///
/// At most one value exists on any root-to-leaf chain: a write below an
/// existing value is folded into that value instead of stored separately.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompoundWrite {
    tree: PersistentTrie<Node>,
}

impl CompoundWrite {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from an update map. No path may be an ancestor of another.
    pub fn from_path_map(updates: impl IntoIterator<Item = (Path, Node)>) -> Result<Self> {
        let mut updates: Vec<(Path, Node)> = updates.into_iter().collect();
        updates.sort_by(|(a, _), (b, _)| a.compare(b));
        for pair in updates.windows(2) {
            let (previous, next) = (&pair[0].0, &pair[1].0);
            if previous.contains(next) {
                return Err(Error::OverlappingUpdatePaths {
                    ancestor: previous.wire_format(),
                    descendant: next.wire_format(),
                });
            }
        }
        Ok(updates
            .into_iter()
            .fold(Self::empty(), |write, (path, node)| write.add_write(&path, node)))
    }

    /// Parse an update object whose keys are relative paths.
    pub fn from_value_map(updates: &Map<String, Value>) -> Result<Self> {
        let parsed = updates
            .iter()
            .map(|(key, value)| Ok((Path::parse(key), Node::from_value(value)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_path_map(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn root_write(&self) -> Option<&Node> {
        self.tree.value()
    }

    pub fn add_write(&self, path: &Path, node: Node) -> CompoundWrite {
        if path.is_empty() {
            return Self {
                tree: PersistentTrie::with_value(node),
            };
        }
        if let Some((root_most, value)) = self.tree.find_root_most_value_and_path(path) {
            let relative = path.relative_to(&root_most).unwrap_or_default();
            let updated = value.update_child(&relative, node);
            return Self {
                tree: self.tree.set_value(&root_most, updated),
            };
        }
        Self {
            tree: self.tree.set_tree(path, PersistentTrie::with_value(node)),
        }
    }

    /// Add every write of `other`, rebased under `path`.
    pub fn add_compound_write(&self, path: &Path, other: &CompoundWrite) -> CompoundWrite {
        other
            .writes()
            .into_iter()
            .fold(self.clone(), |write, (relative, node)| {
                write.add_write(&path.child_path(&relative), node)
            })
    }

    /// Drop every write at or below `path`. Values above `path` are kept.
    pub fn remove_write(&self, path: &Path) -> CompoundWrite {
        if path.is_empty() {
            return Self::empty();
        }
        Self {
            tree: self.tree.set_tree(path, PersistentTrie::empty()),
        }
    }

    pub fn has_complete_write(&self, path: &Path) -> bool {
        self.complete_node_at_path(path).is_some()
    }

    /// The node at `path` if an ancestor-or-self write fully determines it.
    pub fn complete_node_at_path(&self, path: &Path) -> Option<Node> {
        let (root_most, value) = self.tree.find_root_most_value_and_path(path)?;
        let relative = path.relative_to(&root_most).unwrap_or_default();
        Some(value.get_child(&relative))
    }

    /// Children that are completely known at the root.
    pub fn complete_children(&self) -> Vec<NamedNode> {
        if let Some(root) = self.tree.value() {
            return root
                .children()
                .map(|(name, child)| NamedNode::new(name, child.clone()))
                .collect();
        }
        self.tree
            .child_values()
            .map(|(name, child)| NamedNode::new(name, child.clone()))
            .collect()
    }

    pub fn child_compound_write_at_path(&self, path: &Path) -> CompoundWrite {
        if path.is_empty() {
            return self.clone();
        }
        match self.complete_node_at_path(path) {
            Some(shadowing) => Self {
                tree: PersistentTrie::with_value(shadowing),
            },
            None => Self {
                tree: self.tree.subtree(path),
            },
        }
    }

    pub fn child_compound_writes(&self) -> Vec<(String, CompoundWrite)> {
        self.tree
            .children()
            .map(|(key, child)| (key.to_string(), Self { tree: child.clone() }))
            .collect()
    }

    /// Every stored write, shallow paths first.
    pub fn writes(&self) -> Vec<(Path, Node)> {
        let mut out = Vec::new();
        self.tree
            .for_each(&mut |path, node| out.push((path.clone(), node.clone())));
        out
    }

    /// Apply the writes to `node`. A stored value replaces the base subtree;
    /// a `.priority` write is applied last and only to a non-empty node.
    pub fn apply_to_node(&self, node: &Node) -> Node {
        apply_subtree(&Path::root(), &self.tree, node.clone())
    }

    /// Exported values keyed by wire path.
    pub fn val(&self, for_export: bool) -> Map<String, Value> {
        self.writes()
            .into_iter()
            .map(|(path, node)| (path.wire_format(), node.val(for_export)))
            .collect()
    }

    pub(crate) fn tree(&self) -> &PersistentTrie<Node> {
        &self.tree
    }
}

fn apply_subtree(relative: &Path, tree: &PersistentTrie<Node>, node: Node) -> Node {
    if let Some(value) = tree.value() {
        return node.update_child(relative, value.clone());
    }
    let mut node = node;
    let mut priority_write = None;
    for (key, child) in tree.children() {
        if key == PRIORITY_KEY {
            debug_assert!(child.value().is_some(), "priority writes must be leaf values");
            priority_write = child.value().cloned();
        } else {
            node = apply_subtree(&relative.child(key), child, node);
        }
    }
    if let Some(priority) = priority_write {
        if !node.get_child(relative).is_empty() {
            node = node.update_child(&relative.child(PRIORITY_KEY), priority);
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: Value) -> Node {
        Node::from_value(&value).unwrap()
    }

    fn p(s: &str) -> Path {
        Path::parse(s)
    }

    #[test]
    fn deeper_write_merges_into_ancestor_value() {
        let write = CompoundWrite::empty()
            .add_write(&p("a"), node(json!({"b": 1})))
            .add_write(&p("a/c"), node(json!(2)));
        assert_eq!(write.writes().len(), 1);
        assert_eq!(
            write.complete_node_at_path(&p("a")).unwrap().val(false),
            json!({"b": 1, "c": 2})
        );
    }

    #[test]
    fn shallower_write_shadows_deeper() {
        let write = CompoundWrite::empty()
            .add_write(&p("x/y"), Node::from(5))
            .add_write(&p("x"), Node::from(7));
        assert_eq!(write.complete_node_at_path(&p("x/y")), Some(Node::Empty));
        assert_eq!(write.complete_node_at_path(&p("x")), Some(Node::from(7)));
        assert_eq!(write.complete_node_at_path(&p("q")), None);
    }

    #[test]
    fn apply_replaces_written_subtrees() {
        let base = node(json!({"a": {"x": 1}, "b": 2}));
        let write = CompoundWrite::empty()
            .add_write(&p("a"), node(json!({"y": 3})))
            .add_write(&p("c"), Node::from("new"));
        assert_eq!(
            write.apply_to_node(&base).val(false),
            json!({"a": {"y": 3}, "b": 2, "c": "new"})
        );
    }

    #[test]
    fn priority_is_not_applied_to_empty_nodes() {
        let write = CompoundWrite::empty()
            .add_write(&p("a/.priority"), Node::from(1));
        assert!(write.apply_to_node(&Node::Empty).is_empty());

        let base = node(json!({"a": 1}));
        let applied = write.apply_to_node(&base);
        assert_eq!(applied.get_child(&p("a")).priority(), &Node::from(1));
    }

    #[test]
    fn remove_write_drops_subtree() {
        let write = CompoundWrite::empty()
            .add_write(&p("a/b"), Node::from(1))
            .add_write(&p("a/c"), Node::from(2));
        let removed = write.remove_write(&p("a/b"));
        assert!(!removed.has_complete_write(&p("a/b")));
        assert!(removed.has_complete_write(&p("a/c")));
        assert!(write.remove_write(&Path::root()).is_empty());
    }

    #[test]
    fn child_writes_see_shadowing_values() {
        let write = CompoundWrite::empty().add_write(&p("a"), node(json!({"b": {"c": 1}})));
        let child = write.child_compound_write_at_path(&p("a/b"));
        assert_eq!(child.root_write(), Some(&node(json!({"c": 1}))));

        let sparse = CompoundWrite::empty().add_write(&p("a/b/c"), Node::from(1));
        let child = sparse.child_compound_write_at_path(&p("a"));
        assert_eq!(child.root_write(), None);
        assert_eq!(child.complete_node_at_path(&p("b/c")), Some(Node::from(1)));
    }

    #[test]
    fn complete_children_from_root_or_immediate_values() {
        let write = CompoundWrite::empty()
            .add_write(&p("a"), Node::from(1))
            .add_write(&p("b/c"), Node::from(2));
        let names: Vec<String> = write.complete_children().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["a"]);

        let rooted = CompoundWrite::empty().add_write(&Path::root(), node(json!({"x": 1, "y": 2})));
        assert_eq!(rooted.complete_children().len(), 2);
    }

    #[test]
    fn path_maps_reject_overlapping_paths() {
        let err = CompoundWrite::from_path_map(vec![
            (p("a/b"), Node::from(1)),
            (p("a"), Node::from(2)),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::OverlappingUpdatePaths { .. }));

        let ok = CompoundWrite::from_value_map(
            json!({"a/b": 1, "c": {"d": 2}}).as_object().unwrap(),
        )
        .unwrap();
        assert_eq!(
            ok.val(false),
            json!({"/a/b": 1, "/c": {"d": 2}}).as_object().unwrap().clone()
        );
    }

    #[test]
    fn add_compound_write_rebases_paths() {
        let inner = CompoundWrite::empty()
            .add_write(&p("x"), Node::from(1))
            .add_write(&p("y/z"), Node::from(2));
        let outer = CompoundWrite::empty().add_compound_write(&p("root"), &inner);
        assert_eq!(outer.complete_node_at_path(&p("root/x")), Some(Node::from(1)));
        assert_eq!(outer.complete_node_at_path(&p("root/y/z")), Some(Node::from(2)));
    }
}
