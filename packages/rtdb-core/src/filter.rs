//! Filters that keep a view's event cache limited to what its query selects.
//!
//! Every filter reports the child changes it makes into an optional
//! [`ChangeAccumulator`]. Server caches are updated without one.

use std::cmp::Ordering;
use std::fmt;

use crate::change::{Change, ChangeAccumulator};
use crate::child_source::CompleteChildSource;
use crate::error::Result;
use crate::index::Index;
use crate::indexed_node::IndexedNode;
use crate::node::{NamedNode, Node};
use crate::path::Path;
use crate::query::QueryParams;

pub trait NodeFilter: fmt::Debug {
    /// Replace child `key` of `old` with `new_child`. `affected_path` is the
    /// part of the child the triggering operation touched.
    fn update_child(
        &self,
        old: &IndexedNode,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode>;

    fn update_full_node(
        &self,
        old: &IndexedNode,
        new: IndexedNode,
        acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode>;

    fn update_priority(&self, old: &IndexedNode, priority: Node) -> IndexedNode;

    /// Whether the filter may drop children, making its output incomplete.
    fn filters_nodes(&self) -> bool;

    /// The unfiltered filter for the same index.
    fn indexed_filter(&self) -> &IndexedFilter;

    fn index(&self) -> &Index;
}

fn snapshot(node: Node) -> IndexedNode {
    IndexedNode::new(node, Index::default())
}

fn track(acc: &mut Option<&mut ChangeAccumulator>, change: Change) -> Result<()> {
    match acc.as_deref_mut() {
        Some(acc) => acc.track_child_change(change),
        None => Ok(()),
    }
}

/// Passes every child through; only keeps the index order.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedFilter {
    index: Index,
}

impl IndexedFilter {
    pub fn new(index: Index) -> Self {
        Self { index }
    }
}

impl NodeFilter for IndexedFilter {
    fn update_child(
        &self,
        old: &IndexedNode,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        _source: &dyn CompleteChildSource,
        mut acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode> {
        let snap = old.node();
        let old_child = snap.get_immediate_child(key);
        // A child can enter or leave the view while the affected path reads
        // empty on both sides, so emptiness has to match too.
        if old_child.get_child(affected_path) == new_child.get_child(affected_path)
            && old_child.is_empty() == new_child.is_empty()
        {
            return Ok(old.clone());
        }
        if new_child.is_empty() {
            if snap.has_child(key) {
                track(&mut acc, Change::child_removed(key, snapshot(old_child)))?;
            } else {
                debug_assert!(snap.is_leaf(), "removing a missing child only happens on leaves");
            }
        } else if old_child.is_empty() {
            track(&mut acc, Change::child_added(key, snapshot(new_child.clone())))?;
        } else {
            track(
                &mut acc,
                Change::child_changed(key, snapshot(new_child.clone()), snapshot(old_child)),
            )?;
        }
        if snap.is_leaf() && new_child.is_empty() {
            return Ok(old.clone());
        }
        Ok(old.update_child(key, new_child))
    }

    fn update_full_node(
        &self,
        old: &IndexedNode,
        new: IndexedNode,
        mut acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode> {
        if acc.is_some() {
            let (old_node, new_node) = (old.node(), new.node());
            for (key, child) in old_node.children() {
                if !new_node.has_child(key) {
                    track(&mut acc, Change::child_removed(key, snapshot(child.clone())))?;
                }
            }
            for (key, child) in new_node.children() {
                if old_node.has_child(key) {
                    let old_child = old_node.get_immediate_child(key);
                    if &old_child != child {
                        track(
                            &mut acc,
                            Change::child_changed(key, snapshot(child.clone()), snapshot(old_child)),
                        )?;
                    }
                } else {
                    track(&mut acc, Change::child_added(key, snapshot(child.clone())))?;
                }
            }
        }
        Ok(new.with_index(self.index.clone()))
    }

    fn update_priority(&self, old: &IndexedNode, priority: Node) -> IndexedNode {
        if old.node().is_empty() {
            return old.clone();
        }
        old.update_priority(priority)
    }

    fn filters_nodes(&self) -> bool {
        false
    }

    fn indexed_filter(&self) -> &IndexedFilter {
        self
    }

    fn index(&self) -> &Index {
        &self.index
    }
}

/// Drops children outside `[start_post, end_post]`.
#[derive(Clone, Debug, PartialEq)]
pub struct RangedFilter {
    indexed: IndexedFilter,
    index: Index,
    start_post: NamedNode,
    end_post: NamedNode,
}

impl RangedFilter {
    pub fn new(params: &QueryParams) -> Self {
        Self {
            indexed: IndexedFilter::new(params.index().clone()),
            index: params.index().clone(),
            start_post: params.start_post(),
            end_post: params.end_post(),
        }
    }

    pub fn start_post(&self) -> &NamedNode {
        &self.start_post
    }

    pub fn end_post(&self) -> &NamedNode {
        &self.end_post
    }

    pub fn matches(&self, child: &NamedNode) -> bool {
        self.index.compare(&self.start_post, child) != Ordering::Greater
            && self.index.compare(child, &self.end_post) != Ordering::Greater
    }
}

impl NodeFilter for RangedFilter {
    fn update_child(
        &self,
        old: &IndexedNode,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode> {
        let candidate = NamedNode::new(key, new_child);
        let new_child = if self.matches(&candidate) {
            candidate.node
        } else {
            Node::Empty
        };
        self.indexed
            .update_child(old, key, new_child, affected_path, source, acc)
    }

    fn update_full_node(
        &self,
        old: &IndexedNode,
        new: IndexedNode,
        acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode> {
        let filtered = if new.node().is_leaf() {
            IndexedNode::new(Node::Empty, self.index.clone())
        } else {
            // Queries don't carry priorities.
            let mut filtered = new.with_index(self.index.clone()).update_priority(Node::Empty);
            for (key, child) in new.node().children() {
                if !self.matches(&NamedNode::new(key, child.clone())) {
                    filtered = filtered.update_child(key, Node::Empty);
                }
            }
            filtered
        };
        self.indexed.update_full_node(old, filtered, acc)
    }

    fn update_priority(&self, old: &IndexedNode, _priority: Node) -> IndexedNode {
        old.clone()
    }

    fn filters_nodes(&self) -> bool {
        true
    }

    fn indexed_filter(&self) -> &IndexedFilter {
        &self.indexed
    }

    fn index(&self) -> &Index {
        &self.index
    }
}

/// A ranged filter that also keeps at most `limit` children, counted from
/// the left or from the right.
#[derive(Clone, Debug, PartialEq)]
pub struct LimitedFilter {
    ranged: RangedFilter,
    index: Index,
    limit: usize,
    reverse: bool,
}

impl LimitedFilter {
    pub fn new(params: &QueryParams) -> Self {
        Self {
            ranged: RangedFilter::new(params),
            index: params.index().clone(),
            limit: params.limit().unwrap_or(0),
            reverse: !params.is_view_from_left(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    fn compare(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        if self.reverse {
            self.index.compare_reversed(a, b)
        } else {
            self.index.compare(a, b)
        }
    }

    /// Update for a window that is already full: the child either stays,
    /// leaves and gets backfilled, or pushes out the window boundary.
    fn full_limit_update_child(
        &self,
        old: &IndexedNode,
        key: &str,
        new_child: Node,
        source: &dyn CompleteChildSource,
        mut acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode> {
        debug_assert_eq!(old.node().num_children(), self.limit);
        let boundary = if self.reverse {
            old.first_child()
        } else {
            old.last_child()
        };
        let Some(boundary) = boundary else {
            return Ok(old.clone());
        };
        let candidate = NamedNode::new(key, new_child);
        let in_range = self.ranged.matches(&candidate);
        let snap = old.node();

        if snap.has_child(key) {
            let old_child = snap.get_immediate_child(key);
            let mut next = source.child_after(&self.index, &boundary, self.reverse);
            // Children a merge already placed in the window get applied later.
            while let Some(found) = next.take() {
                if found.name != key && !snap.has_child(&found.name) {
                    next = Some(found);
                    break;
                }
                next = source.child_after(&self.index, &found, self.reverse);
            }
            let compare_next = next
                .as_ref()
                .map_or(Ordering::Greater, |found| self.compare(found, &candidate));
            let remains = in_range && !candidate.node.is_empty() && compare_next != Ordering::Less;
            if remains {
                track(
                    &mut acc,
                    Change::child_changed(
                        key,
                        snapshot(candidate.node.clone()),
                        snapshot(old_child),
                    ),
                )?;
                return Ok(old.update_child(key, candidate.node));
            }
            track(&mut acc, Change::child_removed(key, snapshot(old_child)))?;
            let without = old.update_child(key, Node::Empty);
            return match next {
                Some(next) if self.ranged.matches(&next) => {
                    track(
                        &mut acc,
                        Change::child_added(next.name.clone(), snapshot(next.node.clone())),
                    )?;
                    Ok(without.update_child(&next.name, next.node))
                }
                _ => Ok(without),
            };
        }
        if candidate.node.is_empty() {
            // Deleting a child that was never in the window.
            return Ok(old.clone());
        }
        if in_range && self.compare(&boundary, &candidate) != Ordering::Less {
            track(
                &mut acc,
                Change::child_removed(boundary.name.clone(), snapshot(boundary.node.clone())),
            )?;
            track(
                &mut acc,
                Change::child_added(key, snapshot(candidate.node.clone())),
            )?;
            return Ok(old
                .update_child(key, candidate.node)
                .update_child(&boundary.name, Node::Empty));
        }
        Ok(old.clone())
    }
}

impl NodeFilter for LimitedFilter {
    fn update_child(
        &self,
        old: &IndexedNode,
        key: &str,
        new_child: Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode> {
        let candidate = NamedNode::new(key, new_child);
        let new_child = if self.ranged.matches(&candidate) {
            candidate.node
        } else {
            Node::Empty
        };
        if old.node().get_immediate_child(key) == new_child {
            return Ok(old.clone());
        }
        if old.node().num_children() < self.limit {
            return self
                .ranged
                .indexed_filter()
                .update_child(old, key, new_child, affected_path, source, acc);
        }
        self.full_limit_update_child(old, key, new_child, source, acc)
    }

    fn update_full_node(
        &self,
        old: &IndexedNode,
        new: IndexedNode,
        acc: Option<&mut ChangeAccumulator>,
    ) -> Result<IndexedNode> {
        let filtered = if new.node().is_leaf() || new.node().is_empty() {
            IndexedNode::new(Node::Empty, self.index.clone())
        } else {
            let new = new.with_index(self.index.clone());
            let (start_post, end_post) = if self.reverse {
                (self.ranged.end_post(), self.ranged.start_post())
            } else {
                (self.ranged.start_post(), self.ranged.end_post())
            };
            let mut filtered = new.update_priority(Node::Empty);
            let children: Vec<NamedNode> = if self.reverse {
                new.iter().rev().collect()
            } else {
                new.iter().collect()
            };
            let mut found_start = false;
            let mut count = 0;
            for child in children {
                if !found_start && self.compare(start_post, &child) != Ordering::Greater {
                    found_start = true;
                }
                let in_range = found_start
                    && count < self.limit
                    && self.compare(&child, end_post) != Ordering::Greater;
                if in_range {
                    count += 1;
                } else {
                    filtered = filtered.update_child(&child.name, Node::Empty);
                }
            }
            filtered
        };
        self.ranged
            .indexed_filter()
            .update_full_node(old, filtered, acc)
    }

    fn update_priority(&self, old: &IndexedNode, _priority: Node) -> IndexedNode {
        old.clone()
    }

    fn filters_nodes(&self) -> bool {
        true
    }

    fn indexed_filter(&self) -> &IndexedFilter {
        self.ranged.indexed_filter()
    }

    fn index(&self) -> &Index {
        &self.index
    }
}
