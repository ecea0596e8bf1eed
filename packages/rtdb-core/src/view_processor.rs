//! Applies operations to a view's caches and reports what listeners see.
//!
//! The server cache tracks what the server told us; the event cache is the
//! server cache with pending writes layered on and the query filter applied.
//! Every operation rewrites one or both and collects child changes on the way.

use crate::cache::{CacheNode, ViewCache};
use crate::change::{Change, ChangeAccumulator};
use crate::child_source::{CompleteChildSource, NoCompleteChildSource, WriteLogCompleteChildSource};
use crate::compound_write::CompoundWrite;
use crate::error::Result;
use crate::filter::NodeFilter;
use crate::indexed_node::IndexedNode;
use crate::key_order::PRIORITY_KEY;
use crate::node::Node;
use crate::operation::Operation;
use crate::path::Path;
use crate::query::QueryParams;
use crate::trie::PersistentTrie;
use crate::write_log::WriteLogView;

#[derive(Clone, Debug)]
pub struct ProcessorResult {
    pub view_cache: ViewCache,
    pub changes: Vec<Change>,
}

#[derive(Debug)]
pub struct ViewProcessor {
    filter: Box<dyn NodeFilter>,
}

impl ViewProcessor {
    pub fn new(filter: Box<dyn NodeFilter>) -> Self {
        Self { filter }
    }

    pub fn for_query(params: &QueryParams) -> Self {
        Self::new(params.node_filter())
    }

    pub fn filter(&self) -> &dyn NodeFilter {
        self.filter.as_ref()
    }

    /// An uninitialized cache ordered by this processor's index.
    pub fn empty_view_cache(&self) -> ViewCache {
        let empty = || CacheNode::new(IndexedNode::new(Node::Empty, self.filter.index().clone()), false, false);
        ViewCache::new(empty(), empty())
    }

    /// Apply `op` to `old`. `writes` is the write log as seen from the view's
    /// location and `complete_cache` complete server data there, if known.
    pub fn apply_operation(
        &self,
        old: &ViewCache,
        op: &Operation,
        writes: &WriteLogView<'_>,
        complete_cache: Option<&Node>,
    ) -> Result<ProcessorResult> {
        let mut acc = ChangeAccumulator::new();
        let view_cache = match op {
            Operation::Overwrite { source, path, snap } => {
                if source.is_from_user() {
                    self.apply_user_overwrite(old, path, snap.clone(), writes, complete_cache, &mut acc)?
                } else {
                    // A root update from the server may mark a filtered
                    // server cache unfiltered again.
                    let filter_server_node =
                        source.is_tagged() || (old.server_cache().is_filtered() && !path.is_empty());
                    self.apply_server_overwrite(
                        old,
                        path,
                        snap.clone(),
                        writes,
                        complete_cache,
                        filter_server_node,
                        &mut acc,
                    )?
                }
            }
            Operation::Merge {
                source,
                path,
                children,
            } => {
                if source.is_from_user() {
                    self.apply_user_merge(old, path, children, writes, complete_cache, &mut acc)?
                } else {
                    let filter_server_node = source.is_tagged() || old.server_cache().is_filtered();
                    self.apply_server_merge(
                        old,
                        path,
                        children,
                        writes,
                        complete_cache,
                        filter_server_node,
                        &mut acc,
                    )?
                }
            }
            Operation::AckUserWrite {
                path,
                affected,
                revert,
            } => {
                if *revert {
                    self.revert_user_write(old, path, writes, complete_cache, &mut acc)?
                } else {
                    self.ack_user_write(old, path, affected, writes, complete_cache, &mut acc)?
                }
            }
            Operation::ListenComplete { path, .. } => self.listen_complete(old, path, writes, &mut acc)?,
        };
        let mut changes = acc.into_changes();
        maybe_add_value_change(old, &view_cache, &mut changes);
        Ok(ProcessorResult { view_cache, changes })
    }

    fn apply_user_overwrite(
        &self,
        old: &ViewCache,
        change_path: &Path,
        changed: Node,
        writes: &WriteLogView<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        let old_event = old.event_cache();
        let source = WriteLogCompleteChildSource::new(writes.clone(), old, complete_cache);
        match change_path.front() {
            None => {
                let new_event = self.filter.update_full_node(
                    old_event.indexed_node(),
                    IndexedNode::new(changed, self.filter.index().clone()),
                    Some(acc),
                )?;
                Ok(old.update_event_snap(new_event, true, self.filter.filters_nodes()))
            }
            Some(PRIORITY_KEY) => {
                let new_event = self.filter.update_priority(old_event.indexed_node(), changed);
                Ok(old.update_event_snap(
                    new_event,
                    old_event.is_fully_initialized(),
                    old_event.is_filtered(),
                ))
            }
            Some(child_key) => {
                let child_change_path = change_path.pop_front();
                let old_child = old_event.node().get_immediate_child(child_key);
                let new_child = if child_change_path.is_empty() {
                    changed
                } else {
                    match source.complete_child(child_key) {
                        // A priority on a missing node comes back with the
                        // server update if the node exists there.
                        Some(child)
                            if child_change_path.back() == Some(PRIORITY_KEY)
                                && child
                                    .get_child(&child_change_path.parent().unwrap_or_default())
                                    .is_empty() =>
                        {
                            child
                        }
                        Some(child) => child.update_child(&child_change_path, changed),
                        None => Node::Empty,
                    }
                };
                if old_child == new_child {
                    return Ok(old.clone());
                }
                let new_event = self.filter.update_child(
                    old_event.indexed_node(),
                    child_key,
                    new_child,
                    &child_change_path,
                    &source,
                    Some(acc),
                )?;
                Ok(old.update_event_snap(
                    new_event,
                    old_event.is_fully_initialized(),
                    self.filter.filters_nodes(),
                ))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_overwrite(
        &self,
        old: &ViewCache,
        change_path: &Path,
        changed: Node,
        writes: &WriteLogView<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        let old_server = old.server_cache();
        let server_filter: &dyn NodeFilter = if filter_server_node {
            self.filter.as_ref()
        } else {
            self.filter.indexed_filter()
        };
        let index = server_filter.index().clone();
        let new_server = match change_path.front() {
            None => server_filter.update_full_node(
                old_server.indexed_node(),
                IndexedNode::new(changed, index),
                None,
            )?,
            // The server cache was never filtered, so filter all of it now.
            Some(_) if server_filter.filters_nodes() && !old_server.is_filtered() => {
                let updated = old_server.node().update_child(change_path, changed);
                server_filter.update_full_node(
                    old_server.indexed_node(),
                    IndexedNode::new(updated, index),
                    None,
                )?
            }
            Some(child_key) => {
                // Deep updates for other listeners don't touch an incomplete cache.
                if !old_server.is_complete_for_path(change_path) && change_path.len() > 1 {
                    return Ok(old.clone());
                }
                let child_change_path = change_path.pop_front();
                let new_child = old_server
                    .node()
                    .get_immediate_child(child_key)
                    .update_child(&child_change_path, changed);
                if child_key == PRIORITY_KEY {
                    server_filter.update_priority(old_server.indexed_node(), new_child)
                } else {
                    server_filter.update_child(
                        old_server.indexed_node(),
                        child_key,
                        new_child,
                        &child_change_path,
                        &NoCompleteChildSource,
                        None,
                    )?
                }
            }
        };
        let new_cache = old.update_server_snap(
            new_server,
            old_server.is_fully_initialized() || change_path.is_empty(),
            server_filter.filters_nodes(),
        );
        let source = WriteLogCompleteChildSource::new(writes.clone(), &new_cache, complete_cache);
        self.event_cache_after_server_event(&new_cache, change_path, writes, &source, acc)
    }

    fn apply_user_merge(
        &self,
        old: &ViewCache,
        path: &Path,
        changed: &CompoundWrite,
        writes: &WriteLogView<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        let in_view = |write_path: &Path| match write_path.front() {
            Some(front) => old.event_cache().is_complete_for_child(front),
            None => old.event_cache().is_complete_for_path(write_path),
        };
        // Children already in view go first so a limited window makes room
        // before new children compete for it.
        let (present, absent): (Vec<(Path, Node)>, Vec<(Path, Node)>) = changed
            .writes()
            .into_iter()
            .map(|(relative, node)| (path.child_path(&relative), node))
            .partition(|(write_path, _)| in_view(write_path));
        let mut current = old.clone();
        for (write_path, node) in present.into_iter().chain(absent) {
            current = self.apply_user_overwrite(&current, &write_path, node, writes, complete_cache, acc)?;
        }
        Ok(current)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_merge(
        &self,
        old: &ViewCache,
        path: &Path,
        changed: &CompoundWrite,
        writes: &WriteLogView<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        let server = old.server_cache();
        // Meant for an earlier listen at this location; complete data follows.
        if server.node().is_empty() && !server.is_fully_initialized() {
            return Ok(old.clone());
        }
        let merge = if path.is_empty() {
            changed.clone()
        } else {
            CompoundWrite::empty().add_compound_write(path, changed)
        };
        let server_node = server.node();
        let children = merge.child_compound_writes();
        let (present, absent): (Vec<_>, Vec<_>) = children
            .into_iter()
            .partition(|(key, _)| server_node.has_child(key));
        let absent = absent.into_iter().filter(|(key, child)| {
            // A deep merge into a child we know nothing about can't be applied.
            server.is_complete_for_child(key) || child.root_write().is_some()
        });
        let mut current = old.clone();
        for (key, child_merge) in present.into_iter().chain(absent) {
            let new_child = apply_merge(server_node.get_immediate_child(&key), &child_merge);
            current = self.apply_server_overwrite(
                &current,
                &Path::from_segments(vec![key]),
                new_child,
                writes,
                complete_cache,
                filter_server_node,
                acc,
            )?;
        }
        Ok(current)
    }

    fn ack_user_write(
        &self,
        old: &ViewCache,
        ack_path: &Path,
        affected: &PersistentTrie<bool>,
        writes: &WriteLogView<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        if writes.shadowing_write(ack_path).is_some() {
            return Ok(old.clone());
        }
        let filter_server_node = old.server_cache().is_filtered();
        let server = old.server_cache();
        // Re-apply the server data the acked write was hiding.
        if affected.value().is_some() {
            if (ack_path.is_empty() && server.is_fully_initialized())
                || server.is_complete_for_path(ack_path)
            {
                return self.apply_server_overwrite(
                    old,
                    ack_path,
                    server.node().get_child(ack_path),
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
            if ack_path.is_empty() {
                // Acked at the root without full data: replay what we have as a merge.
                let changed = server.node().children().fold(CompoundWrite::empty(), |merge, (key, child)| {
                    merge.add_write(&Path::from_segments(vec![key.to_string()]), child.clone())
                });
                return self.apply_server_merge(
                    old,
                    ack_path,
                    &changed,
                    writes,
                    complete_cache,
                    filter_server_node,
                    acc,
                );
            }
            return Ok(old.clone());
        }
        let mut changed = CompoundWrite::empty();
        affected.for_each(&mut |merge_path, _| {
            let server_path = ack_path.child_path(merge_path);
            if server.is_complete_for_path(&server_path) {
                changed = changed.add_write(merge_path, server.node().get_child(&server_path));
            }
        });
        self.apply_server_merge(
            old,
            ack_path,
            &changed,
            writes,
            complete_cache,
            filter_server_node,
            acc,
        )
    }

    fn revert_user_write(
        &self,
        old: &ViewCache,
        path: &Path,
        writes: &WriteLogView<'_>,
        complete_cache: Option<&Node>,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        if writes.shadowing_write(path).is_some() {
            return Ok(old.clone());
        }
        let source = WriteLogCompleteChildSource::new(writes.clone(), old, complete_cache);
        let old_event = old.event_cache().indexed_node();
        let index = self.filter.index().clone();
        let new_event = match path.front() {
            None | Some(PRIORITY_KEY) => {
                let new_node = if old.server_cache().is_fully_initialized() {
                    writes
                        .complete_event_cache(old.complete_server_node())
                        .unwrap_or_default()
                } else {
                    let server_children = old.server_cache().node();
                    debug_assert!(!server_children.is_leaf(), "a leaf server cache is always complete");
                    writes.complete_event_children(server_children)
                };
                self.filter
                    .update_full_node(old_event, IndexedNode::new(new_node, index), Some(&mut *acc))?
            }
            Some(child_key) => {
                let child_path = path.pop_front();
                let new_child = writes
                    .complete_child(child_key, old.server_cache())
                    .or_else(|| {
                        old.server_cache()
                            .is_complete_for_child(child_key)
                            .then(|| old_event.node().get_immediate_child(child_key))
                    });
                let mut new_event = match new_child {
                    Some(child) => self.filter.update_child(
                        old_event,
                        child_key,
                        child,
                        &child_path,
                        &source,
                        Some(&mut *acc),
                    )?,
                    // Nothing complete to show: drop what the write put there.
                    None if old_event.node().has_child(child_key) => self.filter.update_child(
                        old_event,
                        child_key,
                        Node::Empty,
                        &child_path,
                        &source,
                        Some(&mut *acc),
                    )?,
                    None => old_event.clone(),
                };
                if new_event.node().is_empty() && old.server_cache().is_fully_initialized() {
                    // Every child write is gone; the server value may be a leaf.
                    let complete = writes
                        .complete_event_cache(old.complete_server_node())
                        .unwrap_or_default();
                    if complete.is_leaf() {
                        new_event = self.filter.update_full_node(
                            &new_event,
                            IndexedNode::new(complete, index),
                            Some(&mut *acc),
                        )?;
                    }
                }
                new_event
            }
        };
        let complete = old.server_cache().is_fully_initialized()
            || writes.shadowing_write(&Path::root()).is_some();
        Ok(old.update_event_snap(new_event, complete, self.filter.filters_nodes()))
    }

    fn listen_complete(
        &self,
        old: &ViewCache,
        path: &Path,
        writes: &WriteLogView<'_>,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        let server = old.server_cache();
        let new_cache = old.update_server_snap(
            server.indexed_node().clone(),
            server.is_fully_initialized() || path.is_empty(),
            server.is_filtered(),
        );
        self.event_cache_after_server_event(&new_cache, path, writes, &NoCompleteChildSource, acc)
    }

    /// Rebuild the event cache at `change_path` after the server cache changed.
    fn event_cache_after_server_event(
        &self,
        view: &ViewCache,
        change_path: &Path,
        writes: &WriteLogView<'_>,
        source: &dyn CompleteChildSource,
        acc: &mut ChangeAccumulator,
    ) -> Result<ViewCache> {
        if writes.shadowing_write(change_path).is_some() {
            return Ok(view.clone());
        }
        let old_event = view.event_cache();
        let new_event = match change_path.front() {
            None => {
                debug_assert!(
                    view.server_cache().is_fully_initialized(),
                    "a root server update must complete the server cache"
                );
                let server = view.server_cache().node();
                let complete = if view.server_cache().is_filtered() {
                    let children = if server.is_leaf() { Node::Empty } else { server.clone() };
                    writes.complete_event_children(&children)
                } else {
                    writes.complete_event_cache(Some(server)).unwrap_or_default()
                };
                self.filter.update_full_node(
                    old_event.indexed_node(),
                    IndexedNode::new(complete, self.filter.index().clone()),
                    Some(acc),
                )?
            }
            Some(PRIORITY_KEY) => {
                debug_assert_eq!(change_path.len(), 1, ".priority must be the last segment");
                match writes.event_cache_after_server_overwrite(change_path, view.server_cache().node()) {
                    Some(priority) => self.filter.update_priority(old_event.indexed_node(), priority),
                    None => old_event.indexed_node().clone(),
                }
            }
            Some(child_key) => {
                let child_change_path = change_path.pop_front();
                let new_child = if old_event.is_complete_for_child(child_key) {
                    let existing = old_event.node().get_immediate_child(child_key);
                    Some(
                        match writes
                            .event_cache_after_server_overwrite(change_path, view.server_cache().node())
                        {
                            Some(update) => existing.update_child(&child_change_path, update),
                            None => existing,
                        },
                    )
                } else {
                    writes.complete_child(child_key, view.server_cache())
                };
                match new_child {
                    Some(child) => self.filter.update_child(
                        old_event.indexed_node(),
                        child_key,
                        child,
                        &child_change_path,
                        source,
                        Some(acc),
                    )?,
                    None => old_event.indexed_node().clone(),
                }
            }
        };
        Ok(view.update_event_snap(
            new_event,
            old_event.is_fully_initialized() || change_path.is_empty(),
            self.filter.filters_nodes(),
        ))
    }
}

fn apply_merge(node: Node, merge: &CompoundWrite) -> Node {
    merge
        .writes()
        .into_iter()
        .fold(node, |node, (path, child)| node.update_child(&path, child))
}

/// Listeners get a value change whenever any child changed, the view just
/// became complete, or a leaf value or the priority changed.
fn maybe_add_value_change(old: &ViewCache, new: &ViewCache, changes: &mut Vec<Change>) {
    let event = new.event_cache();
    if !event.is_fully_initialized() {
        return;
    }
    let node = event.node();
    let differs = match old.complete_event_node() {
        None => true,
        Some(previous) => {
            ((node.is_leaf() || node.is_empty()) && node != previous)
                || node.priority() != previous.priority()
        }
    };
    if !changes.is_empty() || differs {
        changes.push(Change::value(event.indexed_node().clone()));
    }
}
