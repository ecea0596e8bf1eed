//! Pending local writes layered over server data.
//!
//! The log keeps every unacknowledged write in id order plus a cached
//! [`CompoundWrite`] of the visible ones. The cache always equals a replay of
//! the visible records; removal either patches it directly or rebuilds it.

use std::cmp::Ordering;

use tracing::debug;

use crate::compound_write::CompoundWrite;
use crate::error::{Error, Result};
use crate::ids::WriteId;
use crate::index::Index;
use crate::node::{NamedNode, Node};
use crate::path::Path;
use crate::cache::CacheNode;

#[derive(Clone, Debug, PartialEq)]
pub enum WritePayload {
    Overwrite(Node),
    /// Child writes relative to the record path.
    Merge(CompoundWrite),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    pub write_id: WriteId,
    pub path: Path,
    pub payload: WritePayload,
    pub visible: bool,
}

impl WriteRecord {
    pub fn is_overwrite(&self) -> bool {
        matches!(self.payload, WritePayload::Overwrite(_))
    }

    pub fn overwrite(&self) -> Option<&Node> {
        match &self.payload {
            WritePayload::Overwrite(node) => Some(node),
            WritePayload::Merge(_) => None,
        }
    }

    pub fn merge(&self) -> Option<&CompoundWrite> {
        match &self.payload {
            WritePayload::Merge(merge) => Some(merge),
            WritePayload::Overwrite(_) => None,
        }
    }

    /// Absolute paths whose contents this record replaces.
    pub fn affected_paths(&self) -> Vec<Path> {
        match &self.payload {
            WritePayload::Overwrite(_) => vec![self.path.clone()],
            WritePayload::Merge(merge) => merge
                .writes()
                .into_iter()
                .map(|(relative, _)| self.path.child_path(&relative))
                .collect(),
        }
    }

    /// Whether this record fully determines the data at `path`.
    pub fn covers(&self, path: &Path) -> bool {
        self.affected_paths().iter().any(|affected| affected.contains(path))
    }
}

fn paths_overlap(a: &[Path], b: &[Path]) -> bool {
    a.iter()
        .any(|x| b.iter().any(|y| x.contains(y) || y.contains(x)))
}

#[derive(Clone, Debug, Default)]
pub struct WriteLog {
    visible_overlay: CompoundWrite,
    all_writes: Vec<WriteRecord>,
    last_write_id: Option<WriteId>,
}

impl WriteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached composition of every visible write.
    pub fn visible_overlay(&self) -> &CompoundWrite {
        &self.visible_overlay
    }

    pub fn all_writes(&self) -> &[WriteRecord] {
        &self.all_writes
    }

    pub fn last_write_id(&self) -> Option<WriteId> {
        self.last_write_id
    }

    pub fn is_empty(&self) -> bool {
        self.all_writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.all_writes.len()
    }

    fn check_write_id(&self, write_id: WriteId) -> Result<()> {
        match self.last_write_id {
            Some(last) if write_id <= last => Err(Error::NonMonotonicWriteId {
                last,
                got: write_id,
            }),
            _ => Ok(()),
        }
    }

    pub fn add_overwrite(
        &mut self,
        path: Path,
        node: Node,
        write_id: WriteId,
        visible: bool,
    ) -> Result<()> {
        self.check_write_id(write_id)?;
        if visible {
            self.visible_overlay = self.visible_overlay.add_write(&path, node.clone());
        }
        debug!(write_id, path = %path, visible, "added overwrite");
        self.all_writes.push(WriteRecord {
            write_id,
            path,
            payload: WritePayload::Overwrite(node),
            visible,
        });
        self.last_write_id = Some(write_id);
        Ok(())
    }

    /// Merges are always visible.
    pub fn add_merge(&mut self, path: Path, changed: CompoundWrite, write_id: WriteId) -> Result<()> {
        self.check_write_id(write_id)?;
        self.visible_overlay = self.visible_overlay.add_compound_write(&path, &changed);
        debug!(write_id, path = %path, "added merge");
        self.all_writes.push(WriteRecord {
            write_id,
            path,
            payload: WritePayload::Merge(changed),
            visible: true,
        });
        self.last_write_id = Some(write_id);
        Ok(())
    }

    pub fn write(&self, write_id: WriteId) -> Option<&WriteRecord> {
        self.all_writes.iter().find(|w| w.write_id == write_id)
    }

    /// Remove a write. Returns whether the removal may change visible data.
    pub fn remove(&mut self, write_id: WriteId) -> Result<bool> {
        let index = self
            .all_writes
            .iter()
            .position(|w| w.write_id == write_id)
            .ok_or(Error::UnknownWriteId(write_id))?;
        let removed = self.all_writes.remove(index);
        if !removed.visible {
            debug!(write_id, "removed hidden write");
            return Ok(false);
        }

        let affected = removed.affected_paths();
        let shadowed = self.all_writes[index..]
            .iter()
            .filter(|w| w.visible)
            .any(|w| affected.iter().all(|path| w.covers(path)));
        if shadowed {
            debug!(write_id, "removed shadowed write");
            return Ok(false);
        }

        let overlaps = self
            .all_writes
            .iter()
            .filter(|w| w.visible)
            .any(|w| paths_overlap(&affected, &w.affected_paths()));
        if overlaps {
            debug!(write_id, path = %removed.path, "removed overlapping write; rebuilding overlay");
            self.rebuild_overlay();
        } else {
            debug!(write_id, path = %removed.path, "removed write");
            for path in &affected {
                self.visible_overlay = self.visible_overlay.remove_write(path);
            }
        }
        Ok(true)
    }

    /// Drop every pending write, e.g. when the connection is lost.
    pub fn remove_all(&mut self) -> Vec<WriteRecord> {
        self.visible_overlay = CompoundWrite::empty();
        std::mem::take(&mut self.all_writes)
    }

    fn rebuild_overlay(&mut self) {
        self.visible_overlay =
            layer_tree_from_writes(&self.all_writes, |w| w.visible, &Path::root());
    }

    pub fn view(&self, path: Path) -> WriteLogView<'_> {
        WriteLogView {
            log: self,
            tree_path: path,
        }
    }

    /// Value of a write that fully covers `path`, if any.
    pub fn shadowing_write(&self, path: &Path) -> Option<Node> {
        self.visible_overlay.complete_node_at_path(path)
    }

    pub fn complete_event_cache(&self, tree_path: &Path, server: Option<&Node>) -> Option<Node> {
        if let Some(shadowing) = self.visible_overlay.complete_node_at_path(tree_path) {
            return Some(shadowing);
        }
        let sub_merge = self.visible_overlay.child_compound_write_at_path(tree_path);
        if sub_merge.is_empty() {
            return server.cloned();
        }
        if server.is_none() && !sub_merge.has_complete_write(&Path::root()) {
            return None;
        }
        Some(sub_merge.apply_to_node(server.unwrap_or(Node::empty_ref())))
    }

    /// Like [`WriteLog::complete_event_cache`], leaving out `exclude` and
    /// optionally including hidden writes.
    pub fn complete_event_cache_with(
        &self,
        tree_path: &Path,
        server: Option<&Node>,
        exclude: &[WriteId],
        include_hidden: bool,
    ) -> Option<Node> {
        if exclude.is_empty() && !include_hidden {
            return self.complete_event_cache(tree_path, server);
        }
        let merge = self.visible_overlay.child_compound_write_at_path(tree_path);
        if !include_hidden && merge.is_empty() {
            return server.cloned();
        }
        if !include_hidden && server.is_none() && !merge.has_complete_write(&Path::root()) {
            return None;
        }
        let layered = layer_tree_from_writes(
            &self.all_writes,
            |w| {
                (w.visible || include_hidden)
                    && !exclude.contains(&w.write_id)
                    && (w.path.contains(tree_path) || tree_path.contains(&w.path))
            },
            tree_path,
        );
        Some(layered.apply_to_node(server.unwrap_or(Node::empty_ref())))
    }

    /// Children at `tree_path` as seen with pending writes applied.
    pub fn complete_event_children(&self, tree_path: &Path, server_children: &Node) -> Node {
        let mut complete = Node::Empty;
        if let Some(top_level) = self.visible_overlay.complete_node_at_path(tree_path) {
            for (key, child) in top_level.children() {
                complete = complete.update_immediate_child(key, child.clone());
            }
            return complete;
        }
        let merge = self.visible_overlay.child_compound_write_at_path(tree_path);
        for (key, child) in server_children.children() {
            let updated = merge
                .child_compound_write_at_path(&Path::from_segments(vec![key.to_string()]))
                .apply_to_node(child);
            complete = complete.update_immediate_child(key, updated);
        }
        for named in merge.complete_children() {
            complete = complete.update_immediate_child(&named.name, named.node);
        }
        complete
    }

    /// Event data at `tree_path/child_path` after the server replaced it with
    /// the matching part of `server_snap`. `None` means pending writes hide
    /// the change.
    pub fn event_cache_after_server_overwrite(
        &self,
        tree_path: &Path,
        child_path: &Path,
        server_snap: &Node,
    ) -> Option<Node> {
        let path = tree_path.child_path(child_path);
        if self.visible_overlay.has_complete_write(&path) {
            return None;
        }
        let child_merge = self.visible_overlay.child_compound_write_at_path(&path);
        let server_child = server_snap.get_child(child_path);
        if child_merge.is_empty() {
            Some(server_child)
        } else {
            Some(child_merge.apply_to_node(&server_child))
        }
    }

    pub fn complete_child(&self, tree_path: &Path, key: &str, server_cache: &CacheNode) -> Option<Node> {
        let path = tree_path.child(key);
        if let Some(shadowing) = self.visible_overlay.complete_node_at_path(&path) {
            return Some(shadowing);
        }
        if !server_cache.is_complete_for_child(key) {
            return None;
        }
        let child_merge = self.visible_overlay.child_compound_write_at_path(&path);
        Some(child_merge.apply_to_node(&server_cache.node().get_immediate_child(key)))
    }

    /// Next child strictly after `post` under `index`, with pending writes
    /// applied. Walks backwards when `reverse` is set.
    pub fn next_node_after_post(
        &self,
        tree_path: &Path,
        post: &NamedNode,
        server: Option<&Node>,
        reverse: bool,
        index: &Index,
    ) -> Option<NamedNode> {
        let merge = self.visible_overlay.child_compound_write_at_path(tree_path);
        let to_iterate = match merge.complete_node_at_path(&Path::root()) {
            Some(shadowing) => shadowing,
            None => merge.apply_to_node(server?),
        };
        let compare = |a: &NamedNode, b: &NamedNode| {
            if reverse {
                index.compare_reversed(a, b)
            } else {
                index.compare(a, b)
            }
        };
        let mut next: Option<NamedNode> = None;
        for (key, child) in to_iterate.children() {
            let candidate = NamedNode::new(key, child.clone());
            if compare(&candidate, post) != Ordering::Greater {
                continue;
            }
            let closer = next
                .as_ref()
                .map_or(true, |current| compare(&candidate, current) == Ordering::Less);
            if closer {
                next = Some(candidate);
            }
        }
        next
    }
}

/// Compose every record accepted by `filter` as seen from `tree_root`.
pub fn layer_tree_from_writes(
    writes: &[WriteRecord],
    filter: impl Fn(&WriteRecord) -> bool,
    tree_root: &Path,
) -> CompoundWrite {
    let mut layered = CompoundWrite::empty();
    for write in writes.iter().filter(|w| filter(w)) {
        let write_path = &write.path;
        match &write.payload {
            WritePayload::Overwrite(node) => {
                if let Some(relative) = write_path.relative_to(tree_root) {
                    layered = layered.add_write(&relative, node.clone());
                } else if let Some(relative) = tree_root.relative_to(write_path) {
                    layered = layered.add_write(&Path::root(), node.get_child(&relative));
                }
            }
            WritePayload::Merge(merge) => {
                if let Some(relative) = write_path.relative_to(tree_root) {
                    layered = layered.add_compound_write(&relative, merge);
                } else if let Some(relative) = tree_root.relative_to(write_path) {
                    let below = merge.child_compound_write_at_path(&relative);
                    layered = layered.add_compound_write(&Path::root(), &below);
                }
            }
        }
    }
    layered
}

/// Read-only window of a [`WriteLog`] rooted at one path.
#[derive(Clone, Debug)]
pub struct WriteLogView<'a> {
    log: &'a WriteLog,
    tree_path: Path,
}

impl<'a> WriteLogView<'a> {
    pub fn path(&self) -> &Path {
        &self.tree_path
    }

    pub fn log(&self) -> &'a WriteLog {
        self.log
    }

    pub fn child_view(&self, key: &str) -> WriteLogView<'a> {
        WriteLogView {
            log: self.log,
            tree_path: self.tree_path.child(key),
        }
    }

    pub fn complete_event_cache(&self, server: Option<&Node>) -> Option<Node> {
        self.log.complete_event_cache(&self.tree_path, server)
    }

    pub fn complete_event_cache_with(
        &self,
        server: Option<&Node>,
        exclude: &[WriteId],
        include_hidden: bool,
    ) -> Option<Node> {
        self.log
            .complete_event_cache_with(&self.tree_path, server, exclude, include_hidden)
    }

    pub fn complete_event_children(&self, server_children: &Node) -> Node {
        self.log
            .complete_event_children(&self.tree_path, server_children)
    }

    pub fn event_cache_after_server_overwrite(
        &self,
        child_path: &Path,
        server_snap: &Node,
    ) -> Option<Node> {
        self.log
            .event_cache_after_server_overwrite(&self.tree_path, child_path, server_snap)
    }

    pub fn shadowing_write(&self, path: &Path) -> Option<Node> {
        self.log.shadowing_write(&self.tree_path.child_path(path))
    }

    pub fn complete_child(&self, key: &str, server_cache: &CacheNode) -> Option<Node> {
        self.log.complete_child(&self.tree_path, key, server_cache)
    }

    pub fn next_node_after_post(
        &self,
        post: &NamedNode,
        server: Option<&Node>,
        reverse: bool,
        index: &Index,
    ) -> Option<NamedNode> {
        self.log
            .next_node_after_post(&self.tree_path, post, server, reverse, index)
    }
}
