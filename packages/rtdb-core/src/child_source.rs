use crate::cache::{CacheNode, ViewCache};
use crate::index::Index;
use crate::indexed_node::IndexedNode;
use crate::node::{NamedNode, Node};
use crate::write_log::WriteLogView;

/// Where a filter looks up children it doesn't hold itself, e.g. to refill a
/// limited window after a child drops out.
pub trait CompleteChildSource {
    fn complete_child(&self, key: &str) -> Option<Node>;
    /// Next child strictly after `child` under `index`.
    fn child_after(&self, index: &Index, child: &NamedNode, reverse: bool) -> Option<NamedNode>;
}

/// Knows nothing. Used for server updates, which never need to backfill.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCompleteChildSource;

impl CompleteChildSource for NoCompleteChildSource {
    fn complete_child(&self, _key: &str) -> Option<Node> {
        None
    }

    fn child_after(&self, _index: &Index, _child: &NamedNode, _reverse: bool) -> Option<NamedNode> {
        None
    }
}

/// Answers from the event cache first, then from server data with pending
/// writes layered on top.
pub struct WriteLogCompleteChildSource<'a> {
    writes: WriteLogView<'a>,
    view_cache: &'a ViewCache,
    server_cache: Option<&'a Node>,
}

impl<'a> WriteLogCompleteChildSource<'a> {
    pub fn new(
        writes: WriteLogView<'a>,
        view_cache: &'a ViewCache,
        server_cache: Option<&'a Node>,
    ) -> Self {
        Self {
            writes,
            view_cache,
            server_cache,
        }
    }
}

impl CompleteChildSource for WriteLogCompleteChildSource<'_> {
    fn complete_child(&self, key: &str) -> Option<Node> {
        let event = self.view_cache.event_cache();
        if event.is_complete_for_child(key) {
            return Some(event.node().get_immediate_child(key));
        }
        match self.server_cache {
            Some(server) => {
                let server = CacheNode::new(IndexedNode::with_key_order(server.clone()), true, false);
                self.writes.complete_child(key, &server)
            }
            None => self
                .writes
                .complete_child(key, self.view_cache.server_cache()),
        }
    }

    fn child_after(&self, index: &Index, child: &NamedNode, reverse: bool) -> Option<NamedNode> {
        let server = self
            .server_cache
            .or_else(|| self.view_cache.complete_server_node());
        self.writes.next_node_after_post(child, server, reverse, index)
    }
}
