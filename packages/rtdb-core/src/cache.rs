use crate::indexed_node::IndexedNode;
use crate::node::Node;
use crate::path::Path;

/// A cached node plus what is known about how much of it is present.
///
/// `fully_initialized` means the cache has received complete data at least
/// once. `filtered` means a query filter may have dropped children, so only
/// children that are actually present can be trusted.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheNode {
    indexed: IndexedNode,
    fully_initialized: bool,
    filtered: bool,
}

impl CacheNode {
    pub fn new(indexed: IndexedNode, fully_initialized: bool, filtered: bool) -> Self {
        Self {
            indexed,
            fully_initialized,
            filtered,
        }
    }

    pub fn empty() -> Self {
        Self::new(IndexedNode::new(Node::Empty, Default::default()), false, false)
    }

    pub fn node(&self) -> &Node {
        self.indexed.node()
    }

    pub fn indexed_node(&self) -> &IndexedNode {
        &self.indexed
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn is_complete_for_path(&self, path: &Path) -> bool {
        match path.front() {
            None => self.fully_initialized && !self.filtered,
            Some(front) => self.is_complete_for_child(front),
        }
    }

    pub fn is_complete_for_child(&self, key: &str) -> bool {
        (self.fully_initialized && !self.filtered) || self.indexed.node().has_child(key)
    }
}

/// Event cache (what listeners see) and server cache (last known server
/// state) of one view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewCache {
    event_cache: CacheNode,
    server_cache: CacheNode,
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new(CacheNode::empty(), CacheNode::empty())
    }
}

impl ViewCache {
    pub fn new(event_cache: CacheNode, server_cache: CacheNode) -> Self {
        Self {
            event_cache,
            server_cache,
        }
    }

    pub fn event_cache(&self) -> &CacheNode {
        &self.event_cache
    }

    pub fn server_cache(&self) -> &CacheNode {
        &self.server_cache
    }

    pub fn update_event_snap(&self, indexed: IndexedNode, complete: bool, filtered: bool) -> ViewCache {
        Self {
            event_cache: CacheNode::new(indexed, complete, filtered),
            server_cache: self.server_cache.clone(),
        }
    }

    pub fn update_server_snap(&self, indexed: IndexedNode, complete: bool, filtered: bool) -> ViewCache {
        Self {
            event_cache: self.event_cache.clone(),
            server_cache: CacheNode::new(indexed, complete, filtered),
        }
    }

    pub fn complete_event_node(&self) -> Option<&Node> {
        self.event_cache
            .is_fully_initialized()
            .then(|| self.event_cache.node())
    }

    pub fn complete_server_node(&self) -> Option<&Node> {
        self.server_cache
            .is_fully_initialized()
            .then(|| self.server_cache.node())
    }
}
