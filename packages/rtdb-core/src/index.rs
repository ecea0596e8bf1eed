use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::key_order::{compare_keys, MAX_NAME, PRIORITY_KEY};
use crate::node::{NamedNode, Node, Scalar};
use crate::path::Path;

const PRIORITY_POST_NAME: &str = "[PRIORITY-POST]";

/// Ordering used to sort the children of a node. Every variant falls back to
/// key order on ties, so an index is a total order over named nodes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Index {
    Key,
    Value,
    Priority,
    /// Order by the value found at a relative child path.
    Path(Path),
}

impl Index {
    /// Build a path index. Rejects the root path and paths starting at `.priority`.
    pub fn path(path: Path) -> Result<Index> {
        match path.front() {
            None => Err(Error::InvalidPathIndex(
                "can't order by the root; use the value index instead".into(),
            )),
            Some(PRIORITY_KEY) => Err(Error::InvalidPathIndex(
                "can't order by .priority; use the priority index instead".into(),
            )),
            Some(_) => Ok(Index::Path(path)),
        }
    }

    pub fn from_query_definition(definition: &str) -> Result<Index> {
        match definition {
            ".key" => Ok(Index::Key),
            ".value" => Ok(Index::Value),
            ".priority" => Ok(Index::Priority),
            other => Index::path(Path::parse(other)),
        }
    }

    pub fn query_definition(&self) -> String {
        match self {
            Index::Key => ".key".to_string(),
            Index::Value => ".value".to_string(),
            Index::Priority => ".priority".to_string(),
            Index::Path(path) => path.wire_format(),
        }
    }

    /// The value this index sorts by for a node.
    pub fn indexed_value(&self, node: &Node) -> Node {
        match self {
            Index::Key => Node::Empty,
            Index::Value => node.clone(),
            Index::Priority => node.priority().clone(),
            Index::Path(path) => node.get_child(path),
        }
    }

    pub fn compare_parts(&self, a_name: &str, a: &Node, b_name: &str, b: &Node) -> Ordering {
        if let Index::Key = self {
            return compare_keys(a_name, b_name);
        }
        match self.indexed_value(a).compare(&self.indexed_value(b)) {
            Ordering::Equal => compare_keys(a_name, b_name),
            unequal => unequal,
        }
    }

    pub fn compare(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        self.compare_parts(&a.name, &a.node, &b.name, &b.node)
    }

    pub fn compare_reversed(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        self.compare(b, a)
    }

    /// Whether a node carries any data this index sorts on.
    pub fn is_defined_on(&self, node: &Node) -> bool {
        match self {
            Index::Key | Index::Value => true,
            Index::Priority => !node.priority().is_empty(),
            Index::Path(path) => !node.get_child(path).is_empty(),
        }
    }

    /// Whether replacing `old` by `new` can move the child under this index.
    pub fn indexed_value_changed(&self, old: &Node, new: &Node) -> bool {
        match self {
            Index::Key => false,
            Index::Value => old != new,
            Index::Priority => old.priority() != new.priority(),
            Index::Path(path) => old.get_child(path).compare(&new.get_child(path)) != Ordering::Equal,
        }
    }

    pub fn min_post(&self) -> NamedNode {
        NamedNode::min()
    }

    pub fn max_post(&self) -> NamedNode {
        match self {
            Index::Key | Index::Value => NamedNode::max(),
            Index::Priority | Index::Path(_) => self.make_post(&Node::Max, MAX_NAME),
        }
    }

    /// A synthetic named node that sorts where `indexed_value` would.
    pub fn make_post(&self, indexed_value: &Node, name: &str) -> NamedNode {
        match self {
            Index::Key => {
                let key = match indexed_value.scalar() {
                    Some(Scalar::String(s)) => s.clone(),
                    _ => name.to_string(),
                };
                NamedNode::new(key, Node::Empty)
            }
            Index::Value => NamedNode::new(name, indexed_value.clone()),
            Index::Priority => NamedNode::new(
                name,
                Node::leaf_unchecked(
                    Scalar::String(PRIORITY_POST_NAME.to_string()),
                    indexed_value.clone(),
                ),
            ),
            Index::Path(path) => {
                NamedNode::new(name, Node::Empty.update_child(path, indexed_value.clone()))
            }
        }
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Index({})", self.query_definition())
    }
}

impl Default for Index {
    fn default() -> Self {
        Index::Priority
    }
}
