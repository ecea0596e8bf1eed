use crate::compound_write::CompoundWrite;
use crate::ids::QueryTag;
use crate::node::Node;
use crate::path::Path;
use crate::trie::PersistentTrie;

/// Who produced an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationSource {
    User,
    /// Server data, tagged when it belongs to one filtered listen only.
    Server { tag: Option<QueryTag> },
}

impl OperationSource {
    pub fn server() -> Self {
        OperationSource::Server { tag: None }
    }

    pub fn tagged(tag: QueryTag) -> Self {
        OperationSource::Server { tag: Some(tag) }
    }

    pub fn is_from_user(&self) -> bool {
        matches!(self, OperationSource::User)
    }

    pub fn is_from_server(&self) -> bool {
        !self.is_from_user()
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, OperationSource::Server { tag: Some(_) })
    }

    pub fn tag(&self) -> Option<QueryTag> {
        match self {
            OperationSource::Server { tag } => *tag,
            OperationSource::User => None,
        }
    }
}

/// A change applied to a view, relative to the view's location.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Overwrite {
        source: OperationSource,
        path: Path,
        snap: Node,
    },
    Merge {
        source: OperationSource,
        path: Path,
        children: CompoundWrite,
    },
    /// A pending write was acknowledged or reverted by the server.
    /// `affected` marks the paths the write touched: a value at the root
    /// for an overwrite, one value per merged child for a merge.
    AckUserWrite {
        path: Path,
        affected: PersistentTrie<bool>,
        revert: bool,
    },
    ListenComplete {
        source: OperationSource,
        path: Path,
    },
}

impl Operation {
    pub fn path(&self) -> &Path {
        match self {
            Operation::Overwrite { path, .. }
            | Operation::Merge { path, .. }
            | Operation::AckUserWrite { path, .. }
            | Operation::ListenComplete { path, .. } => path,
        }
    }

    pub fn source(&self) -> OperationSource {
        match self {
            Operation::Overwrite { source, .. }
            | Operation::Merge { source, .. }
            | Operation::ListenComplete { source, .. } => *source,
            Operation::AckUserWrite { .. } => OperationSource::User,
        }
    }

    /// The same operation seen from child `key`, or `None` if it doesn't
    /// reach that child.
    pub fn for_child(&self, key: &str) -> Option<Operation> {
        match self {
            Operation::Overwrite { source, path, snap } => match path.front() {
                None => Some(Operation::Overwrite {
                    source: *source,
                    path: Path::root(),
                    snap: snap.get_immediate_child(key),
                }),
                Some(front) if front == key => Some(Operation::Overwrite {
                    source: *source,
                    path: path.pop_front(),
                    snap: snap.clone(),
                }),
                Some(_) => None,
            },
            Operation::Merge {
                source,
                path,
                children,
            } => match path.front() {
                None => {
                    let child = children.child_compound_write_at_path(&Path::from(key));
                    if child.is_empty() {
                        None
                    } else if let Some(root) = child.root_write() {
                        Some(Operation::Overwrite {
                            source: *source,
                            path: Path::root(),
                            snap: root.clone(),
                        })
                    } else {
                        Some(Operation::Merge {
                            source: *source,
                            path: Path::root(),
                            children: child,
                        })
                    }
                }
                Some(front) if front == key => Some(Operation::Merge {
                    source: *source,
                    path: path.pop_front(),
                    children: children.clone(),
                }),
                Some(_) => None,
            },
            Operation::AckUserWrite {
                path,
                affected,
                revert,
            } => match path.front() {
                Some(front) if front == key => Some(Operation::AckUserWrite {
                    path: path.pop_front(),
                    affected: affected.clone(),
                    revert: *revert,
                }),
                Some(_) => None,
                None if affected.value().is_some() => Some(self.clone()),
                None => {
                    let child = affected.child(key);
                    (!child.is_empty()).then(|| Operation::AckUserWrite {
                        path: Path::root(),
                        affected: child,
                        revert: *revert,
                    })
                }
            },
            Operation::ListenComplete { source, path } => match path.front() {
                None => Some(self.clone()),
                Some(front) if front == key => Some(Operation::ListenComplete {
                    source: *source,
                    path: path.pop_front(),
                }),
                Some(_) => None,
            },
        }
    }
}
