//! Local replica of one database connection.
//!
//! Owns the write log, the root view of the data and the collaborators that
//! send requests and hand out write ids. Every local write and server event
//! runs through the view processor; the resulting changes queue up in
//! delivery order until the caller takes them.

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::cache::ViewCache;
use crate::change::Change;
use crate::compound_write::CompoundWrite;
use crate::config::ReplicaConfig;
use crate::error::{Error, Result};
use crate::events::order_changes;
use crate::ids::{QueryTag, WriteId};
use crate::node::Node;
use crate::operation::{Operation, OperationSource};
use crate::path::Path;
use crate::protocol::{OutgoingRequest, ServerEvent};
use crate::query::QueryParams;
use crate::traits::{SequentialWriteIds, Transport, WriteIdSource};
use crate::trie::PersistentTrie;
use crate::view_processor::ViewProcessor;
use crate::write_log::{WriteLog, WritePayload, WriteRecord};

pub struct LocalReplica<T: Transport, W: WriteIdSource = SequentialWriteIds> {
    config: ReplicaConfig,
    transport: T,
    write_ids: W,
    writes: WriteLog,
    processor: ViewProcessor,
    view: ViewCache,
    events: Vec<Change>,
}

impl<T: Transport> LocalReplica<T, SequentialWriteIds> {
    pub fn new(transport: T) -> Self {
        Self::with_parts(transport, SequentialWriteIds::new(), ReplicaConfig::default())
    }
}

impl<T: Transport, W: WriteIdSource> LocalReplica<T, W> {
    pub fn with_parts(transport: T, write_ids: W, config: ReplicaConfig) -> Self {
        let processor = ViewProcessor::for_query(&QueryParams::new());
        let view = processor.empty_view_cache();
        Self {
            config,
            transport,
            write_ids,
            writes: WriteLog::new(),
            processor,
            view,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn write_log(&self) -> &WriteLog {
        &self.writes
    }

    pub fn pending_writes(&self) -> &[WriteRecord] {
        self.writes.all_writes()
    }

    pub fn view_cache(&self) -> &ViewCache {
        &self.view
    }

    /// Ask the server for data at `path`.
    pub fn listen(&mut self, path: Path, params: &QueryParams, tag: Option<QueryTag>) -> Result<()> {
        self.transport.send(OutgoingRequest::Listen {
            path,
            index_definition: params.index().query_definition(),
            tag,
        })
    }

    pub fn unlisten(&mut self, path: Path, tag: Option<QueryTag>) -> Result<()> {
        self.transport.send(OutgoingRequest::Unlisten { path, tag })
    }

    /// Replace the data at `path`, showing it locally before the server
    /// confirms.
    pub fn set(&mut self, path: Path, value: &Value) -> Result<WriteId> {
        let node = Node::from_value_with_depth(value, None, self.config.max_object_depth)?;
        self.set_node(path, node)
    }

    pub fn set_node(&mut self, path: Path, node: Node) -> Result<WriteId> {
        let write_id = self.write_ids.next_write_id();
        self.writes
            .add_overwrite(path.clone(), node.clone(), write_id, true)?;
        self.send_write(
            OutgoingRequest::Put {
                path: path.clone(),
                data: node.clone(),
                write_id,
            },
            write_id,
        )?;
        self.apply(Operation::Overwrite {
            source: OperationSource::User,
            path,
            snap: node,
        })?;
        Ok(write_id)
    }

    /// Write several children of `path` at once. Keys are relative paths
    /// and may not contain one another.
    pub fn update(&mut self, path: Path, children: &Map<String, Value>) -> Result<WriteId> {
        let changed = CompoundWrite::from_value_map(children)?;
        let write_id = self.write_ids.next_write_id();
        self.writes.add_merge(path.clone(), changed.clone(), write_id)?;
        self.send_write(
            OutgoingRequest::Merge {
                path: path.clone(),
                changed: changed.clone(),
                write_id,
            },
            write_id,
        )?;
        self.apply(Operation::Merge {
            source: OperationSource::User,
            path,
            children: changed,
        })?;
        Ok(write_id)
    }

    pub fn apply_server_event(&mut self, event: ServerEvent) -> Result<()> {
        trace!(?event, "applying server event");
        match event {
            ServerEvent::DataUpdate { path, data, tag } => self.apply(Operation::Overwrite {
                source: server_source(tag),
                path,
                snap: data,
            }),
            ServerEvent::DataMerge { path, changed, tag } => self.apply(Operation::Merge {
                source: server_source(tag),
                path,
                children: changed,
            }),
            ServerEvent::RangeMerge { path, ranges, tag } => {
                let current = self.view.server_cache().node().get_child(&path);
                let updated = ranges
                    .iter()
                    .fold(current, |node, range| range.apply_to_node(&node));
                self.apply(Operation::Overwrite {
                    source: server_source(tag),
                    path,
                    snap: updated,
                })
            }
            ServerEvent::ListenComplete { path, tag } => self.apply(Operation::ListenComplete {
                source: server_source(tag),
                path,
            }),
            ServerEvent::WriteAcked { write_id } => self.finish_write(write_id, false),
            ServerEvent::WriteRejected { write_id, reason } => {
                warn!(write_id, %reason, "write rejected by server");
                self.finish_write(write_id, true)
            }
        }
    }

    /// Drop every pending write, e.g. after the connection was lost for good.
    pub fn purge_pending_writes(&mut self) -> Result<Vec<WriteRecord>> {
        let purged = self.writes.remove_all();
        if !purged.is_empty() {
            debug!(count = purged.len(), "purged pending writes");
            self.apply(Operation::AckUserWrite {
                path: Path::root(),
                affected: PersistentTrie::with_value(true),
                revert: true,
            })?;
        }
        Ok(purged)
    }

    /// Server data at `path` with pending writes applied, when known.
    pub fn value_at(&self, path: &Path) -> Option<Node> {
        let server = self.view.complete_server_node().map(|node| node.get_child(path));
        self.writes.complete_event_cache(path, server.as_ref())
    }

    /// Changes produced since the last call, in delivery order.
    pub fn take_events(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.events)
    }

    /// A write the transport refused never reaches the view, so it leaves
    /// the log again.
    fn send_write(&mut self, request: OutgoingRequest, write_id: WriteId) -> Result<()> {
        if let Err(err) = self.transport.send(request) {
            warn!(write_id, error = %err, "dropping write that failed to send");
            self.writes.remove(write_id)?;
            return Err(err);
        }
        Ok(())
    }

    fn finish_write(&mut self, write_id: WriteId, revert: bool) -> Result<()> {
        let record = self
            .writes
            .write(write_id)
            .cloned()
            .ok_or(Error::UnknownWriteId(write_id))?;
        if !self.writes.remove(write_id)? {
            return Ok(());
        }
        let affected = match &record.payload {
            WritePayload::Overwrite(_) => PersistentTrie::with_value(true),
            WritePayload::Merge(merge) => merge
                .writes()
                .into_iter()
                .fold(PersistentTrie::empty(), |affected, (path, _)| {
                    affected.set_value(&path, true)
                }),
        };
        self.apply(Operation::AckUserWrite {
            path: record.path,
            affected,
            revert,
        })
    }

    fn apply(&mut self, op: Operation) -> Result<()> {
        let result = self.processor.apply_operation(
            &self.view,
            &op,
            &self.writes.view(Path::root()),
            None,
        )?;
        let ordered = order_changes(
            result.changes,
            result.view_cache.event_cache().indexed_node(),
            self.processor.filter().index(),
        );
        trace!(path = %op.path(), changes = ordered.len(), "applied operation");
        self.view = result.view_cache;
        self.events.extend(ordered);
        Ok(())
    }
}

fn server_source(tag: Option<QueryTag>) -> OperationSource {
    OperationSource::Server { tag }
}
