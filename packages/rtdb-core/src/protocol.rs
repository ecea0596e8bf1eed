use serde_json::{json, Value};

use crate::compound_write::CompoundWrite;
use crate::ids::{QueryTag, WriteId};
use crate::node::Node;
use crate::path::Path;
use crate::range_merge::RangeMerge;

/// Decoded message from the server.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    DataUpdate {
        path: Path,
        data: Node,
        tag: Option<QueryTag>,
    },
    DataMerge {
        path: Path,
        changed: CompoundWrite,
        tag: Option<QueryTag>,
    },
    RangeMerge {
        path: Path,
        ranges: Vec<RangeMerge>,
        tag: Option<QueryTag>,
    },
    ListenComplete {
        path: Path,
        tag: Option<QueryTag>,
    },
    WriteAcked {
        write_id: WriteId,
    },
    WriteRejected {
        write_id: WriteId,
        reason: String,
    },
}

/// Request for the transport to send.
#[derive(Clone, Debug, PartialEq)]
pub enum OutgoingRequest {
    Put {
        path: Path,
        data: Node,
        write_id: WriteId,
    },
    Merge {
        path: Path,
        changed: CompoundWrite,
        write_id: WriteId,
    },
    Listen {
        path: Path,
        index_definition: String,
        tag: Option<QueryTag>,
    },
    Unlisten {
        path: Path,
        tag: Option<QueryTag>,
    },
}

impl OutgoingRequest {
    pub fn path(&self) -> &Path {
        match self {
            OutgoingRequest::Put { path, .. }
            | OutgoingRequest::Merge { path, .. }
            | OutgoingRequest::Listen { path, .. }
            | OutgoingRequest::Unlisten { path, .. } => path,
        }
    }

    /// Plain JSON payload with exported values.
    pub fn to_value(&self) -> Value {
        match self {
            OutgoingRequest::Put {
                path,
                data,
                write_id,
            } => json!({
                "action": "put",
                "path": path.wire_format(),
                "data": data.val(true),
                "write_id": write_id,
            }),
            OutgoingRequest::Merge {
                path,
                changed,
                write_id,
            } => json!({
                "action": "merge",
                "path": path.wire_format(),
                "data": Value::Object(changed.val(true)),
                "write_id": write_id,
            }),
            OutgoingRequest::Listen {
                path,
                index_definition,
                tag,
            } => json!({
                "action": "listen",
                "path": path.wire_format(),
                "index": index_definition,
                "tag": tag.map(|t| t.get()),
            }),
            OutgoingRequest::Unlisten { path, tag } => json!({
                "action": "unlisten",
                "path": path.wire_format(),
                "tag": tag.map(|t| t.get()),
            }),
        }
    }
}
