#![forbid(unsafe_code)]
//! Client-side synchronization core for a realtime tree database.
//! Data is held in immutable nodes; local writes are layered over the server
//! cache until acknowledged, and views turn each change into ordered child
//! and value events. Networking and persistence sit behind the traits in
//! [`traits`], so the crate can be embedded in any host.

pub mod cache;
pub mod change;
pub mod child_map;
pub mod child_source;
pub mod compound_write;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod hash;
pub mod ids;
pub mod index;
pub mod indexed_node;
pub mod key_order;
pub mod node;
pub mod operation;
pub mod path;
pub mod protocol;
pub mod prune;
pub mod query;
pub mod range_merge;
pub mod replica;
pub mod traits;
pub mod trie;
pub mod view_processor;
pub mod write_log;

pub use cache::{CacheNode, ViewCache};
pub use change::{Change, ChangeAccumulator, ChangeKind};
pub use child_source::{CompleteChildSource, NoCompleteChildSource, WriteLogCompleteChildSource};
pub use compound_write::CompoundWrite;
pub use config::{CachePolicy, ReplicaConfig};
pub use error::{Error, Result};
pub use events::order_changes;
pub use filter::{IndexedFilter, LimitedFilter, NodeFilter, RangedFilter};
pub use ids::{QueryTag, WriteId};
pub use index::Index;
pub use indexed_node::IndexedNode;
pub use key_order::{compare_keys, MAX_NAME, MIN_NAME};
pub use node::{NamedNode, Node, Scalar};
pub use operation::{Operation, OperationSource};
pub use path::Path;
pub use protocol::{OutgoingRequest, ServerEvent};
pub use prune::{plan_prune, PruneForest, TrackedQuery};
pub use query::{QueryBound, QueryParams, ViewFrom};
pub use range_merge::RangeMerge;
pub use replica::LocalReplica;
pub use traits::{MemoryTransport, SequentialWriteIds, Transport, WriteIdSource};
pub use trie::PersistentTrie;
pub use view_processor::{ProcessorResult, ViewProcessor};
pub use write_log::{WriteLog, WriteLogView, WritePayload, WriteRecord};
