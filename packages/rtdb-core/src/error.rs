use thiserror::Error;

use crate::ids::WriteId;

pub type Result<T> = std::result::Result<T, Error>;

/// Contract violations. Absence of data is never reported through this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("write id {got} is not greater than the last write id {last}")]
    NonMonotonicWriteId { last: WriteId, got: WriteId },
    #[error("no pending write with id {0}")]
    UnknownWriteId(WriteId),
    #[error("can't prune path {0} that was kept previously")]
    PruneKeptPath(String),
    #[error("invalid priority: {0}")]
    InvalidPriority(String),
    #[error("invalid path for a path index: {0}")]
    InvalidPathIndex(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("max object depth exceeded at {0}")]
    MaxDepthExceeded(String),
    #[error("path {ancestor} is an ancestor of {descendant} in the same update")]
    OverlappingUpdatePaths { ancestor: String, descendant: String },
    #[error("path {inner} is not contained in {outer}")]
    PathNotContained { outer: String, inner: String },
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("invalid change combination: {0}")]
    InvalidChange(String),
}
