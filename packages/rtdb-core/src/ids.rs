#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a pending local write. Strictly increasing per connection.
pub type WriteId = u64;

/// Tag the server attaches to data for a filtered listen.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueryTag(pub u64);

impl QueryTag {
    pub fn new(tag: u64) -> Self {
        Self(tag)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}
