#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::node::DEFAULT_MAX_OBJECT_DEPTH;

fn default_percent_of_queries_to_prune_at_once() -> f64 {
    0.2
}

fn default_max_number_of_queries_to_keep() -> usize {
    1000
}

fn default_max_object_depth() -> usize {
    DEFAULT_MAX_OBJECT_DEPTH
}

/// How aggressively cached queries are dropped once they go inactive.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CachePolicy {
    #[cfg_attr(feature = "serde", serde(default = "default_percent_of_queries_to_prune_at_once"))]
    pub percent_of_queries_to_prune_at_once: f64,
    #[cfg_attr(feature = "serde", serde(default = "default_max_number_of_queries_to_keep"))]
    pub max_number_of_queries_to_keep: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            percent_of_queries_to_prune_at_once: default_percent_of_queries_to_prune_at_once(),
            max_number_of_queries_to_keep: default_max_number_of_queries_to_keep(),
        }
    }
}

impl CachePolicy {
    /// Inactive queries to drop out of `prunable`.
    pub fn number_of_queries_to_prune(&self, prunable: usize) -> usize {
        let by_percent = (prunable as f64 * self.percent_of_queries_to_prune_at_once).ceil() as usize;
        let over_max = prunable.saturating_sub(self.max_number_of_queries_to_keep);
        by_percent.max(over_max).min(prunable)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicaConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub cache_policy: CachePolicy,
    #[cfg_attr(feature = "serde", serde(default = "default_max_object_depth"))]
    pub max_object_depth: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::default(),
            max_object_depth: default_max_object_depth(),
        }
    }
}
