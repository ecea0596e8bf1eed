use tracing::debug;

use crate::config::CachePolicy;
use crate::error::{Error, Result};
use crate::path::Path;
use crate::trie::PersistentTrie;

const PRUNE: bool = true;
const KEEP: bool = false;

/// Marks which cached subtrees to drop (`true`) and which to keep (`false`).
/// The deepest decision on a path wins; keep decisions can't be overridden
/// by a later prune.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PruneForest {
    forest: PersistentTrie<bool>,
}

impl PruneForest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn prunes_anything(&self) -> bool {
        self.forest.contains_value(&|prune: &bool| *prune)
    }

    /// Whether descendants of `path` that are not explicitly kept get pruned.
    pub fn should_prune_unkept_descendants(&self, path: &Path) -> bool {
        self.forest.leaf_most_value(path) == Some(&PRUNE)
    }

    pub fn should_keep(&self, path: &Path) -> bool {
        self.forest.leaf_most_value(path) == Some(&KEEP)
    }

    pub fn affects_path(&self, path: &Path) -> bool {
        self.forest.root_most_value(path).is_some() || !self.forest.subtree(path).is_empty()
    }

    /// Forest for the child `key`, inheriting this level's decision.
    pub fn child(&self, key: &str) -> PruneForest {
        let child = self.forest.child(key);
        let forest = match (child.value(), self.forest.value()) {
            (None, Some(inherited)) => child.set_value(&Path::root(), *inherited),
            _ => child,
        };
        Self { forest }
    }

    pub fn child_at_path(&self, path: &Path) -> PruneForest {
        path.iter().fold(self.clone(), |forest, key| forest.child(key))
    }

    fn kept_above(&self, path: &Path) -> bool {
        self.forest.root_most_value_matching(path, |v| *v == KEEP).is_some()
    }

    /// Whether `path`, one of its ancestors, or one of its descendants is kept.
    fn keeps_overlapping(&self, path: &Path) -> bool {
        self.kept_above(path) || self.forest.subtree(path).contains_value(&|v: &bool| *v == KEEP)
    }

    fn pruned_above(&self, path: &Path) -> bool {
        self.forest.root_most_value_matching(path, |v| *v == PRUNE).is_some()
    }

    pub fn prune_path(&self, path: &Path) -> Result<PruneForest> {
        if self.keeps_overlapping(path) {
            return Err(Error::PruneKeptPath(path.wire_format()));
        }
        if self.pruned_above(path) {
            return Ok(self.clone());
        }
        Ok(Self {
            forest: self.forest.set_tree(path, PersistentTrie::with_value(PRUNE)),
        })
    }

    pub fn keep_path(&self, path: &Path) -> PruneForest {
        if self.kept_above(path) {
            return self.clone();
        }
        Self {
            forest: self.forest.set_tree(path, PersistentTrie::with_value(KEEP)),
        }
    }

    /// Keep every child in `keys` under `path` in one rewrite.
    pub fn keep_all<'k>(&self, keys: impl IntoIterator<Item = &'k str>, path: &Path) -> PruneForest {
        if self.kept_above(path) {
            return self.clone();
        }
        self.set_all(keys, path, KEEP)
    }

    pub fn prune_all<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k str>,
        path: &Path,
    ) -> Result<PruneForest> {
        let keys: Vec<&str> = keys.into_iter().collect();
        if self.kept_above(path) {
            return Err(Error::PruneKeptPath(path.wire_format()));
        }
        if let Some(kept) = keys
            .iter()
            .map(|key| path.child(key))
            .find(|child| self.keeps_overlapping(child))
        {
            return Err(Error::PruneKeptPath(kept.wire_format()));
        }
        if self.pruned_above(path) {
            return Ok(self.clone());
        }
        Ok(self.set_all(keys, path, PRUNE))
    }

    fn set_all<'k>(&self, keys: impl IntoIterator<Item = &'k str>, path: &Path, value: bool) -> PruneForest {
        let subtree = keys.into_iter().fold(self.forest.subtree(path), |subtree, key| {
            subtree.set_tree(&Path::from_segments(vec![key.to_string()]), PersistentTrie::with_value(value))
        });
        Self {
            forest: self.forest.set_tree(path, subtree),
        }
    }

    /// Fold over every kept path in pre-order.
    pub fn fold_kept_nodes<A>(&self, init: A, mut f: impl FnMut(&Path, A) -> A) -> A {
        let mut kept = Vec::new();
        self.forest.for_each(&mut |path, prune| {
            if *prune == KEEP {
                kept.push(path.clone());
            }
        });
        kept.iter().fold(init, |acc, path| f(path, acc))
    }

    pub fn kept_paths(&self) -> Vec<Path> {
        self.fold_kept_nodes(Vec::new(), |path, mut paths| {
            paths.push(path.clone());
            paths
        })
    }
}

/// A cached query the pruner can decide on.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedQuery {
    pub id: u64,
    pub path: Path,
    /// Milliseconds since the epoch of the last time a listener used it.
    pub last_use: i64,
    pub active: bool,
    pub complete: bool,
}

/// Prune the least recently used inactive queries and keep everything else.
pub fn plan_prune(tracked: &[TrackedQuery], policy: &CachePolicy) -> Result<PruneForest> {
    let (mut prunable, active): (Vec<&TrackedQuery>, Vec<&TrackedQuery>) =
        tracked.iter().partition(|query| !query.active);
    prunable.sort_by_key(|query| query.last_use);
    let to_prune = policy.number_of_queries_to_prune(prunable.len());

    let mut forest = PruneForest::empty();
    for query in &prunable[..to_prune] {
        forest = forest.prune_path(&query.path)?;
    }
    for query in prunable[to_prune..].iter().chain(active.iter()) {
        forest = forest.keep_path(&query.path);
    }
    debug!(
        pruned = to_prune,
        kept = tracked.len() - to_prune,
        "planned cache prune"
    );
    Ok(forest)
}
