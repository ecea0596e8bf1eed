use crate::child_map::ChildMap;
use crate::path::Path;

/// Persistent path-keyed tree. Each position holds an optional value and a
/// sorted map of child tries.
///
/// A position with no value and no children is never stored as a child, so
/// removing the last value below a key drops the key. Updates rebuild only
/// the spine from the root to the target path.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistentTrie<T> {
    value: Option<T>,
    children: ChildMap<PersistentTrie<T>>,
}

impl<T: Clone> Default for PersistentTrie<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Clone> PersistentTrie<T> {
    pub fn empty() -> Self {
        Self {
            value: None,
            children: ChildMap::new(),
        }
    }

    pub fn with_value(value: T) -> Self {
        Self {
            value: Some(value),
            children: ChildMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = (&str, &PersistentTrie<T>)> {
        self.children.iter()
    }

    pub fn child(&self, key: &str) -> PersistentTrie<T> {
        self.children.get(key).cloned().unwrap_or_else(Self::empty)
    }

    /// First value on the way from the root to `path` that satisfies
    /// `predicate`, with its path relative to this trie.
    pub fn find_root_most_matching_value(
        &self,
        path: &Path,
        predicate: impl Fn(&T) -> bool,
    ) -> Option<(Path, &T)> {
        let mut current = self;
        let mut consumed = 0;
        loop {
            if let Some(value) = current.value.as_ref().filter(|v| predicate(v)) {
                let prefix = path.segments()[..consumed].to_vec();
                return Some((Path::from_segments(prefix), value));
            }
            let key = path.segments().get(consumed)?;
            current = current.children.get(key)?;
            consumed += 1;
        }
    }

    pub fn find_root_most_value_and_path(&self, path: &Path) -> Option<(Path, &T)> {
        self.find_root_most_matching_value(path, |_| true)
    }

    pub fn root_most_value(&self, path: &Path) -> Option<&T> {
        self.find_root_most_value_and_path(path).map(|(_, v)| v)
    }

    pub fn root_most_value_matching(&self, path: &Path, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.find_root_most_matching_value(path, predicate)
            .map(|(_, v)| v)
    }

    /// Deepest value on the way from the root to `path`.
    pub fn leaf_most_value(&self, path: &Path) -> Option<&T> {
        self.leaf_most_value_matching(path, |_| true)
    }

    pub fn leaf_most_value_matching(&self, path: &Path, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        let mut found = self.value.as_ref().filter(|v| predicate(v));
        let mut current = self;
        for key in path.iter() {
            match current.children.get(key) {
                Some(child) => {
                    current = child;
                    if let Some(value) = current.value.as_ref().filter(|v| predicate(v)) {
                        found = Some(value);
                    }
                }
                None => break,
            }
        }
        found
    }

    /// Whether any value anywhere in the trie satisfies `predicate`.
    pub fn contains_value(&self, predicate: &impl Fn(&T) -> bool) -> bool {
        self.value.as_ref().is_some_and(predicate)
            || self.children.values().any(|child| child.contains_value(predicate))
    }

    pub fn value_at(&self, path: &Path) -> Option<&T> {
        let mut current = self;
        for key in path.iter() {
            current = current.children.get(key)?;
        }
        current.value.as_ref()
    }

    pub fn subtree(&self, path: &Path) -> PersistentTrie<T> {
        let mut current = self;
        for key in path.iter() {
            match current.children.get(key) {
                Some(child) => current = child,
                None => return Self::empty(),
            }
        }
        current.clone()
    }

    pub fn set_value(&self, path: &Path, value: T) -> PersistentTrie<T> {
        let Some(front) = path.front() else {
            return Self {
                value: Some(value),
                children: self.children.clone(),
            };
        };
        let child = self.child(front).set_value(&path.pop_front(), value);
        Self {
            value: self.value.clone(),
            children: self.children.insert(front, child),
        }
    }

    pub fn remove_value(&self, path: &Path) -> PersistentTrie<T> {
        let Some(front) = path.front() else {
            if self.children.is_empty() {
                return Self::empty();
            }
            return Self {
                value: None,
                children: self.children.clone(),
            };
        };
        let Some(child) = self.children.get(front) else {
            return self.clone();
        };
        let child = child.remove_value(&path.pop_front());
        self.with_child(front, child)
    }

    /// Replace the subtree at `path`.
    pub fn set_tree(&self, path: &Path, tree: PersistentTrie<T>) -> PersistentTrie<T> {
        let Some(front) = path.front() else {
            return tree;
        };
        let child = self.child(front).set_tree(&path.pop_front(), tree);
        self.with_child(front, child)
    }

    fn with_child(&self, key: &str, child: PersistentTrie<T>) -> PersistentTrie<T> {
        let children = if child.is_empty() {
            self.children.remove(key)
        } else {
            self.children.insert(key, child)
        };
        if self.value.is_none() && children.is_empty() {
            return Self::empty();
        }
        Self {
            value: self.value.clone(),
            children,
        }
    }

    /// Post-order fold. `f` receives the path of each position, its value,
    /// and the folded results of its children in key order.
    pub fn fold<R>(&self, f: &mut impl FnMut(&Path, Option<&T>, Vec<(String, R)>) -> R) -> R {
        self.fold_at(&Path::root(), f)
    }

    fn fold_at<R>(
        &self,
        path: &Path,
        f: &mut impl FnMut(&Path, Option<&T>, Vec<(String, R)>) -> R,
    ) -> R {
        let mut folded = Vec::with_capacity(self.children.len());
        for (key, child) in self.children.iter() {
            folded.push((key.to_string(), child.fold_at(&path.child(key), f)));
        }
        f(path, self.value.as_ref(), folded)
    }

    /// Visit every value in pre-order.
    pub fn for_each(&self, f: &mut impl FnMut(&Path, &T)) {
        self.for_each_at(&Path::root(), f);
    }

    fn for_each_at(&self, path: &Path, f: &mut impl FnMut(&Path, &T)) {
        if let Some(value) = &self.value {
            f(path, value);
        }
        for (key, child) in self.children.iter() {
            child.for_each_at(&path.child(key), f);
        }
    }

    /// Values stored directly on immediate children.
    pub fn child_values(&self) -> impl Iterator<Item = (&str, &T)> {
        self.children
            .iter()
            .filter_map(|(key, child)| child.value.as_ref().map(|v| (key, v)))
    }
}
