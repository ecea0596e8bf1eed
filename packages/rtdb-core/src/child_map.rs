use std::cmp::Ordering;
use std::sync::Arc;

use crate::key_order::compare_keys;

/// Immutable map from child key to value, kept sorted by [`compare_keys`].
///
/// Entries live behind an `Arc`, so cloning is cheap and every update
/// produces a new map that shares the values of the old one.
#[derive(Debug)]
pub struct ChildMap<V> {
    entries: Arc<Vec<(String, V)>>,
}

impl<V> Clone for ChildMap<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for ChildMap<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
        }
    }
}

impl<V: Clone> ChildMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary entries. Later duplicates win.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, V)>) -> Self {
        let mut out: Vec<(String, V)> = Vec::new();
        for (key, value) in entries {
            match Self::search(&out, &key) {
                Ok(i) => out[i].1 = value,
                Err(i) => out.insert(i, (key, value)),
            }
        }
        Self {
            entries: Arc::new(out),
        }
    }

    fn search(entries: &[(String, V)], key: &str) -> std::result::Result<usize, usize> {
        entries.binary_search_by(|(k, _)| compare_keys(k, key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        Self::search(&self.entries, key)
            .ok()
            .map(|i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        Self::search(&self.entries, key).is_ok()
    }

    pub fn insert(&self, key: &str, value: V) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().cloned());
        match Self::search(&entries, key) {
            Ok(i) => entries[i].1 = value,
            Err(i) => entries.insert(i, (key.to_string(), value)),
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn remove(&self, key: &str) -> Self {
        match Self::search(&self.entries, key) {
            Ok(i) => {
                let mut entries = self.entries.as_ref().clone();
                entries.remove(i);
                Self {
                    entries: Arc::new(entries),
                }
            }
            Err(_) => self.clone(),
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &V)> + ExactSizeIterator {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn first(&self) -> Option<(&str, &V)> {
        self.entries.first().map(|(k, v)| (k.as_str(), v))
    }

    pub fn last(&self) -> Option<(&str, &V)> {
        self.entries.last().map(|(k, v)| (k.as_str(), v))
    }

    /// Key immediately before `key`, if `key` is present and not first.
    pub fn predecessor(&self, key: &str) -> Option<&str> {
        match Self::search(&self.entries, key) {
            Ok(i) if i > 0 => Some(self.entries[i - 1].0.as_str()),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl<V: PartialEq> PartialEq for ChildMap<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
            || (self.entries.len() == other.entries.len()
                && self
                    .entries
                    .iter()
                    .zip(other.entries.iter())
                    .all(|((ka, va), (kb, vb))| {
                        compare_keys(ka, kb) == Ordering::Equal && va == vb
                    }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_key_order_and_shares_on_clone() {
        let map = ChildMap::from_entries(vec![
            ("b".to_string(), 2),
            ("10".to_string(), 10),
            ("2".to_string(), 20),
        ]);
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["2", "10", "b"]);

        let updated = map.insert("a", 1);
        assert_eq!(updated.keys().collect::<Vec<_>>(), vec!["2", "10", "a", "b"]);
        assert_eq!(map.len(), 3);
        assert!(map.clone().ptr_eq(&map));
    }

    #[test]
    fn remove_missing_key_returns_same_map() {
        let map = ChildMap::from_entries(vec![("a".to_string(), 1)]);
        assert!(map.remove("zz").ptr_eq(&map));
        assert!(map.remove("a").is_empty());
    }

    #[test]
    fn predecessor_lookup() {
        let map = ChildMap::from_entries(vec![
            ("a".to_string(), 1),
            ("b".to_string(), 2),
            ("c".to_string(), 3),
        ]);
        assert_eq!(map.predecessor("a"), None);
        assert_eq!(map.predecessor("c"), Some("b"));
        assert_eq!(map.predecessor("missing"), None);
    }
}
