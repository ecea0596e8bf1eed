use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::key_order::compare_keys;

/// Immutable slash-separated location in the tree.
///
/// A path is a window `[start, end)` into a shared segment array, so
/// `pop_front` and `parent` never copy segments.
#[derive(Clone)]
pub struct Path {
    segments: Arc<[String]>,
    start: usize,
    end: usize,
}

impl Path {
    pub fn root() -> Self {
        Self::from_segments(Vec::new())
    }

    /// Parse a wire string. Empty segments are dropped, so `"/a//b/"` is `a/b`.
    pub fn parse(s: &str) -> Self {
        Self::from_segments(
            s.split('/')
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        let end = segments.len();
        Self {
            segments: segments.into(),
            start: 0,
            end,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments[self.start..self.end]
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.segments().iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn front(&self) -> Option<&str> {
        self.segments().first().map(String::as_str)
    }

    pub fn back(&self) -> Option<&str> {
        self.segments().last().map(String::as_str)
    }

    /// Everything after the first segment. Popping the root yields the root.
    pub fn pop_front(&self) -> Path {
        Self {
            segments: Arc::clone(&self.segments),
            start: (self.start + 1).min(self.end),
            end: self.end,
        }
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_empty() {
            return None;
        }
        Some(Self {
            segments: Arc::clone(&self.segments),
            start: self.start,
            end: self.end - 1,
        })
    }

    /// Append one or more segments given as a slash-separated string.
    pub fn child(&self, key: &str) -> Path {
        let mut segments = self.segments().to_vec();
        segments.extend(
            key.split('/')
                .filter(|piece| !piece.is_empty())
                .map(str::to_string),
        );
        Self::from_segments(segments)
    }

    pub fn child_path(&self, other: &Path) -> Path {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut segments = self.segments().to_vec();
        segments.extend(other.segments().iter().cloned());
        Self::from_segments(segments)
    }

    /// Whether `self` is a prefix of (or equal to) `other`.
    pub fn contains(&self, other: &Path) -> bool {
        self.len() <= other.len()
            && self
                .segments()
                .iter()
                .zip(other.segments().iter())
                .all(|(a, b)| a == b)
    }

    /// `self` expressed relative to `ancestor`, or `None` if `ancestor` does
    /// not contain `self`.
    pub fn relative_to(&self, ancestor: &Path) -> Option<Path> {
        if !ancestor.contains(self) {
            return None;
        }
        Some(Self {
            segments: Arc::clone(&self.segments),
            start: self.start + ancestor.len(),
            end: self.end,
        })
    }

    /// Segment-wise comparison using child key order; a prefix sorts first.
    pub fn compare(&self, other: &Path) -> Ordering {
        for (a, b) in self.segments().iter().zip(other.segments().iter()) {
            match compare_keys(a, b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.len().cmp(&other.len())
    }

    pub fn wire_format(&self) -> String {
        if self.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in self.segments() {
            out.push('/');
            out.push_str(segment);
        }
        out
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.segments() == other.segments()
    }
}

impl Eq for Path {}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.segments().hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_format())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.wire_format())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_wire_format() {
        assert_eq!(Path::parse("").wire_format(), "/");
        assert_eq!(Path::parse("/a//b/").wire_format(), "/a/b");
        assert_eq!(Path::parse("a/b").len(), 2);
        assert_eq!(Path::parse("a/b").to_string(), "/a/b");
    }

    #[test]
    fn slicing_shares_segments() {
        let path = Path::parse("a/b/c");
        let tail = path.pop_front();
        assert_eq!(tail, Path::parse("b/c"));
        assert_eq!(tail.front(), Some("b"));
        assert!(Arc::ptr_eq(&path.segments, &tail.segments));
        assert_eq!(path.parent(), Some(Path::parse("a/b")));
        assert_eq!(Path::root().parent(), None);
        assert_eq!(Path::root().pop_front(), Path::root());
    }

    #[test]
    fn containment_and_relative_paths() {
        let a = Path::parse("a");
        let abc = Path::parse("a/b/c");
        assert!(a.contains(&abc));
        assert!(abc.contains(&abc));
        assert!(!abc.contains(&a));
        assert!(Path::root().contains(&a));
        assert_eq!(abc.relative_to(&a), Some(Path::parse("b/c")));
        assert_eq!(a.relative_to(&abc), None);
        assert_eq!(a.relative_to(&Path::parse("ab")), None);
    }

    #[test]
    fn compare_uses_key_order() {
        assert_eq!(Path::parse("a/2").compare(&Path::parse("a/10")), Ordering::Less);
        assert_eq!(Path::parse("a").compare(&Path::parse("a/b")), Ordering::Less);
        assert_eq!(Path::parse("b").compare(&Path::parse("a/z")), Ordering::Greater);
        assert_eq!(Path::parse("a/b").compare(&Path::parse("a/b")), Ordering::Equal);
    }

    #[test]
    fn child_appends_segments() {
        let p = Path::parse("a").child("b/c");
        assert_eq!(p, Path::parse("a/b/c"));
        assert_eq!(p.back(), Some("c"));
        assert_eq!(
            Path::parse("x").child_path(&Path::parse("y/z")),
            Path::parse("x/y/z")
        );
    }
}
