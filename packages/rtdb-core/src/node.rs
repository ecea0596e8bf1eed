//! Immutable, structurally shared value tree.
//!
//! A [`Node`] is empty, a leaf carrying a [`Scalar`], or a sorted map of
//! non-empty children. Leaves and children nodes may carry a priority, which
//! is itself empty or a string/number leaf. Every update returns a new node;
//! untouched subtrees are shared through `Arc`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use crate::child_map::ChildMap;
use crate::error::{Error, Result};
use crate::hash;
use crate::key_order::{compare_keys, parse_array_index, MAX_NAME, MIN_NAME, PRIORITY_KEY, VALUE_KEY};
use crate::path::Path;

pub const DEFAULT_MAX_OBJECT_DEPTH: usize = 1000;
const PAYLOAD_METADATA_PREFIX: char = '.';
const SERVER_VALUE_KEY: &str = ".sv";

static EMPTY_NODE: Node = Node::Empty;

/// Value stored in a leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    /// Deferred server value such as `{".sv": "timestamp"}`. Lowest in order.
    Deferred(Map<String, Value>),
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    fn type_rank(&self) -> u8 {
        match self {
            Scalar::Deferred(_) => 0,
            Scalar::Bool(_) => 1,
            Scalar::Number(_) => 2,
            Scalar::String(_) => 3,
        }
    }

    /// Name of the type as used by the hash representation.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Deferred(_) => "object",
            Scalar::Bool(_) => "boolean",
            Scalar::Number(_) => "number",
            Scalar::String(_) => "string",
        }
    }

    pub fn compare(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Scalar::String(a), Scalar::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (Scalar::Deferred(_), Scalar::Deferred(_)) => Ordering::Equal,
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Deferred(map) => Value::Object(map.clone()),
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => number_to_value(*n),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    fn from_value(value: &Value) -> Result<Option<Scalar>> {
        match value {
            Value::Bool(b) => Ok(Some(Scalar::Bool(*b))),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() => Ok(Some(Scalar::Number(f))),
                _ => Err(Error::InvalidValue(format!("unrepresentable number {n}"))),
            },
            Value::String(s) => Ok(Some(Scalar::String(s.clone()))),
            Value::Object(map) if map.contains_key(SERVER_VALUE_KEY) => {
                Ok(Some(Scalar::Deferred(map.clone())))
            }
            _ => Ok(None),
        }
    }
}

/// Integral numbers inside the exactly representable range export as JSON integers.
fn number_to_value(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[derive(Debug)]
pub struct LeafNode {
    value: Scalar,
    priority: Node,
    hash: OnceLock<String>,
}

#[derive(Debug)]
pub struct ChildrenNode {
    children: ChildMap<Node>,
    priority: Node,
    hash: OnceLock<String>,
}

#[derive(Clone, Debug, Default)]
pub enum Node {
    #[default]
    Empty,
    Leaf(Arc<LeafNode>),
    Children(Arc<ChildrenNode>),
    /// Sentinel that compares greater than every other node.
    Max,
}

impl Node {
    pub fn empty() -> Node {
        Node::Empty
    }

    pub fn empty_ref() -> &'static Node {
        &EMPTY_NODE
    }

    pub fn leaf(value: Scalar) -> Node {
        Self::leaf_unchecked(value, Node::Empty)
    }

    pub fn leaf_with_priority(value: Scalar, priority: Node) -> Result<Node> {
        validate_priority(&priority)?;
        Ok(Self::leaf_unchecked(value, priority))
    }

    pub(crate) fn leaf_unchecked(value: Scalar, priority: Node) -> Node {
        Node::Leaf(Arc::new(LeafNode {
            value,
            priority,
            hash: OnceLock::new(),
        }))
    }

    fn children_node(children: ChildMap<Node>, priority: Node) -> Node {
        if children.is_empty() {
            return Node::Empty;
        }
        Node::Children(Arc::new(ChildrenNode {
            children,
            priority,
            hash: OnceLock::new(),
        }))
    }

    /// Convert a JSON-like value. `null` yields the empty node.
    pub fn from_value(value: &Value) -> Result<Node> {
        Self::from_value_with_priority(value, None)
    }

    pub fn from_value_with_priority(value: &Value, priority: Option<&Value>) -> Result<Node> {
        Self::from_value_with_depth(value, priority, DEFAULT_MAX_OBJECT_DEPTH)
    }

    pub fn from_value_with_depth(
        value: &Value,
        priority: Option<&Value>,
        max_depth: usize,
    ) -> Result<Node> {
        let mut path = Vec::new();
        convert(value, priority, 0, max_depth, &mut path)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn is_max(&self) -> bool {
        matches!(self, Node::Max)
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Leaf(leaf) => Some(&leaf.value),
            _ => None,
        }
    }

    pub fn priority(&self) -> &Node {
        match self {
            Node::Leaf(leaf) => &leaf.priority,
            Node::Children(children) => &children.priority,
            Node::Empty | Node::Max => &EMPTY_NODE,
        }
    }

    pub(crate) fn child_map(&self) -> Option<&ChildMap<Node>> {
        match self {
            Node::Children(children) => Some(&children.children),
            _ => None,
        }
    }

    /// Children in key order. Leaves and the empty node have none.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = (&str, &Node)> {
        self.child_map().into_iter().flat_map(|map| map.iter())
    }

    pub fn children_rev(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children().rev()
    }

    pub fn num_children(&self) -> usize {
        self.child_map().map(ChildMap::len).unwrap_or(0)
    }

    pub fn get_immediate_child(&self, key: &str) -> Node {
        if key == PRIORITY_KEY {
            return self.priority().clone();
        }
        self.child_map()
            .and_then(|map| map.get(key))
            .cloned()
            .unwrap_or(Node::Empty)
    }

    pub fn has_child(&self, key: &str) -> bool {
        !self.get_immediate_child(key).is_empty()
    }

    pub fn get_child(&self, path: &Path) -> Node {
        let mut current = self.clone();
        for key in path.iter() {
            current = current.get_immediate_child(key);
            if current.is_empty() {
                break;
            }
        }
        current
    }

    pub fn first_child(&self) -> Option<NamedNode> {
        self.child_map()
            .and_then(ChildMap::first)
            .map(|(k, v)| NamedNode::new(k, v.clone()))
    }

    pub fn last_child(&self) -> Option<NamedNode> {
        self.child_map()
            .and_then(ChildMap::last)
            .map(|(k, v)| NamedNode::new(k, v.clone()))
    }

    pub fn predecessor_child_key(&self, key: &str) -> Option<String> {
        self.child_map()
            .and_then(|map| map.predecessor(key))
            .map(str::to_string)
    }

    /// Replace a priority. Applying a priority to the empty node is a no-op.
    pub fn update_priority(&self, priority: Node) -> Result<Node> {
        validate_priority(&priority)?;
        Ok(self.replace_priority(priority))
    }

    /// Priorities reaching this point come from nodes that were validated
    /// when they were built.
    pub(crate) fn replace_priority(&self, priority: Node) -> Node {
        match self {
            Node::Empty | Node::Max => self.clone(),
            Node::Leaf(leaf) => Self::leaf_unchecked(leaf.value.clone(), priority),
            Node::Children(children) => Self::children_node(children.children.clone(), priority),
        }
    }

    pub fn update_immediate_child(&self, key: &str, child: Node) -> Node {
        if key == PRIORITY_KEY {
            return self.replace_priority(child);
        }
        match self {
            Node::Leaf(leaf) => {
                if child.is_empty() {
                    return self.clone();
                }
                Self::children_node(ChildMap::new().insert(key, child), leaf.priority.clone())
            }
            Node::Children(node) => {
                let children = if child.is_empty() {
                    node.children.remove(key)
                } else {
                    node.children.insert(key, child)
                };
                if children.ptr_eq(&node.children) {
                    return self.clone();
                }
                Self::children_node(children, node.priority.clone())
            }
            Node::Empty | Node::Max => {
                if child.is_empty() {
                    return Node::Empty;
                }
                Self::children_node(ChildMap::new().insert(key, child), Node::Empty)
            }
        }
    }

    /// Replace the subtree at `path`. This is a shallow replace: the old
    /// subtree is discarded, not merged.
    pub fn update_child(&self, path: &Path, child: Node) -> Node {
        let Some(front) = path.front() else {
            return child;
        };
        debug_assert!(
            front != PRIORITY_KEY || path.len() == 1,
            ".priority must be the last segment of a path"
        );
        if self.is_leaf() && child.is_empty() && front != PRIORITY_KEY {
            return self.clone();
        }
        let updated = self
            .get_immediate_child(front)
            .update_child(&path.pop_front(), child);
        self.update_immediate_child(front, updated)
    }

    /// Export to a JSON-like value.
    ///
    /// Children whose keys are all array indices and dense enough
    /// (max index < 2 * count) become arrays unless exporting. When exporting,
    /// non-empty priorities are included under `.priority`.
    pub fn val(&self, for_export: bool) -> Value {
        match self {
            Node::Empty | Node::Max => Value::Null,
            Node::Leaf(leaf) => {
                let value = leaf.value.to_value();
                if for_export && !leaf.priority.is_empty() {
                    let mut obj = Map::new();
                    obj.insert(VALUE_KEY.to_string(), value);
                    obj.insert(PRIORITY_KEY.to_string(), leaf.priority.val(false));
                    Value::Object(obj)
                } else {
                    value
                }
            }
            Node::Children(node) => {
                let mut max_index = 0usize;
                let mut all_index_keys = true;
                for key in node.children.keys() {
                    match parse_array_index(key) {
                        Some(i) => max_index = max_index.max(i),
                        None => {
                            all_index_keys = false;
                            break;
                        }
                    }
                }
                if !for_export && all_index_keys && max_index < 2 * node.children.len() {
                    let mut array = vec![Value::Null; max_index + 1];
                    for (key, child) in node.children.iter() {
                        if let Some(i) = parse_array_index(key) {
                            array[i] = child.val(for_export);
                        }
                    }
                    return Value::Array(array);
                }
                let mut obj = Map::new();
                for (key, child) in node.children.iter() {
                    obj.insert(key.to_string(), child.val(for_export));
                }
                if for_export && !node.priority.is_empty() {
                    obj.insert(PRIORITY_KEY.to_string(), node.priority.val(false));
                }
                Value::Object(obj)
            }
        }
    }

    /// Order used by value-based indexes.
    pub fn compare(&self, other: &Node) -> Ordering {
        match (self, other) {
            (Node::Max, Node::Max) => Ordering::Equal,
            (Node::Max, _) => Ordering::Greater,
            (_, Node::Max) => Ordering::Less,
            (Node::Empty, Node::Empty) => Ordering::Equal,
            (Node::Empty, _) => Ordering::Less,
            (_, Node::Empty) => Ordering::Greater,
            (Node::Leaf(a), Node::Leaf(b)) => a.value.compare(&b.value),
            (Node::Leaf(_), Node::Children(_)) => Ordering::Less,
            (Node::Children(_), Node::Leaf(_)) => Ordering::Greater,
            (Node::Children(_), Node::Children(_)) => Ordering::Equal,
        }
    }

    /// Version-1 content hash, memoised per node.
    pub fn data_hash(&self) -> String {
        match self {
            Node::Empty | Node::Max => String::new(),
            Node::Leaf(leaf) => leaf
                .hash
                .get_or_init(|| hash::leaf_hash(&leaf.value, &leaf.priority))
                .clone(),
            Node::Children(node) => node
                .hash
                .get_or_init(|| hash::children_hash(&node.children, &node.priority))
                .clone(),
        }
    }

    /// Rough size of the JSON serialization, in bytes.
    pub fn estimate_serialized_size(&self) -> usize {
        match self {
            Node::Empty | Node::Max => 4,
            Node::Leaf(leaf) => estimate_leaf_size(&leaf.value, &leaf.priority),
            Node::Children(node) => {
                1 + node
                    .children
                    .iter()
                    .map(|(key, child)| key.len() + 4 + child.estimate_serialized_size())
                    .sum::<usize>()
            }
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => Arc::ptr_eq(a, b),
            (Node::Children(a), Node::Children(b)) => Arc::ptr_eq(a, b),
            (Node::Empty, Node::Empty) | (Node::Max, Node::Max) => true,
            _ => false,
        }
    }
}

fn estimate_leaf_size(value: &Scalar, priority: &Node) -> usize {
    let value_size = match value {
        Scalar::Number(_) => 8,
        Scalar::Bool(_) => 4,
        Scalar::String(s) => 2 + s.len(),
        Scalar::Deferred(map) => Value::Object(map.clone()).to_string().len(),
    };
    match priority {
        Node::Leaf(p) => {
            // braces, ".value", ".priority", colons, comma
            let overhead = 2 + 8 + 11 + 2 + 1;
            overhead + value_size + estimate_leaf_size(&p.value, &p.priority)
        }
        _ => value_size,
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => a.value == b.value && a.priority == b.priority,
            (Node::Children(a), Node::Children(b)) => {
                a.priority == b.priority && a.children == b.children
            }
            _ => false,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.val(true))
    }
}

impl TryFrom<Value> for Node {
    type Error = Error;

    fn try_from(value: Value) -> Result<Node> {
        Node::from_value(&value)
    }
}

impl TryFrom<&Value> for Node {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Node> {
        Node::from_value(value)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::leaf(Scalar::Bool(b))
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::leaf(Scalar::Number(n as f64))
    }
}

impl From<i32> for Node {
    fn from(n: i32) -> Self {
        Node::leaf(Scalar::Number(f64::from(n)))
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::leaf(Scalar::String(s.to_string()))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::leaf(Scalar::String(s))
    }
}

/// Priorities are empty, the max sentinel, or a priority-less string,
/// number, or deferred leaf.
pub fn validate_priority(priority: &Node) -> Result<()> {
    match priority {
        Node::Empty | Node::Max => Ok(()),
        Node::Leaf(leaf) => {
            if !leaf.priority.is_empty() {
                return Err(Error::InvalidPriority(
                    "priority nodes can't have a priority of their own".into(),
                ));
            }
            match &leaf.value {
                Scalar::Number(n) if n.is_nan() => {
                    Err(Error::InvalidPriority("NaN is not a valid priority".into()))
                }
                Scalar::Number(_) | Scalar::String(_) | Scalar::Deferred(_) => Ok(()),
                Scalar::Bool(_) => Err(Error::InvalidPriority(
                    "priority must be a string or number".into(),
                )),
            }
        }
        Node::Children(_) => Err(Error::InvalidPriority(
            "priority can't be an object or array".into(),
        )),
    }
}

fn priority_from_value(value: Option<&Value>, path: &[String]) -> Result<Node> {
    let priority = match value {
        None | Some(Value::Null) => return Ok(Node::Empty),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => Node::leaf(Scalar::Number(f)),
            _ => return Err(Error::InvalidPriority(format!("{n} at /{}", path.join("/")))),
        },
        Some(Value::String(s)) => Node::leaf(Scalar::String(s.clone())),
        Some(Value::Object(map)) if map.contains_key(SERVER_VALUE_KEY) => {
            Node::leaf(Scalar::Deferred(map.clone()))
        }
        Some(other) => {
            return Err(Error::InvalidPriority(format!(
                "{other} at /{}",
                path.join("/")
            )))
        }
    };
    Ok(priority)
}

fn convert(
    value: &Value,
    priority: Option<&Value>,
    depth: usize,
    max_depth: usize,
    path: &mut Vec<String>,
) -> Result<Node> {
    if depth > max_depth {
        let shown: Vec<&str> = path.iter().take(100).map(String::as_str).collect();
        return Err(Error::MaxDepthExceeded(shown.join(".")));
    }
    if value.is_null() {
        return Ok(Node::Empty);
    }
    let mut priority = priority_from_value(priority, path)?;
    let mut value = value;
    if let Value::Object(map) = value {
        if let Some(raw) = map.get(PRIORITY_KEY) {
            priority = priority_from_value(Some(raw), path)?;
        }
        if let Some(payload) = map.get(VALUE_KEY) {
            if payload.is_null() {
                return Ok(Node::Empty);
            }
            if Scalar::from_value(payload)?.is_none() {
                return Err(Error::InvalidValue(format!(
                    ".value must be a string, number or boolean at /{}",
                    path.join("/")
                )));
            }
            value = payload;
        }
    }
    if let Some(scalar) = Scalar::from_value(value)? {
        return Ok(Node::leaf_unchecked(scalar, priority));
    }

    let mut entries = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.starts_with(PAYLOAD_METADATA_PREFIX) {
                    continue;
                }
                path.push(key.clone());
                let node = convert(child, None, depth + 1, max_depth, path)?;
                path.pop();
                if !node.is_empty() {
                    entries.push((key.clone(), node));
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let key = i.to_string();
                path.push(key.clone());
                let node = convert(child, None, depth + 1, max_depth, path)?;
                path.pop();
                if !node.is_empty() {
                    entries.push((key, node));
                }
            }
        }
        other => {
            return Err(Error::InvalidValue(format!(
                "can't store {other} at /{}",
                path.join("/")
            )))
        }
    }
    Ok(Node::children_node(ChildMap::from_entries(entries), priority))
}

/// A child node together with its key.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedNode {
    pub name: String,
    pub node: Node,
}

impl NamedNode {
    pub fn new(name: impl Into<String>, node: Node) -> Self {
        Self {
            name: name.into(),
            node,
        }
    }

    pub fn min() -> Self {
        Self::new(MIN_NAME, Node::Empty)
    }

    pub fn max() -> Self {
        Self::new(MAX_NAME, Node::Max)
    }

    pub fn compare_names(&self, other: &NamedNode) -> Ordering {
        compare_keys(&self.name, &other.name)
    }
}
