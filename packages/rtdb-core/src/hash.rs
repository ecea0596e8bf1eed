//! Version-1 content hash shared with the server.
//!
//! The string representation is hashed with SHA-1 and encoded as standard
//! base64. Empty content hashes to the empty string.

use std::cmp::Ordering;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::child_map::ChildMap;
use crate::key_order::compare_keys;
use crate::node::{Node, Scalar};

pub fn sha1_base64(input: &str) -> String {
    let digest = Sha1::digest(input.as_bytes());
    STANDARD.encode(digest)
}

/// Number representation: the IEEE-754 bits as 16 lowercase hex digits.
pub fn double_to_hex(n: f64) -> String {
    format!("{:016x}", n.to_bits())
}

fn push_scalar_repr(value: &Scalar, out: &mut String) {
    out.push_str(value.type_name());
    out.push(':');
    match value {
        Scalar::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Scalar::Number(n) => out.push_str(&double_to_hex(*n)),
        Scalar::String(s) => out.push_str(s),
        // Deferred values are resolved before hashing; keep the output stable anyway.
        Scalar::Deferred(map) => out.push_str(&serde_json::Value::Object(map.clone()).to_string()),
    }
}

fn push_priority_repr(priority: &Node, out: &mut String) {
    if let Some(value) = priority.scalar() {
        out.push_str("priority:");
        push_scalar_repr(value, out);
        out.push(':');
    }
}

/// Pre-hash representation of a leaf.
pub fn leaf_hash_repr(value: &Scalar, priority: &Node) -> String {
    let mut out = String::new();
    push_priority_repr(priority, &mut out);
    push_scalar_repr(value, &mut out);
    out
}

pub(crate) fn leaf_hash(value: &Scalar, priority: &Node) -> String {
    sha1_base64(&leaf_hash_repr(value, priority))
}

/// Pre-hash representation of a children node.
///
/// Children are visited in priority order when any immediate child carries a
/// priority, in key order otherwise. Children with an empty hash are skipped.
pub fn children_hash_repr(children: &ChildMap<Node>, priority: &Node) -> String {
    let mut out = String::new();
    push_priority_repr(priority, &mut out);

    let mut ordered: Vec<(&str, &Node)> = children.iter().collect();
    if ordered.iter().any(|(_, child)| !child.priority().is_empty()) {
        ordered.sort_by(|(ka, a), (kb, b)| match a.priority().compare(b.priority()) {
            Ordering::Equal => compare_keys(ka, kb),
            unequal => unequal,
        });
    }
    for (key, child) in ordered {
        let child_hash = child.data_hash();
        if !child_hash.is_empty() {
            out.push(':');
            out.push_str(key);
            out.push(':');
            out.push_str(&child_hash);
        }
    }
    out
}

pub(crate) fn children_hash(children: &ChildMap<Node>, priority: &Node) -> String {
    let repr = children_hash_repr(children, priority);
    if repr.is_empty() {
        String::new()
    } else {
        sha1_base64(&repr)
    }
}
