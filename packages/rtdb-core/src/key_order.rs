//! Total order over child keys.
//!
//! Two sentinel names bound every real key. Keys that parse as signed 32-bit
//! integers sort before all other keys, numerically first and by literal length
//! second (so `"01"` sorts after `"1"`). Everything else compares by UTF-16 code
//! units.

use std::cmp::Ordering;

pub const MIN_NAME: &str = "[MIN_NAME]";
pub const MAX_NAME: &str = "[MAX_NAME]";
pub const PRIORITY_KEY: &str = ".priority";
pub const VALUE_KEY: &str = ".value";

const MAX_INT_KEY_LEN: usize = 11;

/// Parse a key as a signed 32-bit integer the way child ordering does.
///
/// Leading zeros are accepted here; `"-"` and the empty string are not.
pub fn parse_int_key(key: &str) -> Option<i32> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_INT_KEY_LEN {
        return None;
    }
    let (negative, digits) = match bytes[0] {
        b'-' => (true, &bytes[1..]),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + i64::from(b - b'0');
    }
    if negative {
        value = -value;
    }
    i32::try_from(value).ok()
}

/// Parse a key as an array index: a non-negative integer without leading zeros.
pub fn parse_array_index(key: &str) -> Option<usize> {
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    match parse_int_key(key) {
        Some(i) if i >= 0 && !key.starts_with('-') => Some(i as usize),
        _ => None,
    }
}

pub fn compare_keys(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if a == MIN_NAME || b == MAX_NAME {
        return Ordering::Less;
    }
    if b == MIN_NAME || a == MAX_NAME {
        return Ordering::Greater;
    }
    match (parse_int_key(a), parse_int_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.len().cmp(&b.len())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.encode_utf16().cmp(b.encode_utf16()),
    }
}
