//! Cache key encoding.
//!
//! Keys have the shape
//! `cache_find_by/<storage id>/<field1>/<value1>/.../<fieldN>/<valueN>` with
//! fields sorted ascending and every segment percent-encoded.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::descriptor::ScalarValue;

/// Leading segment of every key produced by this crate.
pub const KEY_NAMESPACE: &str = "cache_find_by";

const SEPARATOR: &str = "/";

/// Everything except `[A-Za-z0-9._~-]` is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Canonical key for one cacheable lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build the key for `storage_id` and an unordered list of field/value pairs.
///
/// ```
/// use finder_cache::cache::{ScalarValue, cache_key_for};
///
/// let key = cache_key_for("users", &[("email", ScalarValue::from("a@example.com"))]);
/// assert_eq!(key.as_str(), "cache_find_by/users/email/a%40example.com");
/// ```
pub fn cache_key_for<F: AsRef<str>>(storage_id: &str, pairs: &[(F, ScalarValue)]) -> CacheKey {
    let mut stringified: Vec<(&str, String)> = pairs
        .iter()
        .map(|(field, value)| (field.as_ref(), value.to_string()))
        .collect();
    stringified.sort();

    let mut segments = Vec::with_capacity(2 + stringified.len() * 2);
    segments.push(encode_segment(KEY_NAMESPACE));
    segments.push(encode_segment(storage_id));
    for (field, value) in &stringified {
        segments.push(encode_segment(field));
        segments.push(encode_segment(value));
    }

    CacheKey(segments.join(SEPARATOR))
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}
