// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bookmarks: per-stream high-water marks.
//!
//! A [`Bookmark`] maps each bookmark property of a stream to the largest
//! value seen for it so far. [`BookmarkState`] holds one bookmark per stream
//! and serializes as the `STATE` message value:
//!
//! ```text
//! {"bookmarks": {"demo_users": {"updated_at": "2024-01-02T00:00:00Z"}}}
//! ```
//!
//! # Ordering
//!
//! Bookmark values are arbitrary JSON, ordered by [`compare_bookmark_values`]:
//!
//! ```text
//! null < bool < number < string < array < object
//! ```
//!
//! Numbers compare numerically, strings lexicographically (so RFC 3339
//! timestamps in the same offset order chronologically). Bookmarks only
//! move forward: [`BookmarkState::advance`] keeps the per-property maximum
//! of the stored and the new value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Bookmark property → maximum value seen.
pub type Bookmark = BTreeMap<String, Value>;

/// Compare two bookmark values. Total order; never panics.
pub fn compare_bookmark_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            // Exact integer paths first; f64 loses precision past 2^53
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x.cmp(&y);
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x.cmp(&y);
            }
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xa, ya) in x.iter().zip(y.iter()) {
                match compare_bookmark_values(xa, ya) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        // Objects have no meaningful order; compare their encodings
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// The larger of two bookmark values (`b` wins ties).
pub fn max_bookmark_value<'a>(a: &'a Value, b: &'a Value) -> &'a Value {
    match compare_bookmark_values(a, b) {
        Ordering::Greater => a,
        _ => b,
    }
}

/// Pair bookmark properties with their values.
///
/// Extra values (or properties) are ignored; callers pass aligned slices.
pub fn bookmark_from_values(properties: &[String], values: &[Value]) -> Bookmark {
    properties
        .iter()
        .cloned()
        .zip(values.iter().cloned())
        .collect()
}

/// In-memory bookmark map for a run, owned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkState {
    #[serde(default)]
    bookmarks: BTreeMap<String, Bookmark>,
}

impl BookmarkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream_id: &str) -> Option<&Bookmark> {
        self.bookmarks.get(stream_id)
    }

    /// Replace a stream's bookmark unconditionally (e.g. when seeding from disk).
    pub fn insert(&mut self, stream_id: impl Into<String>, bookmark: Bookmark) {
        self.bookmarks.insert(stream_id.into(), bookmark);
    }

    /// Merge `bookmark` into the stream's bookmark, keeping per-property maxima.
    ///
    /// Returns the merged bookmark.
    pub fn advance(&mut self, stream_id: &str, bookmark: Bookmark) -> &Bookmark {
        let current = self.bookmarks.entry(stream_id.to_string()).or_default();
        for (property, value) in bookmark {
            let newer = current
                .get(&property)
                .map_or(true, |existing| {
                    compare_bookmark_values(existing, &value) == Ordering::Less
                });
            if newer {
                current.insert(property, value);
            }
        }
        current
    }

    pub fn remove(&mut self, stream_id: &str) -> Option<Bookmark> {
        self.bookmarks.remove(stream_id)
    }

    pub fn stream_ids(&self) -> impl Iterator<Item = &str> {
        self.bookmarks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    /// JSON form used as the `STATE` message value.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "bookmarks": self.bookmarks })
    }
}
