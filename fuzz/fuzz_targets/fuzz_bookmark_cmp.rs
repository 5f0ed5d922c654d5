//! Fuzz target for bookmark value ordering.
//!
//! Parses two JSON values and checks the comparison never panics and
//! stays antisymmetric, and that advancing a bookmark never regresses.

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use std::cmp::Ordering;
use stream_replication::bookmark::compare_bookmark_values;
use stream_replication::{Bookmark, BookmarkState};

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;
    let (Ok(a), Ok(b)) = (serde_json::from_str::<Value>(a), serde_json::from_str::<Value>(b)) else {
        return;
    };

    // Should never panic
    let ab = compare_bookmark_values(&a, &b);
    let ba = compare_bookmark_values(&b, &a);
    assert_eq!(ab, ba.reverse());
    assert_eq!(compare_bookmark_values(&a, &a), Ordering::Equal);

    let mut state = BookmarkState::new();
    state.advance("s", Bookmark::from([("k".to_string(), a.clone())]));
    let merged = state.advance("s", Bookmark::from([("k".to_string(), b.clone())]));
    let kept = &merged["k"];
    assert_ne!(compare_bookmark_values(kept, &a), Ordering::Less);
    assert_ne!(compare_bookmark_values(kept, &b), Ordering::Less);
});
