//! Fuzz target for catalog parsing.
//!
//! Arbitrary bytes must either parse into a catalog or fail with an error,
//! never panic. Whatever parses must survive a serialize/parse cycle.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stream_replication::Catalog;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Should never panic
    let Ok(catalog) = Catalog::from_json(text) else {
        return;
    };

    let reparsed = Catalog::from_value(catalog.to_value()).expect("catalog re-parses");
    assert_eq!(reparsed.stream_ids(), catalog.stream_ids());

    // Selection is a subset of the catalog, in catalog order
    let ids = catalog.stream_ids();
    let mut cursor = 0;
    for entry in catalog.get_selected_streams() {
        let pos = ids[cursor..]
            .iter()
            .position(|id| id == entry.tap_stream_id())
            .expect("selected stream is in catalog order");
        cursor += pos + 1;
    }
});
