// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration Tests for the Replication Engine
//!
//! End-to-end `process()` runs over the recording [`MockSource`] and an
//! in-memory sink. Bookmark persistence tests use SQLite files in a
//! temporary directory; nothing external is required.
//!
//! # Test Organization
//! - `discover_*` - catalog construction and discovery output
//! - `sync_*` - message sequence, bookmarks, failure handling
//! - `count_*` / `sample_*` - auxiliary run modes
//! - `bookmark_*` - persistence across engine restarts

mod common;

use common::{demo_users, demo_users_schema, record, MockSource};
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use stream_replication::{
    Bookmark, BookmarkState, BookmarkStore, BookmarkStoreConfig, Catalog, EngineConfig,
    EngineState, MemorySink, MessageSink, OutputConfig, ReplicationEngine, ReplicationError,
    ReplicationMethod, RunFlags, RunReport, StreamHints,
};

type TestEngine = ReplicationEngine<MockSource, MemorySink>;

fn engine_with(config: EngineConfig, source: MockSource) -> (TestEngine, MemorySink) {
    let sink = MemorySink::new();
    let engine = ReplicationEngine::with_source(config, Arc::new(source), sink.clone());
    (engine, sink)
}

fn incremental_hints(key: &str) -> StreamHints {
    StreamHints {
        replication_method: ReplicationMethod::Incremental,
        key_properties: vec!["id".to_string()],
        valid_replication_keys: vec![key.to_string()],
    }
}

/// Discover against `source` and select the given streams.
async fn discovered_catalog(source: MockSource, select: &[&str]) -> Catalog {
    let (engine, _sink) = engine_with(EngineConfig::for_testing(), source);
    let mut catalog = engine.discover().await.unwrap();
    for id in select {
        catalog.get_stream_mut(id).unwrap().set_selected(true);
    }
    catalog
}

fn users_source() -> MockSource {
    MockSource::new()
        .with_stream("demo_users", demo_users_schema())
        .with_hints("demo_users", incremental_hints("updated_at"))
        .with_records("demo_users", demo_users(3))
}

fn message_types(sink: &MemorySink) -> Vec<String> {
    sink.messages()
        .iter()
        .map(|m| m["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn discover_builds_demo_users_entry() {
    let source = MockSource::new().with_stream("demo_users", demo_users_schema());
    let (engine, _sink) = engine_with(EngineConfig::for_testing(), source);

    let entry = engine
        .build_catalog_entry("demo_users", demo_users_schema())
        .await
        .unwrap();

    assert_eq!(entry.metadata.len(), 6);
    let root = entry.root_metadata().unwrap();
    assert_eq!(root["selected"], json!(false));
    assert_eq!(root["inclusion"], json!("available"));
    assert_eq!(root["schema-name"], json!("demo_users"));
    assert_eq!(root["forced-replication-method"], json!("FULL_TABLE"));

    let names: Vec<&str> = entry.metadata[1..]
        .iter()
        .map(|md| {
            assert_eq!(Value::Object(md.metadata.clone()), json!({"inclusion": "available"}));
            md.breadcrumb.segments()[1].as_str()
        })
        .collect();
    assert_eq!(names, vec!["id", "name", "email", "created_at", "updated_at"]);
}

#[tokio::test]
async fn discover_twice_gives_identical_catalogs() {
    let source = users_source().with_stream("demo_table", demo_users_schema());
    let (engine, _sink) = engine_with(EngineConfig::for_testing(), source);

    let first = engine.discover().await.unwrap();
    let second = engine.discover().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn discover_without_catalog_writes_catalog_to_sink() {
    let (mut engine, sink) = engine_with(EngineConfig::for_testing(), users_source());

    let report = engine.process().await.unwrap();
    let catalog = match report {
        RunReport::Discovered(catalog) => catalog,
        other => panic!("Expected Discovered, got {:?}", other),
    };

    let written = sink.messages();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0], catalog.to_value());
    assert_eq!(Catalog::from_value(written[0].clone()).unwrap(), catalog);
    assert_eq!(engine.state(), EngineState::Done);
}

#[tokio::test]
async fn discover_streams_writes_ids_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("streams.json");
    let config = EngineConfig {
        flags: RunFlags {
            discover_mode: true,
            discover_streams_mode: true,
            ..Default::default()
        },
        output: OutputConfig {
            path: Some(output.to_string_lossy().to_string()),
        },
        ..EngineConfig::for_testing()
    };
    let source = users_source().with_stream("demo_table", demo_users_schema());
    let (mut engine, sink) = engine_with(config, source);

    let report = engine.process().await.unwrap();
    assert_eq!(
        report,
        RunReport::StreamIds(vec!["demo_users".to_string(), "demo_table".to_string()])
    );

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written, json!(["demo_users", "demo_table"]));
    assert_eq!(sink.write_count(), 0);
}

#[tokio::test]
async fn discover_mode_ignores_supplied_catalog() {
    let catalog = discovered_catalog(users_source(), &["demo_users"]).await;
    let config = EngineConfig::for_testing().with_flags(RunFlags {
        discover_mode: true,
        ..Default::default()
    });
    let (engine, _sink) = engine_with(config, users_source());
    let mut engine = engine.with_catalog(catalog);

    assert!(matches!(
        engine.process().await.unwrap(),
        RunReport::Discovered(_)
    ));
    assert!(engine.source().load_calls().is_empty());
}

// =============================================================================
// Sync
// =============================================================================

#[tokio::test]
async fn sync_emits_schema_records_state_per_stream() {
    let source = || {
        users_source()
            .with_stream("demo_table", demo_users_schema())
            .with_records("demo_table", demo_users(2))
    };
    let catalog = discovered_catalog(source(), &["demo_users", "demo_table"]).await;
    let (engine, sink) = engine_with(EngineConfig::for_testing(), source());
    let mut engine = engine.with_catalog(catalog);

    let summary = match engine.process().await.unwrap() {
        RunReport::Synced(summary) => summary,
        other => panic!("Expected Synced, got {:?}", other),
    };

    assert_eq!(
        message_types(&sink),
        vec![
            "SCHEMA", "RECORD", "RECORD", "RECORD", "STATE", "SCHEMA", "RECORD", "RECORD",
            "STATE"
        ]
    );
    assert_eq!(sink.flush_count(), sink.write_count());
    assert_eq!(summary.total_records(), 5);
    assert_eq!(engine.source().loaded_streams(), vec!["demo_users", "demo_table"]);

    let state = &sink.messages_of_type("STATE")[0];
    assert_eq!(
        state["value"]["bookmarks"]["demo_users"]["updated_at"],
        json!("2024-01-03T00:00:00Z")
    );
    assert_eq!(
        engine.bookmarks().get("demo_users").unwrap()["updated_at"],
        json!("2024-01-03T00:00:00Z")
    );
    // FULL_TABLE streams carry no bookmark
    assert!(engine.bookmarks().get("demo_table").is_none());
}

#[tokio::test]
async fn sync_skips_unselected_streams() {
    let source = || users_source().with_stream("demo_table", demo_users_schema());
    let catalog = discovered_catalog(source(), &["demo_table"]).await;
    let (engine, sink) = engine_with(EngineConfig::for_testing(), source());
    let mut engine = engine.with_catalog(catalog);

    engine.process().await.unwrap();

    assert_eq!(engine.source().loaded_streams(), vec!["demo_table"]);
    let schemas = sink.messages_of_type("SCHEMA");
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0]["tap_stream_id"], "demo_table");
}

#[tokio::test]
async fn sync_stops_at_unsupported_replication_method() {
    let catalog = Catalog::from_value(json!({
        "streams": [
            {
                "tap_stream_id": "first",
                "replication_method": "FULL_TABLE",
                "metadata": [{"breadcrumb": [], "metadata": {"selected": true}}]
            },
            {
                "tap_stream_id": "demo_table",
                "replication_method": "INVALID_METHOD",
                "metadata": [{"breadcrumb": [], "metadata": {"selected": true}}]
            },
            {
                "tap_stream_id": "last",
                "replication_method": "FULL_TABLE",
                "metadata": [{"breadcrumb": [], "metadata": {"selected": true}}]
            }
        ]
    }))
    .unwrap();
    let source = MockSource::new()
        .with_records("first", vec![record(json!({"id": 1}))])
        .with_records("demo_table", vec![record(json!({"id": 1}))])
        .with_records("last", vec![record(json!({"id": 1}))]);
    let (engine, sink) = engine_with(EngineConfig::for_testing(), source);
    let mut engine = engine.with_catalog(catalog);

    match engine.process().await {
        Err(ReplicationError::UnsupportedReplicationMethod { stream, method }) => {
            assert_eq!(stream, "demo_table");
            assert_eq!(method, "INVALID_METHOD");
        }
        other => panic!("Expected UnsupportedReplicationMethod, got {:?}", other),
    }

    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(engine.source().loaded_streams(), vec!["first"]);
    assert_eq!(message_types(&sink), vec!["SCHEMA", "RECORD", "STATE"]);
    assert!(sink
        .messages()
        .iter()
        .all(|m| m["stream"] != "demo_table" && m["stream"] != "last"));
}

/// Passes lines through to a [`MemorySink`] but refuses STATE messages.
#[derive(Clone, Default)]
struct StateRejectingSink {
    inner: MemorySink,
}

impl MessageSink for StateRejectingSink {
    fn write(&mut self, line: &str) -> io::Result<()> {
        if line.contains(r#""type":"STATE""#) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        self.inner.write(line)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[tokio::test]
async fn sync_state_write_failure_leaves_bookmark_at_prior_value() {
    let dir = tempfile::tempdir().unwrap();
    let store_config = BookmarkStoreConfig {
        sqlite_path: dir.path().join("bookmarks.db").to_string_lossy().to_string(),
        wal_mode: true,
    };
    let config = EngineConfig {
        bookmarks: Some(store_config.clone()),
        ..Default::default()
    };
    let catalog = discovered_catalog(users_source(), &["demo_users"]).await;
    let prior = Bookmark::from([("updated_at".to_string(), json!("2024-01-03T00:00:00Z"))]);

    {
        let (engine, _sink) = engine_with(config.clone(), users_source());
        let mut engine = engine.with_catalog(catalog.clone());
        engine.process().await.unwrap();
        assert_eq!(engine.bookmarks().get("demo_users"), Some(&prior));
        engine.close().await;
    }

    let source = MockSource::new()
        .with_stream("demo_users", demo_users_schema())
        .with_hints("demo_users", incremental_hints("updated_at"))
        .with_records("demo_users", demo_users(5));
    let sink = StateRejectingSink::default();
    let mut engine = ReplicationEngine::with_source(config, Arc::new(source), sink.clone())
        .with_catalog(catalog);

    let err = engine.process().await.unwrap_err();
    assert!(matches!(err, ReplicationError::Sink(_)));
    assert_eq!(engine.state(), EngineState::Failed);

    // The new records went out, the bookmark did not move
    assert_eq!(sink.inner.messages_of_type("RECORD").len(), 2);
    assert_eq!(engine.bookmarks().get("demo_users"), Some(&prior));
    engine.close().await;

    let store = BookmarkStore::open(&store_config).await.unwrap();
    assert_eq!(store.get("demo_users").await, Some(prior));
    store.close().await;
}

#[tokio::test]
async fn sync_failure_keeps_completed_bookmarks_and_leaves_failed_stream() {
    let dir = tempfile::tempdir().unwrap();
    let store_config = BookmarkStoreConfig {
        sqlite_path: dir.path().join("bookmarks.db").to_string_lossy().to_string(),
        wal_mode: true,
    };
    let config = EngineConfig {
        bookmarks: Some(store_config.clone()),
        ..Default::default()
    };

    let source = || {
        MockSource::new()
            .with_stream("users", demo_users_schema())
            .with_hints("users", incremental_hints("id"))
            .with_records("users", demo_users(3))
            .with_stream("orders", demo_users_schema())
            .with_hints("orders", incremental_hints("id"))
            .with_records("orders", demo_users(5))
    };
    let catalog = discovered_catalog(source(), &["users", "orders"]).await;

    let mut prior = BookmarkState::new();
    prior.insert("orders", Bookmark::from([("id".to_string(), json!(1))]));
    let (engine, sink) = engine_with(config.clone(), source().failing_after("orders", 2));
    let mut engine = engine.with_catalog(catalog).with_state(prior);

    let err = engine.process().await.unwrap_err();
    assert!(matches!(err, ReplicationError::Source(_)));
    assert!(err.is_retryable());

    // Two orders records made it out before the failure, but no STATE for them
    assert_eq!(sink.messages_of_type("RECORD").len(), 5);
    assert_eq!(sink.messages_of_type("STATE").len(), 1);
    assert_eq!(engine.bookmarks().get("users").unwrap()["id"], json!(3));
    assert_eq!(engine.bookmarks().get("orders").unwrap()["id"], json!(1));
    engine.close().await;

    let store = BookmarkStore::open(&store_config).await.unwrap();
    assert_eq!(store.get("users").await.unwrap()["id"], json!(3));
    assert!(store.get("orders").await.is_none());
    store.close().await;
}

#[tokio::test]
async fn sync_unsorted_source_uses_maximum_bookmark() {
    let records = vec![
        record(json!({"id": 1, "updated_at": "2024-01-05T00:00:00Z"})),
        record(json!({"id": 2, "updated_at": "2024-01-09T00:00:00Z"})),
        record(json!({"id": 3, "updated_at": "2024-01-02T00:00:00Z"})),
    ];
    let source = || {
        MockSource::new()
            .with_stream("events", demo_users_schema())
            .with_hints("events", incremental_hints("updated_at"))
            .with_records("events", records.clone())
    };
    let catalog = discovered_catalog(source(), &["events"]).await;

    let mut config = EngineConfig::for_testing();
    config.settings.is_sorted = false;
    let (engine, _sink) = engine_with(config, source());
    let mut engine = engine.with_catalog(catalog.clone());
    engine.process().await.unwrap();
    assert_eq!(
        engine.bookmarks().get("events").unwrap()["updated_at"],
        json!("2024-01-09T00:00:00Z")
    );

    // Sorted mode trusts the last record
    let (engine, _sink) = engine_with(EngineConfig::for_testing(), source());
    let mut engine = engine.with_catalog(catalog);
    engine.process().await.unwrap();
    assert_eq!(
        engine.bookmarks().get("events").unwrap()["updated_at"],
        json!("2024-01-02T00:00:00Z")
    );
}

#[tokio::test]
async fn sync_respects_selected_streams_setting() {
    let source = || users_source().with_stream("demo_table", demo_users_schema());
    let catalog = discovered_catalog(source(), &["demo_users", "demo_table"]).await;
    let mut config = EngineConfig::for_testing();
    config.settings.selected_streams = Some(vec!["demo_table".to_string()]);
    let (engine, _sink) = engine_with(config, source());
    let mut engine = engine.with_catalog(catalog);

    engine.process().await.unwrap();
    assert_eq!(engine.source().loaded_streams(), vec!["demo_table"]);
}

#[tokio::test]
async fn sync_bookmark_override_replaces_catalog_properties() {
    let catalog = discovered_catalog(users_source(), &["demo_users"]).await;
    let mut config = EngineConfig::for_testing();
    config
        .settings
        .bookmark_overrides
        .insert("demo_users".to_string(), vec!["id".to_string()]);
    let (engine, sink) = engine_with(config, users_source());
    let mut engine = engine.with_catalog(catalog);

    engine.process().await.unwrap();

    assert_eq!(sink.messages_of_type("SCHEMA")[0]["bookmark_properties"], json!(["id"]));
    let bookmark = engine.bookmarks().get("demo_users").unwrap();
    assert_eq!(bookmark, &Bookmark::from([("id".to_string(), json!(3))]));
}

#[tokio::test]
async fn sync_seeds_first_run_from_start_date() {
    let catalog = discovered_catalog(users_source(), &["demo_users"]).await;
    let mut config = EngineConfig::for_testing();
    config.settings.start_date = Some("2024-01-02T00:00:00Z".to_string());
    let (engine, sink) = engine_with(config, users_source());
    let mut engine = engine.with_catalog(catalog);

    engine.process().await.unwrap();

    let calls = engine.source().load_calls();
    assert_eq!(
        calls[0].bookmark,
        Some(Bookmark::from([(
            "updated_at".to_string(),
            json!("2024-01-02T00:00:00Z")
        )]))
    );
    assert_eq!(sink.messages_of_type("RECORD").len(), 1);
}

// =============================================================================
// Count / sample / connection
// =============================================================================

#[tokio::test]
async fn count_calls_source_once_per_selected_stream() {
    let source = || {
        users_source()
            .with_stream("demo_table", demo_users_schema())
            .with_records("demo_table", demo_users(7))
            .with_stream("ignored", demo_users_schema())
    };
    let catalog = discovered_catalog(source(), &["demo_users", "demo_table"]).await;
    let config = EngineConfig::for_testing().with_flags(RunFlags {
        count_records: true,
        ..Default::default()
    });
    let (engine, sink) = engine_with(config, source());
    let mut engine = engine.with_catalog(catalog);

    let report = engine.process().await.unwrap();

    assert_eq!(
        report,
        RunReport::RecordCounts(vec![
            ("demo_users".to_string(), 3),
            ("demo_table".to_string(), 7)
        ])
    );
    assert_eq!(engine.source().count_calls(), 2);
    assert!(engine.source().load_calls().is_empty());
    assert_eq!(sink.lines(), vec![r#"{"demo_users":3,"demo_table":7}"#.to_string()]);
}

#[tokio::test]
async fn sample_returns_bounded_records_without_emitting() {
    let source = || {
        MockSource::new()
            .with_stream("big", demo_users_schema())
            .with_records("big", demo_users(25))
    };
    let catalog = discovered_catalog(source(), &["big"]).await;
    let mut config = EngineConfig::for_testing().with_flags(RunFlags {
        load_sample_data: true,
        count_records: true,
        ..Default::default()
    });
    config.settings.sample_limit = 10;
    let (engine, sink) = engine_with(config, source());
    let mut engine = engine.with_catalog(catalog);

    let samples = match engine.process().await.unwrap() {
        RunReport::SampleData(samples) => samples,
        other => panic!("Expected SampleData, got {:?}", other),
    };

    assert_eq!(samples[0].records.len(), 10);
    assert_eq!(engine.source().load_calls()[0].limit, Some(10));
    assert_eq!(engine.source().count_calls(), 0);
    assert_eq!(sink.write_count(), 0);
    assert!(engine.bookmarks().is_empty());
}

#[tokio::test]
async fn test_connection_takes_precedence() {
    let catalog = discovered_catalog(users_source(), &["demo_users"]).await;
    let config = EngineConfig::for_testing().with_flags(RunFlags {
        test_connection: true,
        discover_mode: true,
        count_records: true,
        ..Default::default()
    });
    let (engine, sink) = engine_with(config, users_source());
    let mut engine = engine.with_catalog(catalog);

    assert_eq!(engine.process().await.unwrap(), RunReport::ConnectionOk);
    assert_eq!(engine.source().connection_calls(), 1);
    assert_eq!(engine.source().count_calls(), 0);
    assert_eq!(sink.write_count(), 0);

    engine.source().fail_connection();
    let err = engine.process().await.unwrap_err();
    assert!(err.to_string().contains("authentication failed"));
    assert_eq!(engine.state(), EngineState::Failed);
}

// =============================================================================
// Bookmark persistence
// =============================================================================

#[tokio::test]
async fn bookmark_second_run_resumes_from_persisted_bookmark() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        bookmarks: Some(BookmarkStoreConfig {
            sqlite_path: dir.path().join("bookmarks.db").to_string_lossy().to_string(),
            wal_mode: true,
        }),
        ..Default::default()
    };
    let catalog = discovered_catalog(users_source(), &["demo_users"]).await;

    {
        let (engine, sink) = engine_with(config.clone(), users_source());
        let mut engine = engine.with_catalog(catalog.clone());
        engine.process().await.unwrap();
        assert_eq!(sink.messages_of_type("RECORD").len(), 3);
        engine.close().await;
    }

    // Two new users arrive between runs
    let source = MockSource::new()
        .with_stream("demo_users", demo_users_schema())
        .with_hints("demo_users", incremental_hints("updated_at"))
        .with_records("demo_users", demo_users(5));
    let (engine, sink) = engine_with(config, source);
    let mut engine = engine.with_catalog(catalog);
    engine.process().await.unwrap();

    let ids: Vec<i64> = sink
        .messages_of_type("RECORD")
        .iter()
        .map(|m| m["record"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![4, 5]);
    assert_eq!(
        engine.source().load_calls()[0].bookmark,
        Some(Bookmark::from([(
            "updated_at".to_string(),
            json!("2024-01-03T00:00:00Z")
        )]))
    );
    engine.close().await;
}

#[tokio::test]
async fn bookmark_explicit_state_wins_over_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        bookmarks: Some(BookmarkStoreConfig {
            sqlite_path: dir.path().join("bookmarks.db").to_string_lossy().to_string(),
            wal_mode: true,
        }),
        ..Default::default()
    };
    let catalog = discovered_catalog(users_source(), &["demo_users"]).await;

    {
        let (engine, _sink) = engine_with(config.clone(), users_source());
        let mut engine = engine.with_catalog(catalog.clone());
        engine.process().await.unwrap();
        engine.close().await;
    }

    // Caller rewinds to the first user
    let mut state = BookmarkState::new();
    state.insert(
        "demo_users",
        Bookmark::from([("updated_at".to_string(), json!("2024-01-01T00:00:00Z"))]),
    );
    let (engine, sink) = engine_with(config, users_source());
    let mut engine = engine.with_catalog(catalog).with_state(state);
    engine.process().await.unwrap();

    assert_eq!(sink.messages_of_type("RECORD").len(), 2);
    engine.close().await;
}
