//! Mock DataSource for testing.
//!
//! Records every call for assertions. Streams, schemas, hints and records
//! are configured up front; failures can be injected per stream.

use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use stream_replication::bookmark::compare_bookmark_values;
use stream_replication::catalog::{CatalogEntry, Schema, StreamHints};
use stream_replication::source::{
    records_from_vec, BoxFuture, DataSource, LoadOptions, Record, RecordStream, SourceError,
};
use stream_replication::Bookmark;

/// A recorded load_data() call.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadCall {
    pub stream_id: String,
    pub bookmark: Option<Bookmark>,
    pub limit: Option<usize>,
}

#[derive(Clone, Default)]
struct MockStream {
    schema: Schema,
    hints: StreamHints,
    records: Vec<Record>,
    /// Yield an error after this many records
    fail_after: Option<usize>,
}

/// Mock implementation of DataSource that records all calls.
///
/// # Example
/// ```rust,ignore
/// let source = MockSource::new()
///     .with_stream("users", demo_users_schema())
///     .with_records("users", vec![record(json!({"id": 1}))]);
///
/// // Use in tests...
///
/// assert_eq!(source.load_calls().len(), 1);
/// ```
#[derive(Default)]
pub struct MockSource {
    order: Vec<String>,
    streams: HashMap<String, MockStream>,
    fail_connection: AtomicBool,
    get_stream_ids_calls: AtomicUsize,
    get_schema_calls: AtomicUsize,
    count_calls: AtomicUsize,
    connection_calls: AtomicUsize,
    loads: Mutex<Vec<LoadCall>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stream (FULL_TABLE, no records) in discovery order.
    pub fn with_stream(mut self, stream_id: &str, schema: Schema) -> Self {
        self.order.push(stream_id.to_string());
        self.streams.insert(
            stream_id.to_string(),
            MockStream {
                schema,
                ..Default::default()
            },
        );
        self
    }

    pub fn with_hints(mut self, stream_id: &str, hints: StreamHints) -> Self {
        self.stream_mut(stream_id).hints = hints;
        self
    }

    pub fn with_records(mut self, stream_id: &str, records: Vec<Record>) -> Self {
        self.stream_mut(stream_id).records = records;
        self
    }

    /// Make the stream's record sequence fail after `n` records.
    pub fn failing_after(mut self, stream_id: &str, n: usize) -> Self {
        self.stream_mut(stream_id).fail_after = Some(n);
        self
    }

    pub fn fail_connection(&self) {
        self.fail_connection.store(true, Ordering::SeqCst);
    }

    fn stream_mut(&mut self, stream_id: &str) -> &mut MockStream {
        if !self.streams.contains_key(stream_id) {
            self.order.push(stream_id.to_string());
        }
        self.streams.entry(stream_id.to_string()).or_default()
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    pub fn load_calls(&self) -> Vec<LoadCall> {
        self.loads.lock().unwrap().clone()
    }

    pub fn loaded_streams(&self) -> Vec<String> {
        self.load_calls().into_iter().map(|c| c.stream_id).collect()
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn connection_calls(&self) -> usize {
        self.connection_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn get_stream_ids_calls(&self) -> usize {
        self.get_stream_ids_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn get_schema_calls(&self) -> usize {
        self.get_schema_calls.load(Ordering::SeqCst)
    }
}

/// Records strictly past the bookmark's first property.
fn past_bookmark(records: &[Record], bookmark: Option<&Bookmark>) -> Vec<Record> {
    let Some((property, value)) = bookmark.and_then(|b| b.iter().next()) else {
        return records.to_vec();
    };
    records
        .iter()
        .filter(|record| {
            record.get(property).map_or(true, |v| {
                compare_bookmark_values(v, value) == std::cmp::Ordering::Greater
            })
        })
        .cloned()
        .collect()
}

impl DataSource for MockSource {
    fn get_stream_ids(&self) -> BoxFuture<'_, Vec<String>> {
        self.get_stream_ids_calls.fetch_add(1, Ordering::SeqCst);
        let ids = self.order.clone();
        Box::pin(async move { Ok(ids) })
    }

    fn get_schema(&self, stream_id: &str) -> BoxFuture<'_, Schema> {
        self.get_schema_calls.fetch_add(1, Ordering::SeqCst);
        let schema = self.streams.get(stream_id).map(|s| s.schema.clone());
        let stream_id = stream_id.to_string();
        Box::pin(async move {
            schema.ok_or_else(|| SourceError(format!("unknown stream {}", stream_id)))
        })
    }

    fn stream_hints(&self, stream_id: &str) -> BoxFuture<'_, StreamHints> {
        let hints = self
            .streams
            .get(stream_id)
            .map(|s| s.hints.clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(hints) })
    }

    fn load_data<'a>(
        &'a self,
        stream: &'a CatalogEntry,
        bookmark: Option<&'a Bookmark>,
        options: LoadOptions,
    ) -> RecordStream<'a> {
        self.loads.lock().unwrap().push(LoadCall {
            stream_id: stream.tap_stream_id().to_string(),
            bookmark: bookmark.cloned(),
            limit: options.limit,
        });

        let Some(mock) = self.streams.get(stream.tap_stream_id()) else {
            return records_from_vec(Vec::new());
        };

        let mut records = past_bookmark(&mock.records, bookmark);
        if let Some(limit) = options.limit {
            records.truncate(limit);
        }

        match mock.fail_after {
            Some(n) => {
                let mut items: Vec<Result<Record, SourceError>> =
                    records.into_iter().take(n).map(Ok).collect();
                items.push(Err(SourceError(format!(
                    "{}: connection lost",
                    stream.tap_stream_id()
                ))));
                futures::stream::iter(items).boxed()
            }
            None => records_from_vec(records),
        }
    }

    fn count_records<'a>(&'a self, stream: &'a CatalogEntry) -> BoxFuture<'a, u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let count = self
            .streams
            .get(stream.tap_stream_id())
            .map(|s| s.records.len() as u64)
            .unwrap_or(0);
        Box::pin(async move { Ok(count) })
    }

    fn test_connection(&self) -> BoxFuture<'_, ()> {
        self.connection_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_connection.load(Ordering::SeqCst);
        Box::pin(async move {
            if fail {
                Err(SourceError("authentication failed".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Build a record from a JSON object literal.
pub fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

/// The five-property `demo_users` schema.
pub fn demo_users_schema() -> Schema {
    Schema::object([
        ("id", json!({"type": "integer"})),
        ("name", json!({"type": ["null", "string"]})),
        ("email", json!({"type": ["null", "string"]})),
        ("created_at", json!({"type": "string", "format": "date-time"})),
        ("updated_at", json!({"type": "string", "format": "date-time"})),
    ])
}

/// `demo_users` records with ids `1..=n`, updated_at increasing with id.
pub fn demo_users(n: i64) -> Vec<Record> {
    (1..=n)
        .map(|i| {
            record(json!({
                "id": i,
                "name": format!("user {}", i),
                "email": format!("user{}@example.com", i),
                "created_at": "2023-01-01T00:00:00Z",
                "updated_at": format!("2024-01-{:02}T00:00:00Z", i),
            }))
        })
        .collect()
}
