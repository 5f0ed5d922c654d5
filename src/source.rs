// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Data source integration traits.
//!
//! Defines the interface the engine needs from whatever system actually
//! holds the data (a warehouse, a SaaS API, a database). The engine never
//! talks to those systems itself: connectivity, query execution,
//! authentication and retry all live behind [`DataSource`].
//!
//! # Example
//!
//! ```rust,no_run
//! use stream_replication::catalog::{CatalogEntry, Schema};
//! use stream_replication::bookmark::Bookmark;
//! use stream_replication::source::{BoxFuture, DataSource, LoadOptions, RecordStream};
//! use futures::{stream, StreamExt};
//!
//! struct MyWarehouse { /* client handle */ }
//!
//! impl DataSource for MyWarehouse {
//!     fn get_stream_ids(&self) -> BoxFuture<'_, Vec<String>> {
//!         Box::pin(async move { Ok(vec!["orders".to_string()]) })
//!     }
//!
//!     fn get_schema(&self, _stream_id: &str) -> BoxFuture<'_, Schema> {
//!         Box::pin(async move { Ok(Schema::default()) })
//!     }
//!
//!     fn load_data<'a>(
//!         &'a self,
//!         _stream: &'a CatalogEntry,
//!         _bookmark: Option<&'a Bookmark>,
//!         _options: LoadOptions,
//!     ) -> RecordStream<'a> {
//!         stream::empty().boxed()
//!     }
//! }
//! ```

use crate::bookmark::Bookmark;
use crate::catalog::{CatalogEntry, Schema, StreamHints};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

/// A single replicated record (a JSON object).
pub type Record = Map<String, Value>;

/// Result type for data source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = SourceResult<T>> + Send + 'a>>;

/// Finite, lazily produced sequence of records for one stream.
pub type RecordStream<'a> = BoxStream<'a, SourceResult<Record>>;

/// Simplified error for data source operations.
#[derive(Debug, Clone)]
pub struct SourceError(pub String);

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SourceError {}

/// Per-call options for [`DataSource::load_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// When set, return at most this many records (sample preview).
    pub limit: Option<usize>,
}

impl LoadOptions {
    /// Options for a full read.
    pub fn full() -> Self {
        Self { limit: None }
    }

    /// Options for a bounded sample preview.
    pub fn sample(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    pub fn is_sample(&self) -> bool {
        self.limit.is_some()
    }
}

/// Wrap already materialized records as a [`RecordStream`].
pub fn records_from_vec<'a>(records: Vec<Record>) -> RecordStream<'a> {
    futures::stream::iter(records.into_iter().map(Ok)).boxed()
}

/// Trait defining what we need from a data source.
///
/// Implementations own connectivity, querying and retry policy. This trait
/// lets tests substitute recording mocks and keeps the engine independent
/// of any vendor SDK.
pub trait DataSource: Send + Sync + 'static {
    /// Identifiers of every stream the source can serve, in catalog order.
    fn get_stream_ids(&self) -> BoxFuture<'_, Vec<String>>;

    /// JSON-Schema-like description of a stream's records.
    fn get_schema(&self, stream_id: &str) -> BoxFuture<'_, Schema>;

    /// Replication hints for discovery.
    ///
    /// Default: FULL_TABLE with no key or replication-key columns.
    fn stream_hints(&self, _stream_id: &str) -> BoxFuture<'_, StreamHints> {
        Box::pin(async { Ok(StreamHints::default()) })
    }

    /// Load the records of a stream.
    ///
    /// `bookmark` is the stream's high-water mark from previous runs (or
    /// the configured start date); incremental sources should only return
    /// records past it. The returned sequence must be finite.
    fn load_data<'a>(
        &'a self,
        stream: &'a CatalogEntry,
        bookmark: Option<&'a Bookmark>,
        options: LoadOptions,
    ) -> RecordStream<'a>;

    /// Count the records available for a stream.
    ///
    /// Default implementation drains a full `load_data` pass; sources with
    /// a cheaper count (e.g. `SELECT COUNT(*)`) should override it.
    fn count_records<'a>(&'a self, stream: &'a CatalogEntry) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            let mut records = self.load_data(stream, None, LoadOptions::full());
            let mut count = 0u64;
            while let Some(record) = records.next().await {
                record?;
                count += 1;
            }
            Ok(count)
        })
    }

    /// Verify the source is reachable with the configured credentials.
    ///
    /// Default implementation returns `Ok(())`.
    fn test_connection(&self) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// A no-op implementation for testing/standalone mode.
///
/// Serves no streams and logs the calls it receives.
#[derive(Clone, Debug, Default)]
pub struct NoOpSource;

impl DataSource for NoOpSource {
    fn get_stream_ids(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async {
            tracing::debug!("NoOp: no streams to discover");
            Ok(Vec::new())
        })
    }

    fn get_schema(&self, stream_id: &str) -> BoxFuture<'_, Schema> {
        let stream_id = stream_id.to_string();
        Box::pin(async move {
            tracing::trace!(stream_id = %stream_id, "NoOp: returning empty schema");
            Ok(Schema::default())
        })
    }

    fn load_data<'a>(
        &'a self,
        stream: &'a CatalogEntry,
        _bookmark: Option<&'a Bookmark>,
        options: LoadOptions,
    ) -> RecordStream<'a> {
        tracing::debug!(
            stream_id = %stream.tap_stream_id(),
            sample = options.is_sample(),
            "NoOp: would load data"
        );
        futures::stream::empty().boxed()
    }
}
