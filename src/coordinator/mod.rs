// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine coordinator.
//!
//! The main orchestrator that ties together:
//! - The data source via [`crate::source::DataSource`]
//! - Catalog selection and per-stream metadata via [`crate::resolver`]
//! - Record emission via [`crate::writer::RecordWriter`]
//! - Bookmark persistence via [`crate::store::BookmarkStore`]
//!
//! # Architecture
//!
//! A single [`ReplicationEngine::process()`] call picks one [`RunMode`] and
//! runs it to completion:
//! 1. Connection test, discovery, sample preview or record count, or
//! 2. A sync: for each selected stream in catalog order, emit SCHEMA, the
//!    stream's RECORDs and a STATE message, then advance its bookmark
//!
//! Streams are processed strictly one at a time. The engine never retries a
//! collaborator call; the first error aborts the run.

mod discovery;
mod sync;
mod types;

pub use types::{EngineState, RunReport, StreamSample, StreamSummary, SyncSummary};

use crate::bookmark::BookmarkState;
use crate::catalog::Catalog;
use crate::config::{EngineConfig, RunMode};
use crate::error::{ReplicationError, Result};
use crate::message::Message;
use crate::metrics;
use crate::resolver::StreamMetadataResolver;
use crate::sink::{MessageSink, StdoutSink};
use crate::source::{DataSource, LoadOptions, NoOpSource};
use crate::store::BookmarkStore;
use futures::{StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// The main replication engine.
///
/// # Data Source Integration
///
/// The engine is handed a data source by its caller. It only ever asks the
/// source for stream ids, schemas and records; connectivity, query
/// execution and retry policy stay in the source.
///
/// Messages go to a single sink (stdout in production). The engine is the
/// sink's only writer.
pub struct ReplicationEngine<S: DataSource = NoOpSource, K: MessageSink = StdoutSink> {
    config: EngineConfig,

    /// Engine state (broadcast to watchers)
    state_tx: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,

    source: Arc<S>,
    sink: K,

    /// Catalog from a previous discovery run, if the caller has one
    catalog: Option<Catalog>,

    resolver: StreamMetadataResolver,

    /// Bookmarks for this run
    bookmarks: BookmarkState,

    /// Caller supplied `bookmarks`; the store must not override them
    explicit_state: bool,

    /// Opened lazily on the first sync
    store: Option<BookmarkStore>,
}

impl ReplicationEngine<NoOpSource, StdoutSink> {
    /// Create an engine with the no-op source (for testing/standalone).
    ///
    /// The engine starts in `Idle` state.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_source(config, Arc::new(NoOpSource), StdoutSink)
    }
}

impl<S: DataSource, K: MessageSink> ReplicationEngine<S, K> {
    /// Create an engine over a data source and a sink.
    ///
    /// This is the primary constructor.
    pub fn with_source(config: EngineConfig, source: Arc<S>, sink: K) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);
        let resolver = StreamMetadataResolver::new(&config.settings);

        Self {
            config,
            state_tx,
            state_rx,
            source,
            sink,
            catalog: None,
            resolver,
            bookmarks: BookmarkState::new(),
            explicit_state: false,
            store: None,
        }
    }

    /// Use a catalog produced by an earlier discovery run.
    ///
    /// Without one, `process()` runs discovery.
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Start from an explicit bookmark state instead of the persisted one.
    pub fn with_state(mut self, state: BookmarkState) -> Self {
        self.bookmarks = state;
        self.explicit_state = true;
        self
    }

    /// Get a reference to the data source.
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    /// Bookmarks as of the last completed stream.
    pub fn bookmarks(&self) -> &BookmarkState {
        &self.bookmarks
    }

    /// Get current engine state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state_tx.send(state);
        metrics::set_engine_state(&state.to_string());
    }

    /// Run whichever mode the configured flags select.
    ///
    /// The mode is chosen once, on entry (see [`RunMode::select`]).
    pub async fn process(&mut self) -> Result<RunReport> {
        let mode = RunMode::select(&self.config.flags, self.catalog.is_some());
        info!(mode = %mode, has_catalog = self.catalog.is_some(), "Processing");
        metrics::record_run_mode(mode.as_str());
        self.set_state(EngineState::for_mode(mode));

        match self.run_mode(mode).await {
            Ok(report) => {
                self.set_state(EngineState::Done);
                info!(mode = %mode, "Run complete");
                Ok(report)
            }
            Err(e) => {
                error!(mode = %mode, error = %e, "Run failed");
                metrics::record_error(mode.as_str(), e.kind());
                self.set_state(EngineState::Failed);
                Err(e)
            }
        }
    }

    async fn run_mode(&mut self, mode: RunMode) -> Result<RunReport> {
        match mode {
            RunMode::TestConnection => {
                self.test_connection().await?;
                Ok(RunReport::ConnectionOk)
            }
            RunMode::Discover => {
                let catalog = self.discover().await?;
                self.write_document(&catalog.to_value()).await?;
                Ok(RunReport::Discovered(catalog))
            }
            RunMode::DiscoverStreams => {
                let ids = self.discover_streams().await?;
                self.write_document(&serde_json::to_value(&ids)?).await?;
                Ok(RunReport::StreamIds(ids))
            }
            RunMode::LoadSample => {
                let catalog = self.require_catalog()?;
                Ok(RunReport::SampleData(self.load_sample_data(&catalog).await?))
            }
            RunMode::CountRecords => {
                let catalog = self.require_catalog()?;
                let counts = self.count_records(&catalog).await?;
                let document: Map<String, Value> = counts
                    .iter()
                    .map(|(id, count)| (id.clone(), Value::from(*count)))
                    .collect();
                self.write_document(&Value::Object(document)).await?;
                Ok(RunReport::RecordCounts(counts))
            }
            RunMode::Sync => {
                let catalog = self.require_catalog()?;
                Ok(RunReport::Synced(self.sync(&catalog).await?))
            }
        }
    }

    fn require_catalog(&self) -> Result<Catalog> {
        self.catalog
            .clone()
            .ok_or_else(|| ReplicationError::InvalidState {
                expected: "catalog loaded".to_string(),
                actual: "no catalog".to_string(),
            })
    }

    /// Check that the data source is reachable.
    pub async fn test_connection(&self) -> Result<()> {
        let result = self.source.test_connection().await;
        metrics::record_connection_test(result.is_ok());
        result?;
        info!("Connection test passed");
        Ok(())
    }

    /// Read a bounded preview of each selected stream.
    ///
    /// No messages are emitted and bookmarks are left alone.
    pub async fn load_sample_data(&self, catalog: &Catalog) -> Result<Vec<StreamSample>> {
        let limit = self.config.settings.sample_limit;
        let mut samples = Vec::new();

        for entry in self.selected_streams(catalog) {
            let records = self
                .source
                .load_data(entry, None, LoadOptions::sample(limit))
                .take(limit)
                .try_collect::<Vec<_>>()
                .await?;

            debug!(stream_id = %entry.tap_stream_id(), rows = records.len(), "Loaded sample");
            metrics::record_sample_rows(entry.tap_stream_id(), records.len());
            samples.push(StreamSample {
                stream_id: entry.tap_stream_id().to_string(),
                records,
            });
        }

        Ok(samples)
    }

    /// Count records for each selected stream, one source call per stream.
    pub async fn count_records(&self, catalog: &Catalog) -> Result<Vec<(String, u64)>> {
        let mut counts = Vec::new();

        for entry in self.selected_streams(catalog) {
            let count = self.source.count_records(entry).await?;
            info!(stream_id = %entry.tap_stream_id(), count, "Counted records");
            metrics::record_stream_count(entry.tap_stream_id(), count);
            counts.push((entry.tap_stream_id().to_string(), count));
        }

        Ok(counts)
    }

    /// Write a JSON document to `output.path`, or as one line to the sink.
    async fn write_document(&mut self, document: &Value) -> Result<()> {
        match &self.config.output.path {
            Some(path) => {
                let contents = serde_json::to_vec_pretty(document)?;
                tokio::fs::write(path, contents).await?;
                debug!(path = %path, "Wrote output document");
            }
            None => {
                self.sink.write(&serde_json::to_string(document)?)?;
                self.sink.flush()?;
            }
        }
        Ok(())
    }

    /// Emit one message: one write, one flush.
    fn emit(&mut self, message: &Message) -> Result<()> {
        self.sink.write(&message.to_line()?)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Open the bookmark store, if one is configured and not yet open.
    async fn ensure_store(&mut self) -> Result<()> {
        if self.store.is_some() {
            return Ok(());
        }
        if let Some(store_config) = &self.config.bookmarks {
            self.store = Some(BookmarkStore::open(store_config).await?);
        }
        Ok(())
    }

    /// Flush dirty bookmarks and close the store.
    pub async fn close(&mut self) {
        if let Some(store) = self.store.take() {
            store.close().await;
        }
    }
}
