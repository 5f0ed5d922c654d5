// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync: replicating selected streams.
//!
//! # Per-stream sequence
//!
//! ```text
//! process_stream  → validate replication method, emit SCHEMA
//! sync_stream     → prior bookmark (or start date)
//!                 → source.load_data
//!                 → RecordWriter emits RECORDs
//!                 → merge max bookmark, emit STATE, then commit and stage in store
//! ```
//!
//! # Failure
//!
//! The first error aborts the run. Streams that completed keep their
//! advanced bookmarks and those are still flushed to the store; the failing
//! stream's bookmark is left where it was, so the next run re-reads it.

use super::{ReplicationEngine, StreamSummary, SyncSummary};
use crate::bookmark::bookmark_from_values;
use crate::catalog::{Catalog, CatalogEntry, ReplicationMethod};
use crate::error::Result;
use crate::message::Message;
use crate::metrics;
use crate::sink::MessageSink;
use crate::source::{DataSource, LoadOptions, RecordStream};
use crate::writer::{RecordWriter, SyncResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

impl<S: DataSource, K: MessageSink> ReplicationEngine<S, K> {
    /// Replicate every selected stream, in catalog order.
    pub async fn sync(&mut self, catalog: &Catalog) -> Result<SyncSummary> {
        self.ensure_store().await?;
        self.seed_bookmarks().await;

        let streams = self.selected_streams(catalog);
        info!(
            selected = streams.len(),
            total = catalog.len(),
            sorted = self.config.settings.is_sorted,
            "Starting sync"
        );

        let mut summary = SyncSummary::default();
        let mut outcome = Ok(());
        for entry in streams {
            if let Err(e) = self.sync_one(entry, &mut summary).await {
                metrics::record_error(entry.tap_stream_id(), e.kind());
                outcome = Err(e);
                break;
            }
        }

        // Completed streams keep their progress even when a later one failed
        let flushed = self.flush_bookmarks().await;
        outcome?;
        flushed?;

        summary.state = self.bookmarks.clone();
        info!(
            streams = summary.streams.len(),
            records = summary.total_records(),
            "Sync complete"
        );
        Ok(summary)
    }

    async fn sync_one(&mut self, entry: &CatalogEntry, summary: &mut SyncSummary) -> Result<()> {
        let started = Instant::now();
        let method = self.process_stream(entry)?;
        let result = self.sync_stream(entry, &method).await?;

        metrics::record_stream_synced(
            entry.tap_stream_id(),
            method.as_str(),
            result.records_written,
            started.elapsed(),
        );
        summary.streams.push(StreamSummary {
            stream_id: entry.tap_stream_id().to_string(),
            replication_method: method,
            records_written: result.records_written,
        });
        Ok(())
    }

    /// Validate the stream's replication method and announce its schema.
    ///
    /// Emits exactly one SCHEMA message (one write, one flush) and returns
    /// the validated method.
    pub fn process_stream(&mut self, entry: &CatalogEntry) -> Result<ReplicationMethod> {
        let method = self.resolver.resolve_replication_method(entry)?;
        let key_properties = self.resolver.resolve_key_properties(entry);
        let bookmark_properties = self.resolver.resolve_bookmark_properties(entry);

        debug!(
            stream_id = %entry.tap_stream_id(),
            method = %method,
            "Emitting schema"
        );
        self.emit(&Message::schema(entry, key_properties, bookmark_properties))?;
        Ok(method)
    }

    /// Load a stream's records, write them and advance its bookmark.
    ///
    /// `method` is the one validated by [`Self::process_stream`]. The
    /// bookmark only advances once the STATE message carrying it is written.
    pub async fn sync_stream(
        &mut self,
        entry: &CatalogEntry,
        method: &ReplicationMethod,
    ) -> Result<SyncResult> {
        let stream_id = entry.tap_stream_id();
        let bookmark_properties = self.resolver.resolve_bookmark_properties(entry);

        if method.is_incremental() && bookmark_properties.is_empty() {
            warn!(
                stream_id = %stream_id,
                "INCREMENTAL stream has no bookmark properties, reading without a bookmark"
            );
        }

        let prior = if bookmark_properties.is_empty() {
            None
        } else {
            self.bookmarks
                .get(stream_id)
                .cloned()
                .or_else(|| self.resolver.initial_bookmark(entry))
        };

        info!(
            stream_id = %stream_id,
            method = %method,
            resumed = prior.is_some(),
            "Syncing stream"
        );

        let source = Arc::clone(&self.source);
        let records = source.load_data(entry, prior.as_ref(), LoadOptions::full());
        let result = self.write_records(entry, records).await?;

        let mut next = self.bookmarks.clone();
        let mut advanced = None;
        if !result.max_bookmark.is_empty() {
            let mut reached = bookmark_from_values(&bookmark_properties, &result.max_bookmark);
            reached.retain(|_, value| !value.is_null());
            if !reached.is_empty() {
                advanced = Some(next.advance(stream_id, reached).clone());
            }
        }

        // Nothing is committed until the STATE line is out
        self.emit(&Message::state(&next))?;
        self.bookmarks = next;
        if let (Some(store), Some(advanced)) = (&self.store, &advanced) {
            store.set(stream_id, advanced).await;
        }

        info!(
            stream_id = %stream_id,
            records = result.records_written,
            "Stream synced"
        );
        Ok(result)
    }

    /// Write records through a [`RecordWriter`] configured from settings.
    pub async fn write_records(
        &mut self,
        entry: &CatalogEntry,
        records: RecordStream<'_>,
    ) -> Result<SyncResult> {
        let bookmark_properties = self.resolver.resolve_bookmark_properties(entry);
        RecordWriter::new(self.config.settings.is_sorted)
            .write_records(&mut self.sink, entry, &bookmark_properties, records)
            .await
    }

    /// Pull persisted bookmarks into this run's state.
    ///
    /// Skipped when the caller supplied an explicit state. Streams already
    /// present in memory (from an earlier run on this engine) are kept.
    async fn seed_bookmarks(&mut self) {
        if self.explicit_state {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        let persisted = store.load_state().await;
        for stream_id in persisted.stream_ids() {
            if self.bookmarks.get(stream_id).is_some() {
                continue;
            }
            if let Some(bookmark) = persisted.get(stream_id) {
                debug!(stream_id = %stream_id, "Seeded bookmark from store");
                self.bookmarks.insert(stream_id, bookmark.clone());
            }
        }
    }

    async fn flush_bookmarks(&self) -> Result<()> {
        if let Some(store) = &self.store {
            let flushed = store.flush_dirty().await?;
            debug!(flushed, "Flushed bookmarks");
        }
        Ok(())
    }
}
