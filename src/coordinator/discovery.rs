// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Discovery: building a catalog from the data source.
//!
//! # Algorithm
//!
//! 1. Ask the source for its stream ids (this fixes catalog order)
//! 2. For each id, fetch the schema and replication hints
//! 3. Build an unselected catalog entry with one metadata entry per property
//!
//! Discovery never selects anything. Callers mark streams selected in the
//! returned catalog and hand it back for a sync.

use super::ReplicationEngine;
use crate::catalog::{Catalog, CatalogEntry, Schema};
use crate::error::Result;
use crate::metrics;
use crate::sink::MessageSink;
use crate::source::DataSource;
use std::time::Instant;
use tracing::{debug, info};

impl<S: DataSource, K: MessageSink> ReplicationEngine<S, K> {
    /// Stream ids the source serves, in source order.
    pub async fn get_stream_ids(&self) -> Result<Vec<String>> {
        Ok(self.source.get_stream_ids().await?)
    }

    /// Catalog entry for one discovered stream.
    ///
    /// Replication method and key columns come from the source's hints.
    pub async fn build_catalog_entry(&self, stream_id: &str, schema: Schema) -> Result<CatalogEntry> {
        let hints = self.source.stream_hints(stream_id).await?;
        let entry = CatalogEntry::discovered(stream_id, schema, &hints);
        debug!(
            stream_id = %stream_id,
            method = %entry.replication_method,
            metadata_entries = entry.metadata.len(),
            "Built catalog entry"
        );
        Ok(entry)
    }

    /// Build the full catalog.
    pub async fn discover(&self) -> Result<Catalog> {
        let started = Instant::now();
        let stream_ids = self.get_stream_ids().await?;

        let mut entries = Vec::with_capacity(stream_ids.len());
        for stream_id in &stream_ids {
            let schema = self.source.get_schema(stream_id).await?;
            entries.push(self.build_catalog_entry(stream_id, schema).await?);
        }

        let catalog = Catalog::new(entries)?;
        info!(streams = catalog.len(), "Discovery complete");
        metrics::record_streams_discovered(catalog.len(), started.elapsed());
        Ok(catalog)
    }

    /// Build the catalog but report only its stream ids.
    pub async fn discover_streams(&self) -> Result<Vec<String>> {
        Ok(self.discover().await?.stream_ids())
    }

    /// Streams this run should touch, in catalog order.
    ///
    /// Root-selected entries, narrowed further by `settings.selected_streams`
    /// when that list is configured.
    pub fn selected_streams<'c>(&self, catalog: &'c Catalog) -> Vec<&'c CatalogEntry> {
        catalog
            .get_selected_streams()
            .into_iter()
            .filter(|entry| self.config.settings.allows_stream(entry.tap_stream_id()))
            .collect()
    }
}
