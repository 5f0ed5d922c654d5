// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-stream replication metadata.
//!
//! Decides, for one catalog entry, which replication method to run, which
//! fields form the primary key and which fields form the bookmark.

use crate::bookmark::Bookmark;
use crate::catalog::{CatalogEntry, ReplicationMethod};
use crate::config::SyncSettings;
use crate::error::{ReplicationError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resolves replication method, key and bookmark properties for a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamMetadataResolver {
    bookmark_overrides: BTreeMap<String, Vec<String>>,
    start_date: Option<String>,
}

impl StreamMetadataResolver {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            bookmark_overrides: settings.bookmark_overrides.clone(),
            start_date: settings.start_date.clone(),
        }
    }

    /// The stream's replication method, refusing anything we can't run.
    pub fn resolve_replication_method(&self, entry: &CatalogEntry) -> Result<ReplicationMethod> {
        match &entry.replication_method {
            ReplicationMethod::Unsupported(raw) => Err(ReplicationError::unsupported_method(
                entry.tap_stream_id(),
                raw.clone(),
            )),
            method => Ok(method.clone()),
        }
    }

    /// Bookmark properties; empty unless the stream is INCREMENTAL.
    ///
    /// A configured override for the stream replaces the catalog's list.
    pub fn resolve_bookmark_properties(&self, entry: &CatalogEntry) -> Vec<String> {
        if !entry.replication_method.is_incremental() {
            return Vec::new();
        }
        self.bookmark_overrides
            .get(entry.tap_stream_id())
            .cloned()
            .unwrap_or_else(|| entry.bookmark_properties.clone())
    }

    /// Primary key fields, falling back to `table-key-properties` metadata.
    pub fn resolve_key_properties(&self, entry: &CatalogEntry) -> Vec<String> {
        if !entry.key_properties.is_empty() {
            return entry.key_properties.clone();
        }
        entry
            .root_metadata()
            .and_then(|md| md.get("table-key-properties"))
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Bookmark for a stream that has never been synced.
    ///
    /// Seeds the first bookmark property with the configured start date.
    /// `None` when the stream has no bookmark properties or no start date
    /// is configured.
    pub fn initial_bookmark(&self, entry: &CatalogEntry) -> Option<Bookmark> {
        let start_date = self.start_date.as_ref()?;
        let property = self.resolve_bookmark_properties(entry).into_iter().next()?;
        Some(Bookmark::from([(property, Value::String(start_date.clone()))]))
    }
}
