// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record writer.
//!
//! Emits a stream's records to the sink, one RECORD message per line, and
//! works out the bookmark the stream reached.
//!
//! # Sorted vs unsorted sources
//!
//! ```text
//! is_sorted = true   records arrive in bookmark order
//!                    → bookmark = bookmark properties of the LAST record
//! is_sorted = false  records arrive in any order
//!                    → bookmark = per-property maximum over ALL records
//! ```
//!
//! In unsorted mode each property is maximised independently, so the
//! resulting bookmark may combine values from different records.

use crate::bookmark::compare_bookmark_values;
use crate::catalog::CatalogEntry;
use crate::error::Result;
use crate::message::Message;
use crate::sink::MessageSink;
use crate::source::{Record, RecordStream};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

/// Outcome of one write pass over a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncResult {
    /// Number of RECORD messages emitted.
    pub records_written: usize,
    /// The last record emitted, if any.
    pub final_record: Option<Record>,
    /// One value per bookmark property, aligned with the properties passed
    /// to the writer. Empty when nothing was written or the stream has no
    /// bookmark properties.
    pub max_bookmark: Vec<Value>,
}

impl SyncResult {
    pub fn is_empty(&self) -> bool {
        self.records_written == 0
    }
}

/// Writes records to a sink while tracking the stream's bookmark.
#[derive(Debug, Clone, Copy)]
pub struct RecordWriter {
    is_sorted: bool,
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self { is_sorted: true }
    }
}

impl RecordWriter {
    pub fn new(is_sorted: bool) -> Self {
        Self { is_sorted }
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    /// Emit every record of `records` to `sink`, in input order.
    ///
    /// Each record is written and flushed before the next one is pulled.
    /// A failing stream item aborts the pass with the source error; records
    /// already emitted stay emitted.
    pub async fn write_records(
        &self,
        sink: &mut dyn MessageSink,
        entry: &CatalogEntry,
        bookmark_properties: &[String],
        mut records: RecordStream<'_>,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        // Unsorted mode: running per-property maxima
        let mut maxima: Vec<Option<Value>> = vec![None; bookmark_properties.len()];

        while let Some(record) = records.next().await {
            let record = record?;

            if !self.is_sorted {
                for (slot, property) in maxima.iter_mut().zip(bookmark_properties) {
                    let Some(value) = record.get(property) else {
                        continue;
                    };
                    let larger = slot.as_ref().map_or(true, |current| {
                        compare_bookmark_values(current, value) == Ordering::Less
                    });
                    if larger {
                        *slot = Some(value.clone());
                    }
                }
            }

            let line = Message::record(entry, record.clone(), chrono::Utc::now()).to_line()?;
            sink.write(&line)?;
            sink.flush()?;

            result.records_written += 1;
            result.final_record = Some(record);
        }

        if let Some(last) = &result.final_record {
            result.max_bookmark = if self.is_sorted {
                bookmark_properties
                    .iter()
                    .map(|property| last.get(property).cloned().unwrap_or(Value::Null))
                    .collect()
            } else {
                maxima
                    .into_iter()
                    .map(|value| value.unwrap_or(Value::Null))
                    .collect()
            };
        }

        debug!(
            stream_id = %entry.tap_stream_id(),
            records = result.records_written,
            sorted = self.is_sorted,
            "Write pass complete"
        );
        crate::metrics::record_records_written(entry.tap_stream_id(), result.records_written);

        Ok(result)
    }
}
