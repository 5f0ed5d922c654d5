// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Messages emitted to the sink, one JSON object per line.
//!
//! ```text
//! {"type":"SCHEMA","stream":"users","tap_stream_id":"users","schema":{...},"key_properties":["id"],"bookmark_properties":["updated_at"]}
//! {"type":"RECORD","stream":"users","record":{...},"time_extracted":"2024-01-02T03:04:05.000000Z"}
//! {"type":"STATE","value":{"bookmarks":{"users":{"updated_at":"2024-01-02"}}}}
//! ```

use crate::bookmark::BookmarkState;
use crate::catalog::{CatalogEntry, Schema};
use crate::source::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A line on the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Announces a stream before its records.
    Schema {
        stream: String,
        tap_stream_id: String,
        schema: Schema,
        key_properties: Vec<String>,
        bookmark_properties: Vec<String>,
    },
    /// One replicated record.
    Record {
        stream: String,
        record: Record,
        time_extracted: String,
    },
    /// Bookmarks after a stream's write pass.
    State { value: Value },
}

impl Message {
    pub fn schema(
        entry: &CatalogEntry,
        key_properties: Vec<String>,
        bookmark_properties: Vec<String>,
    ) -> Self {
        Self::Schema {
            stream: entry.stream.clone(),
            tap_stream_id: entry.tap_stream_id().to_string(),
            schema: entry.schema.clone(),
            key_properties,
            bookmark_properties,
        }
    }

    pub fn record(entry: &CatalogEntry, record: Record, extracted_at: DateTime<Utc>) -> Self {
        Self::Record {
            stream: entry.stream.clone(),
            record,
            time_extracted: extracted_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    pub fn state(state: &BookmarkState) -> Self {
        Self::State {
            value: state.to_value(),
        }
    }

    /// Encode as a single line (no trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
