//! Configuration for the replication engine.
//!
//! This module defines all configuration types needed to run the engine.
//! Configuration is passed to [`ReplicationEngine::new()`](crate::ReplicationEngine::new)
//! and can be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use stream_replication::config::{EngineConfig, RunFlags};
//!
//! let config = EngineConfig {
//!     flags: RunFlags {
//!         count_records: true,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! EngineConfig
//! ├── flags: RunFlags               # which run mode (see RunMode::select)
//! ├── settings: SyncSettings        # sortedness, selection, start date, overrides
//! ├── bookmarks: Option<BookmarkStoreConfig>   # SQLite bookmark persistence
//! └── output: OutputConfig          # where discovery/count documents go
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "flags": { "discover_mode": false },
//!   "settings": {
//!     "is_sorted": false,
//!     "selected_streams": ["demo_users"],
//!     "start_date": "2023-01-01"
//!   },
//!   "bookmarks": { "sqlite_path": "/var/lib/app/bookmarks.db" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `ReplicationEngine::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run-mode flags. Evaluated once, at `process()` entry.
    #[serde(default)]
    pub flags: RunFlags,

    /// Settings for the sync and sample passes.
    #[serde(default)]
    pub settings: SyncSettings,

    /// Bookmark persistence. `None` keeps bookmarks in memory only.
    #[serde(default)]
    pub bookmarks: Option<BookmarkStoreConfig>,

    /// Destination for discovery and count documents.
    #[serde(default)]
    pub output: OutputConfig,
}

impl EngineConfig {
    /// Create a minimal config for testing (in-memory bookmark store).
    pub fn for_testing() -> Self {
        Self {
            bookmarks: Some(BookmarkStoreConfig::in_memory()),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RunFlags / RunMode
// ═══════════════════════════════════════════════════════════════════════════════

/// Boolean flags as a caller would pass them.
///
/// They are collapsed into a single [`RunMode`] by [`RunMode::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    #[serde(default)]
    pub test_connection: bool,
    #[serde(default)]
    pub discover_mode: bool,
    #[serde(default)]
    pub discover_streams_mode: bool,
    #[serde(default)]
    pub load_sample_data: bool,
    #[serde(default)]
    pub count_records: bool,
}

/// What a single `process()` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Check source connectivity and stop.
    TestConnection,
    /// Build the full catalog.
    Discover,
    /// Build the catalog and report only stream ids.
    DiscoverStreams,
    /// Return a bounded preview per selected stream.
    LoadSample,
    /// Count records per selected stream.
    CountRecords,
    /// Replicate every selected stream.
    Sync,
}

impl RunMode {
    /// Pick the run mode. Precedence, first match wins:
    ///
    /// 1. `test_connection`
    /// 2. no catalog, or `discover_mode` → discovery
    ///    (`discover_streams_mode` narrows it to stream ids)
    /// 3. `load_sample_data`
    /// 4. `count_records`
    /// 5. sync
    pub fn select(flags: &RunFlags, has_catalog: bool) -> Self {
        if flags.test_connection {
            Self::TestConnection
        } else if !has_catalog || flags.discover_mode {
            if flags.discover_streams_mode {
                Self::DiscoverStreams
            } else {
                Self::Discover
            }
        } else if flags.load_sample_data {
            Self::LoadSample
        } else if flags.count_records {
            Self::CountRecords
        } else {
            Self::Sync
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestConnection => "test_connection",
            Self::Discover => "discover",
            Self::DiscoverStreams => "discover_streams",
            Self::LoadSample => "load_sample",
            Self::CountRecords => "count_records",
            Self::Sync => "sync",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SyncSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings for the sync and sample passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// The source returns records in bookmark order.
    ///
    /// When true the bookmark is read from the last record of a stream;
    /// when false the writer tracks the maximum across all records.
    #[serde(default = "default_true")]
    pub is_sorted: bool,

    /// Restrict the run to these stream ids (on top of catalog selection).
    #[serde(default)]
    pub selected_streams: Option<Vec<String>>,

    /// Seed for INCREMENTAL streams that have no bookmark yet.
    #[serde(default)]
    pub start_date: Option<String>,

    /// Maximum records returned per stream in sample mode.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,

    /// Per-stream replacement for the catalog's bookmark properties.
    #[serde(default)]
    pub bookmark_overrides: BTreeMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_sample_limit() -> usize {
    100
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            is_sorted: true,
            selected_streams: None,
            start_date: None,
            sample_limit: default_sample_limit(),
            bookmark_overrides: BTreeMap::new(),
        }
    }
}

impl SyncSettings {
    /// Whether `stream_id` passes the `selected_streams` filter.
    pub fn allows_stream(&self, stream_id: &str) -> bool {
        match &self.selected_streams {
            Some(ids) => ids.iter().any(|id| id == stream_id),
            None => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BookmarkStoreConfig / OutputConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Bookmark persistence configuration.
///
/// Bookmarks are what make incremental runs resumable, so they are kept in
/// SQLite rather than in whatever state the data source happens to have.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkStoreConfig {
    /// Path to SQLite database for bookmark storage.
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for BookmarkStoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "replication_bookmarks.db".to_string(),
            wal_mode: true,
        }
    }
}

impl BookmarkStoreConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }
}

/// Where JSON documents (catalog, stream ids, counts) are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File path; `None` writes the document as one line to the sink.
    #[serde(default)]
    pub path: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
