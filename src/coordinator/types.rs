//! Engine state and run report types.
//!
//! # State Transitions
//!
//! ```text
//!                    process()
//! Idle ───────────────────────────→ TestingConnection ─┐
//!   ↑                          ├──→ Discovering ───────┤
//!   │                          ├──→ DiscoveringStreams ┤
//!   │                          ├──→ LoadingSample ─────┤
//!   │                          ├──→ CountingRecords ───┤
//!   │                          └──→ Syncing ───────────┤
//!   │                                                  ↓
//!   │                                      Done (success) / Failed (error)
//!   └──────────── next process() call starts again ────┘
//! ```
//!
//! # State Descriptions
//!
//! - **Idle**: Initial state after construction. Nothing has run.
//! - **TestingConnection**: Checking that the data source is reachable.
//! - **Discovering** / **DiscoveringStreams**: Building a catalog from the source.
//! - **LoadingSample**: Reading a bounded preview of each selected stream.
//! - **CountingRecords**: Asking the source for per-stream record counts.
//! - **Syncing**: Replicating selected streams, one at a time.
//! - **Done**: The last `process()` call succeeded.
//! - **Failed**: The last `process()` call returned an error.

use crate::bookmark::BookmarkState;
use crate::catalog::{Catalog, ReplicationMethod};
use crate::config::RunMode;
use crate::source::Record;

/// State of the replication engine.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine created, nothing run yet.
    Idle,
    TestingConnection,
    Discovering,
    DiscoveringStreams,
    LoadingSample,
    CountingRecords,
    /// Replicating selected streams.
    ///
    /// Bookmarks are only advanced after a stream's write pass completes.
    Syncing,
    /// Last run finished successfully.
    Done,
    /// Last run returned an error. Check logs for details.
    Failed,
}

impl EngineState {
    /// The working state a run mode puts the engine in.
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::TestConnection => Self::TestingConnection,
            RunMode::Discover => Self::Discovering,
            RunMode::DiscoverStreams => Self::DiscoveringStreams,
            RunMode::LoadSample => Self::LoadingSample,
            RunMode::CountRecords => Self::CountingRecords,
            RunMode::Sync => Self::Syncing,
        }
    }

    /// Whether a run is finished (or never started).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::TestingConnection => write!(f, "TestingConnection"),
            EngineState::Discovering => write!(f, "Discovering"),
            EngineState::DiscoveringStreams => write!(f, "DiscoveringStreams"),
            EngineState::LoadingSample => write!(f, "LoadingSample"),
            EngineState::CountingRecords => write!(f, "CountingRecords"),
            EngineState::Syncing => write!(f, "Syncing"),
            EngineState::Done => write!(f, "Done"),
            EngineState::Failed => write!(f, "Failed"),
        }
    }
}

/// Preview rows for one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSample {
    pub stream_id: String,
    pub records: Vec<Record>,
}

/// Outcome of one stream's sync.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub stream_id: String,
    pub replication_method: ReplicationMethod,
    pub records_written: usize,
}

/// Outcome of a full sync run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    /// Synced streams, in catalog order.
    pub streams: Vec<StreamSummary>,
    /// Bookmarks after the run.
    pub state: BookmarkState,
}

impl SyncSummary {
    pub fn total_records(&self) -> usize {
        self.streams.iter().map(|s| s.records_written).sum()
    }
}

/// What a `process()` call produced. One variant per [`RunMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    ConnectionOk,
    Discovered(Catalog),
    StreamIds(Vec<String>),
    SampleData(Vec<StreamSample>),
    /// `(stream_id, count)` in catalog order.
    RecordCounts(Vec<(String, u64)>),
    Synced(SyncSummary),
}
