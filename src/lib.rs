//! # Stream Replication
//!
//! A catalog-driven replication engine: decides which streams to sync, in
//! which replication mode, tracks a bookmark (high-water mark) per stream
//! and emits records plus updated bookmarks so that runs are resumable.
//!
//! ## Architecture
//!
//! The engine sits between a data source and a line-oriented message sink:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          stream-replication                               │
//! │                                                                           │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌──────────────────────────┐  │
//! │  │ DataSource  │───►│ ReplicationEngine│───►│ RecordWriter → sink      │  │
//! │  │ (caller's)  │    │ (run modes)      │    │ SCHEMA / RECORD / STATE  │  │
//! │  └─────────────┘    └──────────────────┘    └──────────────────────────┘  │
//! │                        │            │                                     │
//! │                        ▼            ▼                                     │
//! │               ┌──────────────┐  ┌───────────────┐                         │
//! │               │ Catalog +    │  │ BookmarkStore │                         │
//! │               │ Resolver     │  │ (SQLite)      │                         │
//! │               └──────────────┘  └───────────────┘                         │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Run Modes
//!
//! 1. **Test connection**: ask the source whether it is reachable
//! 2. **Discovery**: build a catalog (or just its stream ids) from the source
//! 3. **Sample**: bounded preview of each selected stream
//! 4. **Count**: per-stream record counts
//! 5. **Sync**: replicate selected streams, advancing bookmarks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stream_replication::{Catalog, EngineConfig, ReplicationEngine};
//!
//! #[tokio::main]
//! async fn main() -> stream_replication::Result<()> {
//!     let catalog = Catalog::load("catalog.json").await?;
//!     let mut engine = ReplicationEngine::new(EngineConfig::default()).with_catalog(catalog);
//!
//!     engine.process().await?;
//!     engine.close().await;
//!     Ok(())
//! }
//! ```

pub mod bookmark;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod metrics;
pub mod resolver;
pub mod sink;
pub mod source;
pub mod store;
pub mod writer;

// Re-exports for convenience
pub use bookmark::{Bookmark, BookmarkState};
pub use catalog::{Catalog, CatalogEntry, ReplicationMethod, Schema, StreamHints};
pub use config::{BookmarkStoreConfig, EngineConfig, OutputConfig, RunFlags, RunMode, SyncSettings};
pub use coordinator::{EngineState, ReplicationEngine, RunReport, StreamSample, SyncSummary};
pub use error::{ReplicationError, Result};
pub use message::Message;
pub use resolver::StreamMetadataResolver;
pub use sink::{MemorySink, MessageSink, StdoutSink};
pub use source::{DataSource, LoadOptions, NoOpSource, Record, SourceError};
pub use store::BookmarkStore;
pub use writer::{RecordWriter, SyncResult};
