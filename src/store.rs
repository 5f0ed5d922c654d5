// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bookmark persistence for incremental streams.
//!
//! Stores the last emitted bookmark for each stream in SQLite, so the next
//! run picks up where this one stopped instead of re-reading from the
//! start date.
//!
//! # Debounced Writes
//!
//! Bookmarks are debounced the same way for every stream:
//! - `set()` updates the in-memory cache immediately and marks the stream dirty
//! - `flush_dirty()` persists all dirty bookmarks to disk in a batch
//! - The engine calls `flush_dirty()` at the end of every sync run,
//!   including a run that failed part way through
//!
//! A crash between `set()` and `flush_dirty()` loses the bookmarks of that
//! run. The next run re-reads those records (sinks must upsert on key).
//!
//! # SQLite Busy Handling
//!
//! SQLite can return SQLITE_BUSY/SQLITE_LOCKED when the database is
//! contended. We handle this with:
//! - Automatic retry with exponential backoff
//! - Bounded attempts (5)
//! - Cache-first writes (cache is updated immediately, disk write retried)
//!
//! ## Bookmark Semantics
//!
//! The stored bookmark is the one in the **last STATE message emitted** for
//! the stream. It is stored as the JSON text of the bookmark object.
//!
//! ```text
//! write records → emit STATE {"id": 42} → set("orders", {"id": 42}) → flush
//!                 (crash here = re-read from the previous bookmark)
//! ```

use crate::bookmark::{Bookmark, BookmarkState};
use crate::config::BookmarkStoreConfig;
use crate::error::{ReplicationError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Configuration for SQLite busy retry behavior
const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

const IN_MEMORY_PATH: &str = ":memory:";

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Run a database operation, retrying on SQLITE_BUSY/SQLITE_LOCKED.
async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    mut f: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts, "SQLite operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                crate::metrics::bookmark_retries_total(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(
                        operation = operation_name,
                        attempts, "SQLite busy, max retries exceeded"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Persistent bookmark storage backed by SQLite.
///
/// Supports debounced writes: updates go to cache immediately,
/// and are flushed to disk via `flush_dirty()`.
pub struct BookmarkStore {
    pool: SqlitePool,
    /// In-memory cache for fast reads
    cache: Arc<RwLock<HashMap<String, Bookmark>>>,
    /// Stream ids with bookmarks not yet persisted
    dirty: Arc<RwLock<HashSet<String>>>,
}

impl BookmarkStore {
    /// Open a file-backed store with WAL enabled.
    ///
    /// Creates the database and table if they don't exist.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let config = BookmarkStoreConfig {
            sqlite_path: path.as_ref().to_string_lossy().to_string(),
            wal_mode: true,
        };
        Self::open(&config).await
    }

    /// Open a private in-memory store (nothing survives `close()`).
    pub async fn in_memory() -> Result<Self> {
        Self::open(&BookmarkStoreConfig::in_memory()).await
    }

    /// Open the store described by `config`.
    pub async fn open(config: &BookmarkStoreConfig) -> Result<Self> {
        let path_str = config.sqlite_path.clone();
        info!(path = %path_str, wal = config.wal_mode, "Initializing bookmark store");

        let pool = if path_str == IN_MEMORY_PATH {
            // Every connection to :memory: is its own database, so the pool
            // must hold exactly one connection for the store's lifetime.
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            let journal_mode = if config.wal_mode {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            };
            let options =
                SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path_str))
                    .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?
                    .journal_mode(journal_mode)
                    .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                    .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await?
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bookmarks (
                stream_id TEXT PRIMARY KEY,
                bookmark TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT stream_id, bookmark FROM bookmarks")
                .fetch_all(&pool)
                .await?;

        let mut cache = HashMap::new();
        for (stream_id, raw) in rows {
            match serde_json::from_str::<Bookmark>(&raw) {
                Ok(bookmark) => {
                    debug!(stream_id = %stream_id, bookmark = %raw, "Loaded bookmark from disk");
                    cache.insert(stream_id, bookmark);
                }
                Err(e) => {
                    warn!(stream_id = %stream_id, error = %e, "Skipping unreadable bookmark");
                }
            }
        }

        if !cache.is_empty() {
            info!(count = cache.len(), "Restored bookmarks from previous run");
        }

        Ok(Self {
            pool,
            cache: Arc::new(RwLock::new(cache)),
            dirty: Arc::new(RwLock::new(HashSet::new())),
        })
    }

    /// Get the bookmark for a stream (from cache).
    ///
    /// Returns `None` if the stream has never been synced.
    pub async fn get(&self, stream_id: &str) -> Option<Bookmark> {
        self.cache.read().await.get(stream_id).cloned()
    }

    /// Update the bookmark for a stream (debounced).
    ///
    /// Updates cache immediately, marks the stream as dirty.
    pub async fn set(&self, stream_id: &str, bookmark: &Bookmark) {
        {
            let mut cache = self.cache.write().await;
            cache.insert(stream_id.to_string(), bookmark.clone());
        }
        {
            let mut dirty = self.dirty.write().await;
            dirty.insert(stream_id.to_string());
        }

        debug!(stream_id = %stream_id, "Bookmark updated (pending flush)");
    }

    /// Flush all dirty bookmarks to disk.
    ///
    /// Returns the number of bookmarks flushed. Bookmarks that fail to
    /// persist stay dirty for the next flush.
    pub async fn flush_dirty(&self) -> Result<usize> {
        let dirty_streams: Vec<String> = {
            let mut dirty = self.dirty.write().await;
            dirty.drain().collect()
        };

        if dirty_streams.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let cache = self.cache.read().await;
        let pool = &self.pool;

        let mut flushed = 0;
        let mut errors = 0;

        for stream_id in &dirty_streams {
            let Some(bookmark) = cache.get(stream_id) else {
                continue;
            };
            let encoded = serde_json::to_string(bookmark)?;

            let result = execute_with_retry("bookmark_flush", || async {
                sqlx::query(
                    r#"
                    INSERT INTO bookmarks (stream_id, bookmark, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(stream_id) DO UPDATE SET
                        bookmark = excluded.bookmark,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(stream_id)
                .bind(&encoded)
                .bind(now)
                .execute(pool)
                .await
            })
            .await;

            match result {
                Ok(_) => flushed += 1,
                Err(e) => {
                    errors += 1;
                    warn!(stream_id = %stream_id, error = %e, "Failed to flush bookmark");
                    self.dirty.write().await.insert(stream_id.clone());
                }
            }
        }

        if flushed > 0 || errors > 0 {
            debug!(flushed, errors, "Flushed dirty bookmarks");
            crate::metrics::record_bookmark_flush(flushed, errors);
        }

        if errors > 0 {
            return Err(ReplicationError::Internal(format!(
                "Failed to flush {} bookmarks",
                errors
            )));
        }

        Ok(flushed)
    }

    /// Check if there are any dirty (unflushed) bookmarks.
    pub async fn has_dirty(&self) -> bool {
        !self.dirty.read().await.is_empty()
    }

    /// Get count of dirty bookmarks pending flush.
    pub async fn dirty_count(&self) -> usize {
        self.dirty.read().await.len()
    }

    /// Forget a stream's bookmark, so its next sync starts over.
    pub async fn delete(&self, stream_id: &str) -> Result<()> {
        self.cache.write().await.remove(stream_id);
        self.dirty.write().await.remove(stream_id);

        let pool = &self.pool;
        execute_with_retry("bookmark_delete", || async {
            sqlx::query("DELETE FROM bookmarks WHERE stream_id = ?")
                .bind(stream_id)
                .execute(pool)
                .await
        })
        .await?;

        info!(stream_id = %stream_id, "Deleted bookmark");
        Ok(())
    }

    /// All cached bookmarks, ordered by stream id.
    pub async fn get_all(&self) -> BTreeMap<String, Bookmark> {
        self.cache
            .read()
            .await
            .iter()
            .map(|(id, bookmark)| (id.clone(), bookmark.clone()))
            .collect()
    }

    /// All cached bookmarks as a [`BookmarkState`].
    pub async fn load_state(&self) -> BookmarkState {
        let mut state = BookmarkState::new();
        for (stream_id, bookmark) in self.get_all().await {
            state.insert(stream_id, bookmark);
        }
        state
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        let pool = &self.pool;

        execute_with_retry("bookmark_checkpoint", || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(pool)
                .await
        })
        .await?;

        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Close the connection pool gracefully.
    ///
    /// Flushes any dirty bookmarks and checkpoints WAL before closing.
    pub async fn close(&self) {
        if self.has_dirty().await {
            match self.flush_dirty().await {
                Ok(count) if count > 0 => info!(count, "Flushed dirty bookmarks on close"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to flush dirty bookmarks on close"),
            }
        }

        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!("Bookmark store closed");
    }
}
