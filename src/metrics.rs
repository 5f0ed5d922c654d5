//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Run modes and engine state
//! - Records written and streams synced
//! - Discovery, counting and sampling
//! - Bookmark persistence
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use stream_replication::metrics;
//! use std::time::Duration;
//!
//! // After a stream's write pass
//! metrics::record_stream_synced("orders", "INCREMENTAL", 42, Duration::from_millis(50));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record which mode a `process()` call ran in.
pub fn record_run_mode(mode: &str) {
    counter!("replication_runs_total", "mode" => mode.to_string()).increment(1);
}

/// Gauge for engine state.
pub fn set_engine_state(state: &str) {
    // Numeric encoding for alerting
    let value = match state {
        "Idle" => 0.0,
        "TestingConnection" => 1.0,
        "Discovering" => 2.0,
        "DiscoveringStreams" => 3.0,
        "LoadingSample" => 4.0,
        "CountingRecords" => 5.0,
        "Syncing" => 6.0,
        "Done" => 7.0,
        "Failed" => 8.0,
        _ => -1.0,
    };
    gauge!("replication_engine_state").set(value);
}

/// Record the outcome of a connection test.
pub fn record_connection_test(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replication_connection_tests_total", "status" => status).increment(1);
}

/// Record records emitted for a stream.
pub fn record_records_written(stream_id: &str, count: usize) {
    counter!("replication_records_written_total", "stream_id" => stream_id.to_string())
        .increment(count as u64);
}

/// Record a completed stream sync.
pub fn record_stream_synced(stream_id: &str, method: &str, records: usize, duration: Duration) {
    counter!(
        "replication_streams_synced_total",
        "stream_id" => stream_id.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
    histogram!("replication_stream_sync_duration_seconds", "stream_id" => stream_id.to_string())
        .record(duration.as_secs_f64());
    histogram!("replication_stream_sync_records").record(records as f64);
}

/// Record streams found by discovery.
pub fn record_streams_discovered(count: usize, duration: Duration) {
    gauge!("replication_discovered_streams").set(count as f64);
    histogram!("replication_discovery_duration_seconds").record(duration.as_secs_f64());
}

/// Record a count-mode result for a stream.
pub fn record_stream_count(stream_id: &str, count: u64) {
    gauge!("replication_stream_record_count", "stream_id" => stream_id.to_string())
        .set(count as f64);
}

/// Record rows returned by a sample preview.
pub fn record_sample_rows(stream_id: &str, rows: usize) {
    counter!("replication_sample_rows_total", "stream_id" => stream_id.to_string())
        .increment(rows as u64);
}

/// Record bookmark flush batch (debounced writes).
pub fn record_bookmark_flush(flushed: usize, errors: usize) {
    counter!("replication_bookmark_flushes_total").increment(1);
    counter!("replication_bookmark_flushed_count").increment(flushed as u64);
    if errors > 0 {
        counter!("replication_bookmark_flush_errors_total").increment(errors as u64);
    }
}

/// Record bookmark SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn bookmark_retries_total(operation: &str) {
    counter!("replication_bookmark_retries_total", "operation" => operation.to_string())
        .increment(1);
}

/// Record errors by type.
///
/// `scope` is a stream id, or the run mode for errors outside any stream.
pub fn record_error(scope: &str, error_type: &str) {
    counter!(
        "replication_errors_total",
        "scope" => scope.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}
