// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Message sinks.
//!
//! The engine writes every message as one line and flushes right after,
//! so a downstream reader never sees a partial record. The sink is an
//! append-only, single-writer channel: the engine holds it by `&mut`.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Append-only line channel the engine emits messages to.
pub trait MessageSink: Send {
    /// Append one line. Implementations add the line terminator.
    fn write(&mut self, line: &str) -> io::Result<()>;

    /// Push buffered output downstream.
    fn flush(&mut self) -> io::Result<()>;
}

/// Writes lines to the process's standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn write(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

/// Captures lines in memory.
///
/// Clones share the same buffer, so a caller can keep a handle after
/// moving the sink into the engine.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
    flushes: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Lines parsed as JSON; lines that aren't JSON are skipped.
    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Messages whose `type` field equals `kind` (e.g. `"RECORD"`).
    pub fn messages_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.messages()
            .into_iter()
            .filter(|msg| msg.get("type").and_then(|t| t.as_str()) == Some(kind))
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
        self.flushes.store(0, Ordering::SeqCst);
    }
}

impl MessageSink for MemorySink {
    fn write(&mut self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?
            .push(line.to_string());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
