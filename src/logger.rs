//! Injected logging capability.
//!
//! Resources never talk to a global logger. Each one receives a [`Log`]
//! handle at construction and emits exactly one line per skip-vs-act
//! decision and per operation outcome, so a test harness can capture the
//! stream and assert on which branch ran.
//!
//! [`StdLog`] forwards to the `log` facade, so an embedding agent keeps
//! whatever backend it already installed. [`MemoryLog`] buffers entries in
//! memory for inspection; unit tests throughout this crate use it.

use std::fmt;
use std::sync::{Arc, Mutex};

pub use log::Level;

/// A leveled message sink.
///
/// Implement this to route resource logs somewhere custom. Sinks must be
/// thread-safe: the command resource forwards child output from drain
/// threads.
pub trait LogSink: Send + Sync {
    /// Write a single log entry.
    fn write(&self, level: Level, message: &str);
}

/// Cheap cloneable handle to a [`LogSink`].
///
/// Clone one of these into every resource that needs to report decisions.
#[derive(Clone)]
pub struct Log {
    sink: Arc<dyn LogSink>,
}

impl Log {
    /// Wrap a sink in a handle.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// A handle that forwards to the `log` facade.
    pub fn standard() -> Self {
        Self::new(Arc::new(StdLog))
    }

    /// Log a skip-vs-act decision or other diagnostic detail.
    pub fn debug(&self, message: impl fmt::Display) {
        self.sink.write(Level::Debug, &message.to_string());
    }

    /// Log an operation that actually changed the host.
    pub fn info(&self, message: impl fmt::Display) {
        self.sink.write(Level::Info, &message.to_string());
    }

    /// Log a tolerated irregularity.
    pub fn warn(&self, message: impl fmt::Display) {
        self.sink.write(Level::Warn, &message.to_string());
    }

    /// Log a failed operation.
    pub fn error(&self, message: impl fmt::Display) {
        self.sink.write(Level::Error, &message.to_string());
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Log")
    }
}

/// Sink that forwards to the `log` crate facade.
pub struct StdLog;

impl LogSink for StdLog {
    fn write(&self, level: Level, message: &str) {
        log::log!(level, "{message}");
    }
}

/// Sink that buffers entries in memory.
///
/// Share the `Arc` between the [`Log`] handle and the test so captured
/// entries can be inspected after the resource runs.
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryLog {
    /// Create an empty buffer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all captured entries, in arrival order.
    pub fn entries(&self) -> Vec<(Level, String)> {
        match self.entries.lock() {
            Ok(locked) => locked.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any captured entry contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|(_, m)| m.contains(needle))
    }

    /// Number of captured entries at `level`.
    pub fn count_at(&self, level: Level) -> usize {
        self.entries().iter().filter(|(l, _)| *l == level).count()
    }
}

impl LogSink for MemoryLog {
    fn write(&self, level: Level, message: &str) {
        match self.entries.lock() {
            Ok(mut locked) => locked.push((level, message.to_string())),
            Err(poisoned) => poisoned.into_inner().push((level, message.to_string())),
        }
    }
}
