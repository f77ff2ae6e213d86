//! # Operation Log
//!
//! Bounded, categorized history of function calls and memory operations.
//!
//! Each category has its own fixed-capacity ring buffer. When a buffer is
//! full the oldest entry is evicted before the new one is appended. Capacity
//! and the per-category switches come from the log's [`DebugSettings`];
//! switching a category off stops new records but never purges old ones.
//!
//! The log is shared between the console thread and whatever completes a
//! context-switched call, so all state sits behind one mutex.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::settings::{DebugConfigUpdate, DebugSettings};
use crate::types::{Address, TypeToken};

/// Which ring buffer an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory
{
    /// Function invocations
    Call,
    /// Memory reads and writes
    Memory,
}

/// Execution context a call ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadType
{
    /// On the caller's own thread
    Direct,
    /// On a freshly spawned thread whose entry point is the function itself
    ContextSwitched,
}

impl fmt::Display for ThreadType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ThreadType::Direct => f.write_str("direct"),
            ThreadType::ContextSwitched => f.write_str("context-switched"),
        }
    }
}

/// Raw fields of a call record.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord
{
    /// Registered function name
    pub function: String,
    /// Address that was called
    pub address: Address,
    /// Rendered argument values, when parameter logging is on
    pub arguments: Option<Vec<String>>,
    /// Rendered return value, when return value logging is on and the call returned
    pub return_value: Option<String>,
    /// Execution context
    pub thread_type: ThreadType,
    /// Failure description, if the call failed
    pub error: Option<String>,
}

/// Kind of memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOperation
{
    /// Copy from the address into a buffer
    Read,
    /// Copy from a buffer to the address
    Write,
}

impl fmt::Display for MemoryOperation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            MemoryOperation::Read => f.write_str("read"),
            MemoryOperation::Write => f.write_str("write"),
        }
    }
}

/// Raw fields of a memory record.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord
{
    /// Read or write
    pub operation: MemoryOperation,
    /// Start address
    pub address: Address,
    /// Requested size in bytes
    pub size: usize,
    /// Bytes actually transferred
    pub transferred: usize,
    /// Element type of a read
    pub type_token: Option<TypeToken>,
    /// Failure description, if the operation failed
    pub error: Option<String>,
}

/// Category-specific part of a [`LogEntry`].
#[derive(Debug, Clone, PartialEq)]
pub enum LogDetail
{
    /// A function call
    Call(CallRecord),
    /// A memory operation
    Memory(MemoryRecord),
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry
{
    /// When the operation finished
    pub timestamp: DateTime<Utc>,
    /// One-line human readable description
    pub summary: String,
    /// Whether the operation succeeded
    pub success: bool,
    /// Wall-clock duration, when measured
    pub duration_ms: Option<f64>,
    /// Category-specific fields
    pub detail: LogDetail,
}

impl LogEntry
{
    /// Build a call entry stamped with the current time.
    #[must_use]
    pub fn call(summary: String, success: bool, duration_ms: Option<f64>, record: CallRecord) -> Self
    {
        Self {
            timestamp: Utc::now(),
            summary,
            success,
            duration_ms,
            detail: LogDetail::Call(record),
        }
    }

    /// Build a memory entry stamped with the current time.
    #[must_use]
    pub fn memory(summary: String, success: bool, duration_ms: Option<f64>, record: MemoryRecord) -> Self
    {
        Self {
            timestamp: Utc::now(),
            summary,
            success,
            duration_ms,
            detail: LogDetail::Memory(record),
        }
    }

    /// The ring buffer this entry belongs to.
    #[must_use]
    pub fn category(&self) -> LogCategory
    {
        match self.detail {
            LogDetail::Call(_) => LogCategory::Call,
            LogDetail::Memory(_) => LogCategory::Memory,
        }
    }
}

impl fmt::Display for LogEntry
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let status = if self.success { "OK  " } else { "FAIL" };
        write!(f, "[{}] {status} {}", self.timestamp.format("%H:%M:%S%.3f"), self.summary)?;
        if let Some(ms) = self.duration_ms {
            write!(f, " ({ms:.3} ms)")?;
        }
        Ok(())
    }
}

/// Fixed-capacity FIFO of log entries.
#[derive(Debug)]
struct RingBuffer
{
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl RingBuffer
{
    fn new(capacity: usize) -> Self
    {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn push(&mut self, entry: LogEntry)
    {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn set_capacity(&mut self, capacity: usize)
    {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    fn recent(&self, k: usize) -> Vec<LogEntry>
    {
        let skip = self.entries.len().saturating_sub(k);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[derive(Debug)]
struct LogState
{
    settings: DebugSettings,
    calls: RingBuffer,
    memory: RingBuffer,
}

impl LogState
{
    fn buffer(&self, category: LogCategory) -> &RingBuffer
    {
        match category {
            LogCategory::Call => &self.calls,
            LogCategory::Memory => &self.memory,
        }
    }

    fn accepts(&self, category: LogCategory) -> bool
    {
        self.settings.enabled
            && match category {
                LogCategory::Call => self.settings.log_calls,
                LogCategory::Memory => self.settings.log_memory_ops,
            }
    }
}

/// Thread-safe store of recent operations, one ring buffer per category.
///
/// ## Example
///
/// ```rust
/// use callgate_core::oplog::{LogCategory, OperationLog};
/// use callgate_core::settings::DebugSettings;
///
/// let log = OperationLog::new(DebugSettings::default());
/// assert!(log.recent(LogCategory::Call, 10).is_empty());
/// ```
#[derive(Debug)]
pub struct OperationLog
{
    state: Mutex<LogState>,
}

impl OperationLog
{
    /// Create an empty log governed by `settings`.
    #[must_use]
    pub fn new(mut settings: DebugSettings) -> Self
    {
        settings.max_log_entries = settings.max_log_entries.max(1);
        Self {
            state: Mutex::new(LogState {
                settings,
                calls: RingBuffer::new(settings.max_log_entries),
                memory: RingBuffer::new(settings.max_log_entries),
            }),
        }
    }

    /// Append `entry` to its category's buffer, evicting the oldest entry if full.
    ///
    /// Returns `false` when the settings suppress the category and nothing
    /// was recorded.
    pub fn record(&self, entry: LogEntry) -> bool
    {
        let category = entry.category();
        let mut state = self.state.lock();
        if !state.accepts(category) {
            return false;
        }
        match category {
            LogCategory::Call => state.calls.push(entry),
            LogCategory::Memory => state.memory.push(entry),
        }
        true
    }

    /// The `k` most recent entries of `category`, oldest first.
    pub fn recent(&self, category: LogCategory, k: usize) -> Vec<LogEntry>
    {
        self.state.lock().buffer(category).recent(k)
    }

    /// Number of entries currently held for `category`.
    pub fn len(&self, category: LogCategory) -> usize
    {
        self.state.lock().buffer(category).entries.len()
    }

    /// Empty both ring buffers.
    pub fn clear(&self)
    {
        let mut state = self.state.lock();
        state.calls.entries.clear();
        state.memory.entries.clear();
        debug!("Cleared operation log");
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> DebugSettings
    {
        self.state.lock().settings
    }

    /// Apply a settings update and return the resulting settings.
    ///
    /// Lowering the capacity evicts the oldest entries right away.
    pub fn configure(&self, update: &DebugConfigUpdate) -> DebugSettings
    {
        let mut state = self.state.lock();
        state.settings.apply(update);
        let capacity = state.settings.max_log_entries;
        state.calls.set_capacity(capacity);
        state.memory.set_capacity(capacity);
        debug!(settings = ?state.settings, "Updated debug settings");
        state.settings
    }

    /// Turn all recording on or off.
    pub fn set_enabled(&self, enabled: bool) -> DebugSettings
    {
        self.configure(&DebugConfigUpdate {
            enabled: Some(enabled),
            ..DebugConfigUpdate::default()
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn memory_entry(size: usize) -> LogEntry
    {
        LogEntry::memory(
            format!("read {size}"),
            true,
            None,
            MemoryRecord {
                operation: MemoryOperation::Read,
                address: Address::new(0x1000),
                size,
                transferred: size,
                type_token: None,
                error: None,
            },
        )
    }

    #[test]
    fn test_ring_buffer_evicts_oldest()
    {
        let mut ring = RingBuffer::new(2);
        for size in 1..=3 {
            ring.push(memory_entry(size));
        }
        let sizes: Vec<_> = ring.recent(5).iter().map(|e| e.summary.clone()).collect();
        assert_eq!(sizes, vec!["read 2", "read 3"]);
    }

    #[test]
    fn test_shrinking_capacity_evicts()
    {
        let mut ring = RingBuffer::new(5);
        for size in 1..=5 {
            ring.push(memory_entry(size));
        }
        ring.set_capacity(2);
        assert_eq!(ring.entries.len(), 2);
        assert_eq!(ring.recent(1)[0].summary, "read 5");
    }

    #[test]
    fn test_zero_capacity_is_clamped_in_settings()
    {
        let log = OperationLog::new(DebugSettings {
            max_log_entries: 0,
            ..DebugSettings::default()
        });
        assert_eq!(log.settings().max_log_entries, 1);

        log.record(memory_entry(1));
        log.record(memory_entry(2));
        assert_eq!(log.len(LogCategory::Memory), 1);
    }

    #[test]
    fn test_display_format()
    {
        let mut entry = memory_entry(4);
        entry.duration_ms = Some(1.5);
        let line = entry.to_string();
        assert!(line.contains("OK"));
        assert!(line.ends_with("read 4 (1.500 ms)"));
    }
}
