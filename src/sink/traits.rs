//! Record sink traits and types
//!
//! This module defines the trait interface for durable record sinks and the
//! row type written to them.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors that can occur while reading or writing a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Existing sink content is unreadable: {0}")]
    Corrupt(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// One deduplicated record as written to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRow {
    /// Position in emission order, starting at 1
    pub sequence_id: u64,
    pub band_name: String,
    pub country: String,
    pub genre: String,
    pub status: String,

    /// Normalized band name used for deduplication
    pub natural_key: String,

    pub source_partition: String,
    pub source_page: u32,
}

/// What a sink already holds when a run starts
#[derive(Debug, Clone, Default)]
pub struct ExistingRecords {
    /// Natural keys of every stored row
    pub keys: HashSet<String>,

    /// Highest stored sequence id, 0 when empty
    pub max_sequence: u64,

    /// Stored rows per partition label, if the sink records the partition
    pub per_partition: Option<HashMap<String, u64>>,
}

/// Trait for append-only record sinks
///
/// A sink never rewrites or removes rows outside of `reset`.
pub trait RecordSink: Send {
    /// Reads the keys and sequence high-water mark of stored rows
    fn load_existing(&mut self) -> SinkResult<ExistingRecords>;

    /// Appends a batch of rows
    ///
    /// The batch is durable once this returns `Ok`.
    fn append(&mut self, rows: &[SinkRow]) -> SinkResult<()>;

    /// Removes every stored row
    fn reset(&mut self) -> SinkResult<()>;

    /// Short description for logs, e.g. the file path
    fn describe(&self) -> String;
}
