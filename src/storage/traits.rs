//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::PartitionFailure;
use crate::state::CrawlState;
use crate::storage::{CheckpointRecord, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines the run history and checkpoint operations needed by
/// the crawler. Access is serialized by the caller.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status of a run with a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Checkpoints =====

    /// Loads every stored partition checkpoint
    fn load_checkpoints(&self) -> StorageResult<Vec<CheckpointRecord>>;

    /// Inserts or replaces the checkpoint of a partition
    ///
    /// Durable once this returns.
    fn save_checkpoint(&mut self, run_id: i64, state: &CrawlState) -> StorageResult<()>;

    /// Deletes all checkpoints
    fn clear_checkpoints(&mut self) -> StorageResult<()>;

    // ===== Failures =====

    /// Records a failed partition for a run
    fn record_failure(&mut self, run_id: i64, failure: &PartitionFailure) -> StorageResult<()>;

    /// Gets the failed partitions of a run, in the order they were recorded
    fn get_failures(&self, run_id: i64) -> StorageResult<Vec<PartitionFailure>>;
}
