//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::{FailureReason, PartitionFailure};
use crate::partition::Partition;
use crate::state::CrawlState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CheckpointRecord, RunRecord, RunStatus};
use crate::CrawlerError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlerError> {
        let conn = Connection::open(path)?;

        // Checkpoints must survive a crash, so keep full synchronous writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn parse_partition(label: &str) -> StorageResult<Partition> {
    Partition::new(label)
        .map_err(|e| StorageError::InvalidData(format!("partition '{}': {}", label, e)))
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Checkpoints =====

    fn load_checkpoints(&self) -> StorageResult<Vec<CheckpointRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT partition, page_index, records_emitted, completed, run_id, updated_at
             FROM partition_checkpoints ORDER BY partition",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(label, page_index, records_emitted, completed, run_id, updated_at)| {
                    Ok(CheckpointRecord {
                        state: CrawlState {
                            partition: parse_partition(&label)?,
                            page_index,
                            records_emitted: records_emitted.max(0) as u64,
                            completed,
                        },
                        run_id,
                        updated_at,
                    })
                },
            )
            .collect()
    }

    fn save_checkpoint(&mut self, run_id: i64, state: &CrawlState) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO partition_checkpoints
             (partition, page_index, records_emitted, completed, run_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                state.partition.label(),
                state.page_index,
                state.records_emitted as i64,
                state.completed,
                run_id,
                now
            ],
        )?;
        Ok(())
    }

    fn clear_checkpoints(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM partition_checkpoints", [])?;
        Ok(())
    }

    // ===== Failures =====

    fn record_failure(&mut self, run_id: i64, failure: &PartitionFailure) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO partition_failures
             (run_id, partition, reason, message, attempts, page_index, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                failure.partition.label(),
                failure.reason.as_str(),
                failure.message,
                failure.attempts,
                failure.page_index,
                now
            ],
        )?;
        Ok(())
    }

    fn get_failures(&self, run_id: i64) -> StorageResult<Vec<PartitionFailure>> {
        let mut stmt = self.conn.prepare(
            "SELECT partition, reason, message, attempts, page_index
             FROM partition_failures WHERE run_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(label, reason, message, attempts, page_index)| {
                let reason = FailureReason::from_db_string(&reason).ok_or_else(|| {
                    StorageError::InvalidData(format!("failure reason '{}'", reason))
                })?;
                Ok(PartitionFailure {
                    partition: parse_partition(&label)?,
                    reason,
                    message,
                    attempts,
                    page_index,
                })
            })
            .collect()
    }
}
