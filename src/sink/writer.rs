//! Deduplicating sink writer
//!
//! The single owner of the seen-key set, the sequence counter and the
//! checkpoint store. Traversal workers share one writer behind a mutex.

use crate::crawler::{CrawlResult, PartitionFailure, Record};
use crate::partition::Partition;
use crate::sink::traits::{RecordSink, SinkRow};
use crate::state::CrawlState;
use crate::storage::{RunStatus, SqliteStorage, Storage};
use crate::{CrawlerError, Result};
use std::collections::{HashMap, HashSet};

/// Outcome of one `emit` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitSummary {
    /// Records appended to the sink
    pub written: u64,

    /// Records dropped because their key was already seen
    pub duplicates: u64,
}

/// Counters accumulated over a run
#[derive(Debug, Clone, Copy, Default)]
struct WriterStats {
    written: u64,
    duplicates: u64,
    anomalies: u64,
    pages: u64,
}

pub struct SinkWriter {
    sink: Box<dyn RecordSink>,
    storage: SqliteStorage,
    run_id: i64,

    /// Natural keys present in the sink
    seen: HashSet<String>,

    next_sequence: u64,

    /// Records in the sink per partition
    counts: HashMap<Partition, u64>,

    /// Checkpoints found at startup
    resumed: HashMap<Partition, CrawlState>,

    last_checkpoint: Option<CrawlState>,
    failures: Vec<PartitionFailure>,
    stats: WriterStats,
}

impl SinkWriter {
    /// Opens a writer and starts a new run
    ///
    /// # Arguments
    ///
    /// * `sink` - Where records go
    /// * `storage` - Run history and checkpoint store
    /// * `config_hash` - Hash recorded with the run
    /// * `resume` - Keep existing checkpoints and sink rows; when false both
    ///   are cleared
    pub fn open(
        mut sink: Box<dyn RecordSink>,
        mut storage: SqliteStorage,
        config_hash: &str,
        resume: bool,
    ) -> Result<Self> {
        if !resume {
            tracing::info!("Fresh run: clearing checkpoints and {}", sink.describe());
            storage.clear_checkpoints()?;
            sink.reset().map_err(|e| CrawlerError::SinkWrite {
                reason: e.to_string(),
                last_checkpoint: "none".to_string(),
            })?;
        }

        let existing = sink.load_existing().map_err(|e| CrawlerError::SinkWrite {
            reason: e.to_string(),
            last_checkpoint: "none".to_string(),
        })?;

        let resumed: HashMap<Partition, CrawlState> = storage
            .load_checkpoints()?
            .into_iter()
            .map(|record| (record.state.partition.clone(), record.state))
            .collect();

        // Prefer counts the sink can report over checkpoint counts, which
        // lag by at most one page after a crash
        let counts: HashMap<Partition, u64> = match existing.per_partition {
            Some(per_partition) => per_partition
                .into_iter()
                .filter_map(|(label, count)| Partition::new(label).ok().map(|p| (p, count)))
                .collect(),
            None => resumed
                .values()
                .map(|state| (state.partition.clone(), state.records_emitted))
                .collect(),
        };

        let run_id = storage.create_run(config_hash)?;

        tracing::info!(
            "Run {} writing to {} ({} existing records, {} checkpoints)",
            run_id,
            sink.describe(),
            existing.keys.len(),
            resumed.len()
        );

        Ok(Self {
            sink,
            storage,
            run_id,
            seen: existing.keys,
            next_sequence: existing.max_sequence + 1,
            counts,
            resumed,
            last_checkpoint: None,
            failures: Vec::new(),
            stats: WriterStats::default(),
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Number of distinct records in the sink
    pub fn total_records(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Records in the sink that came from `partition`
    pub fn count_for(&self, partition: &Partition) -> u64 {
        self.counts.get(partition).copied().unwrap_or(0)
    }

    /// Returns true if a previous run finished this partition
    pub fn is_completed(&self, partition: &Partition) -> bool {
        self.resumed
            .get(partition)
            .map(|state| state.completed)
            .unwrap_or(false)
    }

    /// State a traversal of `partition` starts from
    ///
    /// Incomplete partitions restart from their first page; the records they
    /// already contributed stay counted.
    pub fn start_state(&self, partition: &Partition) -> CrawlState {
        let mut state = match self.resumed.get(partition) {
            Some(state) if state.completed => state.clone(),
            Some(state) => state.restart(),
            None => CrawlState::new(partition.clone()),
        };
        state.records_emitted = self.count_for(partition);
        state
    }

    /// Writes the records whose natural key has not been seen yet
    ///
    /// Keys are added to the seen-set only after the sink accepted the
    /// batch, so a failed write never hides a record from a later retry.
    pub fn emit(&mut self, records: &[Record]) -> Result<EmitSummary> {
        let mut rows = Vec::with_capacity(records.len());
        let mut batch_keys = HashSet::new();
        let mut summary = EmitSummary::default();

        for record in records {
            let key = record.natural_key();
            if self.seen.contains(&key) || !batch_keys.insert(key.clone()) {
                tracing::debug!(
                    "Duplicate '{}' on partition {} page {}",
                    record.name,
                    record.source_partition,
                    record.source_page
                );
                summary.duplicates += 1;
                continue;
            }

            rows.push((
                record.source_partition.clone(),
                SinkRow {
                    sequence_id: self.next_sequence + rows.len() as u64,
                    band_name: record.name.clone(),
                    country: record.country.clone(),
                    genre: record.genre.clone(),
                    status: record.status_label().to_string(),
                    natural_key: key,
                    source_partition: record.source_partition.label().to_string(),
                    source_page: record.source_page,
                },
            ));
        }

        let batch: Vec<SinkRow> = rows.iter().map(|(_, row)| row.clone()).collect();
        self.sink.append(&batch).map_err(|e| CrawlerError::SinkWrite {
            reason: e.to_string(),
            last_checkpoint: self.describe_last_checkpoint(),
        })?;

        for (partition, row) in rows {
            self.seen.insert(row.natural_key);
            *self.counts.entry(partition).or_insert(0) += 1;
        }
        self.next_sequence += batch.len() as u64;

        summary.written = batch.len() as u64;
        self.stats.written += summary.written;
        self.stats.duplicates += summary.duplicates;
        self.stats.pages += 1;

        Ok(summary)
    }

    /// Counts rows the page parser skipped
    pub fn record_anomalies(&mut self, count: usize) {
        self.stats.anomalies += count as u64;
    }

    /// Persists the progress of a partition
    pub fn checkpoint(&mut self, state: &CrawlState) -> Result<()> {
        self.storage
            .save_checkpoint(self.run_id, state)
            .map_err(|e| CrawlerError::SinkWrite {
                reason: format!("checkpoint of partition {}: {}", state.partition, e),
                last_checkpoint: self.describe_last_checkpoint(),
            })?;

        tracing::trace!("Checkpoint: {}", state.describe());
        self.last_checkpoint = Some(state.clone());
        Ok(())
    }

    /// Records a partition that ended in the failed state
    pub fn record_failure(&mut self, failure: PartitionFailure) -> Result<()> {
        self.storage.record_failure(self.run_id, &failure)?;
        self.failures.push(failure);
        Ok(())
    }

    /// Description of the last persisted checkpoint, for fatal error reports
    pub fn describe_last_checkpoint(&self) -> String {
        self.last_checkpoint
            .as_ref()
            .map(CrawlState::describe)
            .unwrap_or_else(|| "none".to_string())
    }

    /// Closes the run and builds the aggregate result
    ///
    /// # Arguments
    ///
    /// * `partitions` - The traversal order, used for per-partition counts
    /// * `cancelled` - Whether the run stopped on a cancellation signal
    pub fn finalize(&mut self, partitions: &[Partition], cancelled: bool) -> Result<CrawlResult> {
        let status = if cancelled {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.storage.finish_run(self.run_id, status)?;

        let mut failures = self.failures.clone();
        failures.sort_by_key(|failure| {
            partitions
                .iter()
                .position(|p| *p == failure.partition)
                .unwrap_or(usize::MAX)
        });

        Ok(CrawlResult {
            run_id: self.run_id,
            total_records: self.total_records(),
            per_partition_counts: partitions
                .iter()
                .map(|p| (p.clone(), self.count_for(p)))
                .collect(),
            failures,
            new_records: self.stats.written,
            duplicates: self.stats.duplicates,
            anomalies: self.stats.anomalies,
            pages: self.stats.pages,
            cancelled,
        })
    }

    /// Marks the run failed after a fatal error
    pub fn abort(&mut self) -> Result<()> {
        self.storage.finish_run(self.run_id, RunStatus::Failed)?;
        Ok(())
    }
}
