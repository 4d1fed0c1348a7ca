//! Crawl summary types
//!
//! This module defines the data structure shared by the console statistics
//! view and the markdown report, and the errors of building them.

use crate::crawler::{CrawlResult, PartitionFailure};
use crate::partition::Partition;
use crate::sink::SinkError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("No crawl runs found in database")]
    NoRuns,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Progress of one partition as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub partition: Partition,

    /// Records in the sink from this partition
    pub records: u64,

    /// Last committed page, 0 if never started
    pub page_index: u32,

    pub completed: bool,
}

impl PartitionSummary {
    pub fn status(&self) -> &'static str {
        if self.completed {
            "completed"
        } else if self.page_index > 0 {
            "incomplete"
        } else {
            "not started"
        }
    }
}

/// Counters only known to the process that ran the crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub new_records: u64,
    pub duplicates: u64,
    pub anomalies: u64,
    pub pages: u64,
    pub cancelled: bool,
}

/// Summary of the latest run and the stored crawl state
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    // Run metadata
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    /// Distinct records in the sink
    pub total_records: u64,

    /// Partitions in traversal order
    pub partitions: Vec<PartitionSummary>,

    /// Failed partitions of the latest run
    pub failures: Vec<PartitionFailure>,

    pub counters: Option<RunCounters>,
}

impl CrawlSummary {
    /// Creates a new empty crawl summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the counters of a run that just finished
    pub fn with_result(mut self, result: &CrawlResult) -> Self {
        self.counters = Some(RunCounters {
            new_records: result.new_records,
            duplicates: result.duplicates,
            anomalies: result.anomalies,
            pages: result.pages,
            cancelled: result.cancelled,
        });
        self
    }

    pub fn completed_partitions(&self) -> usize {
        self.partitions.iter().filter(|p| p.completed).count()
    }

    /// Returns the share of partitions completed as a percentage
    pub fn completion_rate(&self) -> f64 {
        if self.partitions.is_empty() {
            return 0.0;
        }
        (self.completed_partitions() as f64 / self.partitions.len() as f64) * 100.0
    }
}
