//! Crawler module for partition traversal and record extraction
//!
//! This module contains the core crawling logic, including:
//! - Listing page parsing into records
//! - Bounded retry with exponential backoff
//! - The per-partition pagination state machine
//! - Overall traversal coordination across renderer sessions

mod coordinator;
mod pagination;
mod parser;
mod record;
mod retry;

pub use coordinator::Coordinator;
pub use pagination::{PaginationController, PartitionOutcome};
pub use parser::{parse_records, ParseAnomaly, ParsedPage};
pub use record::{collapse_whitespace, natural_key, BandStatus, Record};
pub use retry::{Backoff, RetryPolicy};

use crate::partition::Partition;
use crate::{RenderError, RenderErrorKind};
use std::fmt;

/// Why a partition ended in the failed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// A renderer error that was not retryable or exhausted its retries
    Render(RenderErrorKind),

    /// The page ceiling was exceeded; "has more" detection is likely broken
    PaginationLoopSuspected,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Render(kind) => kind.as_str(),
            Self::PaginationLoopSuspected => "pagination_loop_suspected",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pagination_loop_suspected" => Some(Self::PaginationLoopSuspected),
            other => RenderErrorKind::from_db_string(other).map(Self::Render),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partition that could not be traversed to its last page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    pub partition: Partition,
    pub reason: FailureReason,
    pub message: String,

    /// Attempts made on the failing operation
    pub attempts: u32,

    /// Page the failure happened on
    pub page_index: u32,
}

impl PartitionFailure {
    pub fn from_render_error(partition: &Partition, error: RenderError) -> Self {
        Self {
            partition: partition.clone(),
            reason: FailureReason::Render(error.kind),
            message: error.reason,
            attempts: error.attempts,
            page_index: error.page_index,
        }
    }
}

impl fmt::Display for PartitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition {} page {}: {} after {} attempt(s): {}",
            self.partition, self.page_index, self.reason, self.attempts, self.message
        )
    }
}

/// Aggregate outcome of a crawl run
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub run_id: i64,

    /// Distinct records in the sink, including earlier runs
    pub total_records: u64,

    /// Records per partition, in traversal order
    pub per_partition_counts: Vec<(Partition, u64)>,

    pub failures: Vec<PartitionFailure>,

    /// Records written by this run
    pub new_records: u64,

    /// Records dropped as duplicates by this run
    pub duplicates: u64,

    /// Listing rows skipped by the parser
    pub anomalies: u64,

    /// Pages committed by this run
    pub pages: u64,

    /// Whether the run stopped on a cancellation signal
    pub cancelled: bool,
}

impl CrawlResult {
    pub fn count_for(&self, partition: &Partition) -> Option<u64> {
        self.per_partition_counts
            .iter()
            .find(|(p, _)| p == partition)
            .map(|(_, count)| *count)
    }

    /// Returns true if every partition reached its last page
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}
