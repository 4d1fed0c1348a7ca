//! Output module for generating crawl summaries and reports
//!
//! This module handles:
//! - Building a summary of the latest run from the database and the sink
//! - Printing the end-of-run result and the stored statistics
//! - Writing the markdown report

mod markdown;
pub mod stats;
mod summary;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{print_result, print_statistics};
pub use summary::{CrawlSummary, OutputError, OutputResult, PartitionSummary, RunCounters};

use crate::partition::Partition;
use crate::sink::RecordSink;
use crate::storage::Storage;
use std::collections::HashMap;

/// Generates a crawl summary from storage and the record sink
///
/// # Arguments
///
/// * `storage` - The storage backend containing run history and checkpoints
/// * `sink` - The record sink, for record counts
/// * `partitions` - The configured traversal order
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Successfully generated summary
/// * `Err(OutputError)` - No run recorded yet, or a read failed
pub fn generate_summary(
    storage: &dyn Storage,
    sink: &mut dyn RecordSink,
    partitions: &[Partition],
) -> OutputResult<CrawlSummary> {
    let run = storage.get_latest_run()?.ok_or(OutputError::NoRuns)?;

    let duration_seconds = match (
        run.started_at.parse::<chrono::DateTime<chrono::Utc>>(),
        run.finished_at
            .as_deref()
            .map(|s| s.parse::<chrono::DateTime<chrono::Utc>>()),
    ) {
        (Ok(started), Some(Ok(finished))) => Some((finished - started).num_seconds().max(0) as u64),
        _ => None,
    };

    let existing = sink.load_existing()?;
    let checkpoints: HashMap<Partition, _> = storage
        .load_checkpoints()?
        .into_iter()
        .map(|record| (record.state.partition.clone(), record.state))
        .collect();

    let partitions = partitions
        .iter()
        .map(|partition| {
            let checkpoint = checkpoints.get(partition);
            let records = match &existing.per_partition {
                Some(counts) => counts.get(partition.label()).copied().unwrap_or(0),
                None => checkpoint.map(|state| state.records_emitted).unwrap_or(0),
            };
            PartitionSummary {
                partition: partition.clone(),
                records,
                page_index: checkpoint.map(|state| state.page_index).unwrap_or(0),
                completed: checkpoint.map(|state| state.completed).unwrap_or(false),
            }
        })
        .collect();

    let failures = storage.get_failures(run.id)?;

    Ok(CrawlSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        total_records: existing.keys.len() as u64,
        partitions,
        failures,
        counters: None,
    })
}
