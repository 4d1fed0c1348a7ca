//! Console output of crawl results and statistics
//!
//! This module prints the end-of-run result and the stored statistics view
//! used by `--stats`.

use crate::crawler::CrawlResult;
use crate::output::summary::CrawlSummary;

/// Prints the result of a finished run to stdout
///
/// # Arguments
///
/// * `result` - The aggregate result of the run
pub fn print_result(result: &CrawlResult) {
    println!("=== Crawl Result (run {}) ===\n", result.run_id);

    println!("Overview:");
    println!("  Total records: {}", result.total_records);
    println!("  New records this run: {}", result.new_records);
    println!("  Duplicates dropped: {}", result.duplicates);
    println!("  Skipped rows: {}", result.anomalies);
    println!("  Pages committed: {}", result.pages);
    if result.cancelled {
        println!("  Cancelled: yes (re-run to resume)");
    }
    println!();

    println!("Records per Partition:");
    for (partition, count) in &result.per_partition_counts {
        println!("  {:>4}: {}", partition.label(), count);
    }
    println!();

    if result.failures.is_empty() {
        println!("Failed partitions: none");
    } else {
        println!("Failed partitions: {}", result.failures.len());
        for failure in &result.failures {
            println!("  {}", failure);
        }
    }
}

/// Prints stored statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary of the latest run
pub fn print_statistics(summary: &CrawlSummary) {
    println!("=== Crawl Statistics ===\n");

    println!("Latest Run:");
    println!("  ID: {}", summary.run_id);
    println!("  Status: {}", summary.status);
    println!("  Started: {}", summary.started_at);
    if let Some(finished) = &summary.finished_at {
        println!("  Finished: {}", finished);
    }
    if let Some(duration) = summary.duration_seconds {
        println!("  Duration: {} seconds", duration);
    }
    println!();

    println!("Overview:");
    println!("  Total records: {}", summary.total_records);
    println!(
        "  Partitions completed: {}/{} ({:.1}%)",
        summary.completed_partitions(),
        summary.partitions.len(),
        summary.completion_rate()
    );
    println!();

    println!("Partitions:");
    for partition in &summary.partitions {
        println!(
            "  {:>4}: {:>7} records, page {:>5}, {}",
            partition.partition.label(),
            partition.records,
            partition.page_index,
            partition.status()
        );
    }

    if !summary.failures.is_empty() {
        println!();
        println!("Failures (latest run):");
        for failure in &summary.failures {
            println!("  {}", failure);
        }
    }
}
