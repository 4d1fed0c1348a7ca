//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including record counts, partition progress, and failures.

use crate::output::summary::{CrawlSummary, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Generates a markdown summary file
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
///
/// # Arguments
///
/// * `summary` - The crawl summary data
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Metallum Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Total Records**: {}\n", summary.total_records));
    md.push_str(&format!(
        "- **Partitions Completed**: {}/{} ({:.2}%)\n",
        summary.completed_partitions(),
        summary.partitions.len(),
        summary.completion_rate()
    ));
    if let Some(counters) = &summary.counters {
        md.push_str(&format!("- **New Records**: {}\n", counters.new_records));
        md.push_str(&format!("- **Duplicates Dropped**: {}\n", counters.duplicates));
        md.push_str(&format!("- **Skipped Rows**: {}\n", counters.anomalies));
        md.push_str(&format!("- **Pages Committed**: {}\n", counters.pages));
        if counters.cancelled {
            md.push_str("- **Cancelled**: yes\n");
        }
    }
    md.push('\n');

    // Partition breakdown
    md.push_str("## Partitions\n\n");
    md.push_str("| Partition | Records | Last Page | Status |\n");
    md.push_str("|-----------|---------|-----------|--------|\n");
    for partition in &summary.partitions {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            partition.partition.label(),
            partition.records,
            partition.page_index,
            partition.status()
        ));
    }
    md.push('\n');

    // Failures
    if !summary.failures.is_empty() {
        md.push_str("## Failed Partitions\n\n");
        md.push_str(&format!("Total: {}\n\n", summary.failures.len()));
        md.push_str("| Partition | Page | Reason | Attempts | Message |\n");
        md.push_str("|-----------|------|--------|----------|---------|\n");
        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                failure.partition.label(),
                failure.page_index,
                failure.reason,
                failure.attempts,
                failure.message.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}
