//! Record sinks and the deduplicating writer
//!
//! - `RecordSink`: append-only durable record store
//! - `SqliteSink` / `CsvSink`: the two stores
//! - `SinkWriter`: dedup, sequence ids, checkpoints and the final result

mod csv_sink;
mod sqlite_sink;
mod traits;
mod writer;

pub use csv_sink::{CsvSink, CSV_HEADER};
pub use sqlite_sink::SqliteSink;
pub use traits::{ExistingRecords, RecordSink, SinkError, SinkResult, SinkRow};
pub use writer::{EmitSummary, SinkWriter};

use crate::config::OutputConfig;
use std::path::Path;

/// Opens the sink selected by the output configuration
///
/// A CSV path selects the CSV sink; otherwise records go to the `bands`
/// table of the crawl database.
pub fn open_sink(output: &OutputConfig) -> SinkResult<Box<dyn RecordSink>> {
    match &output.csv_path {
        Some(csv_path) => Ok(Box::new(CsvSink::open(Path::new(csv_path))?)),
        None => Ok(Box::new(SqliteSink::open(Path::new(&output.database_path))?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sink_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("crawl.db");
        let csv = dir.path().join("bands.csv");

        let mut output = OutputConfig {
            database_path: db.to_string_lossy().to_string(),
            csv_path: None,
            summary_path: None,
        };
        assert!(open_sink(&output).unwrap().describe().starts_with("sqlite:"));

        output.csv_path = Some(csv.to_string_lossy().to_string());
        assert!(open_sink(&output).unwrap().describe().starts_with("csv:"));
    }
}
