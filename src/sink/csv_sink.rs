//! CSV record sink
//!
//! Writes `sequence_id,band_name,country,genre,status` rows with RFC 4180
//! quoting. Every batch is flushed and synced before `append` returns. The
//! file carries no partition column, so per-partition counts come from
//! checkpoints instead.

use crate::crawler::natural_key;
use crate::sink::traits::{ExistingRecords, RecordSink, SinkError, SinkResult, SinkRow};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem::take;
use std::path::{Path, PathBuf};

/// Column names of the output file
pub const CSV_HEADER: [&str; 5] = ["sequence_id", "band_name", "country", "genre", "status"];

/// Record sink backed by a CSV file
pub struct CsvSink {
    path: PathBuf,
    file: File,
}

impl CsvSink {
    /// Opens `path` for appending, writing the header if the file is new
    ///
    /// A row left without its CRLF terminator by an interrupted write is cut
    /// off, so the file always ends on a complete row.
    pub fn open(path: &Path) -> SinkResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        truncate_partial_row(&mut file, path)?;

        if file.metadata()?.len() == 0 {
            write_header(&mut file)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

impl RecordSink for CsvSink {
    fn load_existing(&mut self) -> SinkResult<ExistingRecords> {
        let text = std::fs::read_to_string(&self.path)?;
        let mut rows = parse_rows(&text).into_iter();
        let mut existing = ExistingRecords::default();

        match rows.next() {
            None => return Ok(existing),
            Some(header) if header == CSV_HEADER => {}
            Some(header) => {
                return Err(SinkError::Corrupt(format!(
                    "{}: unexpected header {:?}",
                    self.path.display(),
                    header
                )))
            }
        }

        for (index, row) in rows.enumerate() {
            let line = index + 2;
            if row.len() != CSV_HEADER.len() {
                return Err(SinkError::Corrupt(format!(
                    "{} line {}: {} columns, expected {}",
                    self.path.display(),
                    line,
                    row.len(),
                    CSV_HEADER.len()
                )));
            }

            let sequence_id: u64 = row[0].parse().map_err(|_| {
                SinkError::Corrupt(format!(
                    "{} line {}: invalid sequence id '{}'",
                    self.path.display(),
                    line,
                    row[0]
                ))
            })?;

            existing.keys.insert(natural_key(&row[1]));
            existing.max_sequence = existing.max_sequence.max(sequence_id);
        }

        Ok(existing)
    }

    fn append(&mut self, rows: &[SinkRow]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        // One write per batch keeps a crash from splitting it mid-row
        let mut buffer = Vec::new();
        for row in rows {
            let sequence_id = row.sequence_id.to_string();
            write_row(
                &mut buffer,
                &[
                    sequence_id.as_str(),
                    row.band_name.as_str(),
                    row.country.as_str(),
                    row.genre.as_str(),
                    row.status.as_str(),
                ],
            )?;
        }

        self.file.write_all(&buffer)?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn reset(&mut self) -> SinkResult<()> {
        self.file.set_len(0)?;
        write_header(&mut self.file)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

fn write_header(file: &mut File) -> io::Result<()> {
    let mut buffer = Vec::new();
    write_row(&mut buffer, &CSV_HEADER)?;
    file.write_all(&buffer)?;
    file.sync_data()
}

/// Drops any bytes after the last CRLF terminator
fn truncate_partial_row(file: &mut File, path: &Path) -> io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut bytes = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    if bytes.ends_with(b"\r\n") {
        return Ok(());
    }

    let keep = bytes
        .windows(2)
        .rposition(|pair| pair == b"\r\n")
        .map_or(0, |at| at + 2);
    tracing::warn!(
        "{}: dropping {} bytes of an unterminated trailing row",
        path.display(),
        bytes.len() - keep
    );
    file.set_len(keep as u64)?;
    file.sync_data()
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one CSV row terminated by CRLF
fn write_row<W: Write>(mut w: W, row: &[&str]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}

/// Parses CSV text into rows, honouring quoted fields and CRLF
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => row.push(take(&mut field)),
            '\r' | '\n' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sequence_id: u64, name: &str, genre: &str) -> SinkRow {
        SinkRow {
            sequence_id,
            band_name: name.to_string(),
            country: "Sweden".to_string(),
            genre: genre.to_string(),
            status: "Active".to_string(),
            natural_key: natural_key(name),
            source_partition: "A".to_string(),
            source_page: 1,
        }
    }

    #[test]
    fn test_write_row_quoting() {
        let mut out = Vec::new();
        write_row(&mut out, &["1", "Plain", "Has, comma", "Has \"quote\"", "Multi\nline"]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1,Plain,\"Has, comma\",\"Has \"\"quote\"\"\",\"Multi\nline\"\r\n"
        );
    }

    #[test]
    fn test_parse_rows_handles_quotes() {
        let rows = parse_rows("a,\"b, c\",\"d \"\"e\"\"\"\r\n1,2,3\r\n");
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b, c".to_string(), "d \"e\"".to_string()],
                vec!["1".to_string(), "2".to_string(), "3".to_string()],
            ]
        );
    }

    #[test]
    fn test_new_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        CsvSink::open(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "sequence_id,band_name,country,genre,status\r\n");
    }

    #[test]
    fn test_append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");

        {
            let mut sink = CsvSink::open(&path).unwrap();
            sink.append(&[
                row(1, "Arch Enemy", "Melodic Death Metal"),
                row(2, "At the Gates", "Melodic Death Metal, Thrash"),
            ])
            .unwrap();
        }

        let mut sink = CsvSink::open(&path).unwrap();
        let existing = sink.load_existing().unwrap();
        assert_eq!(existing.max_sequence, 2);
        assert!(existing.keys.contains("at the gates"));
        assert!(existing.per_partition.is_none());

        // Reopening must not write a second header
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("sequence_id").count(), 1);
    }

    #[test]
    fn test_reset_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        sink.append(&[row(1, "Bathory", "Black Metal")]).unwrap();

        sink.reset().unwrap();
        sink.append(&[row(1, "Candlemass", "Doom Metal")]).unwrap();

        let existing = sink.load_existing().unwrap();
        assert_eq!(existing.keys.len(), 1);
        assert!(existing.keys.contains("candlemass"));
    }

    #[test]
    fn test_unterminated_trailing_row_is_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        {
            let mut sink = CsvSink::open(&path).unwrap();
            sink.append(&[row(1, "Bathory", "Black Metal")]).unwrap();
        }

        // A crash mid-batch leaves a row without its terminator
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"2,Candlem").unwrap();
        drop(file);

        let mut sink = CsvSink::open(&path).unwrap();
        let existing = sink.load_existing().unwrap();
        assert_eq!(existing.max_sequence, 1);
        assert_eq!(existing.keys.len(), 1);
        assert!(existing.keys.contains("bathory"));

        sink.append(&[row(2, "Candlemass", "Doom Metal")]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "sequence_id,band_name,country,genre,status\r\n\
             1,Bathory,Sweden,Black Metal,Active\r\n\
             2,Candlemass,Sweden,Doom Metal,Active\r\n"
        );
    }

    #[test]
    fn test_unterminated_header_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        std::fs::write(&path, "sequence_id,band_na").unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        assert_eq!(sink.load_existing().unwrap().max_sequence, 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "sequence_id,band_name,country,genre,status\r\n");
    }

    #[test]
    fn test_foreign_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        std::fs::write(&path, "id,name\r\n1,x\r\n").unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        assert!(matches!(sink.load_existing(), Err(SinkError::Corrupt(_))));
    }
}
