//! SQLite record sink
//!
//! Records go to a `bands` table with a unique constraint on the natural
//! key, so the database itself refuses a second copy of a record.

use crate::sink::traits::{ExistingRecords, RecordSink, SinkResult, SinkRow};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const BANDS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS bands (
    sequence_id INTEGER PRIMARY KEY,
    natural_key TEXT NOT NULL UNIQUE,
    band_name TEXT NOT NULL,
    country TEXT NOT NULL,
    genre TEXT NOT NULL,
    status TEXT NOT NULL,
    source_partition TEXT NOT NULL,
    source_page INTEGER NOT NULL,
    emitted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bands_partition ON bands(source_partition);
"#;

/// Record sink backed by a SQLite table
pub struct SqliteSink {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteSink {
    /// Opens (or creates) the `bands` table in the database at `path`
    pub fn open(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        conn.execute_batch(BANDS_SCHEMA_SQL)?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory sink (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(BANDS_SCHEMA_SQL)?;
        Ok(Self { conn, path: None })
    }

    /// Reads every stored row in sequence order
    pub fn rows(&self) -> SinkResult<Vec<SinkRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT sequence_id, band_name, country, genre, status, natural_key,
             source_partition, source_page FROM bands ORDER BY sequence_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SinkRow {
                    sequence_id: row.get::<_, i64>(0)? as u64,
                    band_name: row.get(1)?,
                    country: row.get(2)?,
                    genre: row.get(3)?,
                    status: row.get(4)?,
                    natural_key: row.get(5)?,
                    source_partition: row.get(6)?,
                    source_page: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

impl RecordSink for SqliteSink {
    fn load_existing(&mut self) -> SinkResult<ExistingRecords> {
        let mut existing = ExistingRecords {
            per_partition: Some(HashMap::new()),
            ..ExistingRecords::default()
        };

        let mut stmt = self
            .conn
            .prepare("SELECT natural_key, sequence_id, source_partition FROM bands")?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let sequence_id = row.get::<_, i64>(1)? as u64;
            let partition: String = row.get(2)?;

            existing.keys.insert(key);
            existing.max_sequence = existing.max_sequence.max(sequence_id);
            if let Some(counts) = existing.per_partition.as_mut() {
                *counts.entry(partition).or_insert(0) += 1;
            }
        }

        Ok(existing)
    }

    fn append(&mut self, rows: &[SinkRow]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO bands
                 (sequence_id, natural_key, band_name, country, genre, status,
                  source_partition, source_page, emitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.sequence_id as i64,
                    row.natural_key,
                    row.band_name,
                    row.country,
                    row.genre,
                    row.status,
                    row.source_partition,
                    row.source_page,
                    now
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn reset(&mut self) -> SinkResult<()> {
        self.conn.execute("DELETE FROM bands", [])?;
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}#bands", path.display()),
            None => "sqlite::memory:#bands".to_string(),
        }
    }
}
