//! Listing page parser
//!
//! This module turns a rendered listing page into records:
//! - rows are located with the configured selectors
//! - each row must have exactly four cells (name, country, genre, status)
//! - bad rows are skipped and reported as anomalies, never fatal to the page

use crate::config::SelectorConfig;
use crate::crawler::record::{collapse_whitespace, BandStatus, Record};
use crate::render::PageSnapshot;
use crate::{RenderError, RenderErrorKind};
use scraper::{ElementRef, Html, Selector};
use std::fmt;

/// Number of cells in a listing row
const CELLS_PER_ROW: usize = 4;

/// A row that could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAnomaly {
    /// The row has fewer cells than expected, or a required cell is blank
    MissingField { row: usize, field: &'static str },

    /// The row has more cells than expected
    MalformedRow { row: usize, cells: usize },

    /// The name is empty after trimming
    EmptyName { row: usize },
}

impl ParseAnomaly {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::MalformedRow { .. } => "malformed_row",
            Self::EmptyName { .. } => "empty_name",
        }
    }
}

impl fmt::Display for ParseAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { row, field } => write!(f, "row {}: missing {}", row, field),
            Self::MalformedRow { row, cells } => {
                write!(f, "row {}: {} cells, expected {}", row, cells, CELLS_PER_ROW)
            }
            Self::EmptyName { row } => write!(f, "row {}: empty name", row),
        }
    }
}

/// Result of parsing one page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub records: Vec<Record>,
    pub anomalies: Vec<ParseAnomaly>,
}

/// Extracts the records of a listing page
///
/// Pure: the result depends only on the snapshot and the selectors.
///
/// # Arguments
///
/// * `snapshot` - The rendered page
/// * `selectors` - Listing, row selectors
///
/// # Returns
///
/// * `Ok(ParsedPage)` - Records in row order plus skipped-row anomalies
/// * `Err(RenderError)` - The listing container is absent (StructuralMismatch)
///
/// # Example
///
/// ```
/// use metallum_crawler::config::SelectorConfig;
/// use metallum_crawler::crawler::parse_records;
/// use metallum_crawler::render::PageSnapshot;
/// use metallum_crawler::Partition;
///
/// let html = r#"<table id="bandListAlpha"><tbody>
///   <tr><td><a href="/bands/x">Xasthur</a></td><td>United States</td><td>Black Metal</td><td><span>Split-up</span></td></tr>
/// </tbody></table>"#;
/// let snapshot = PageSnapshot::new(Partition::letter('X'), 1, html);
/// let page = parse_records(&snapshot, &SelectorConfig::default()).unwrap();
/// assert_eq!(page.records.len(), 1);
/// assert_eq!(page.records[0].name, "Xasthur");
/// ```
pub fn parse_records(
    snapshot: &PageSnapshot,
    selectors: &SelectorConfig,
) -> Result<ParsedPage, RenderError> {
    let structural = |reason: String| {
        RenderError::new(
            RenderErrorKind::StructuralMismatch,
            reason,
            &snapshot.partition,
            snapshot.page_index,
        )
    };

    let listing = Selector::parse(&selectors.listing)
        .map_err(|e| structural(format!("invalid listing selector: {:?}", e)))?;
    let rows = Selector::parse(&selectors.rows)
        .map_err(|e| structural(format!("invalid rows selector: {:?}", e)))?;

    let document = Html::parse_document(&snapshot.markup);

    if document.select(&listing).next().is_none() {
        return Err(structural(format!(
            "listing container '{}' not found",
            selectors.listing
        )));
    }

    let mut page = ParsedPage::default();

    for (index, row) in document.select(&rows).enumerate() {
        let row_number = index + 1;
        match parse_row(row, row_number, snapshot) {
            RowOutcome::Record(record) => page.records.push(record),
            RowOutcome::Placeholder => {}
            RowOutcome::Anomaly(anomaly) => {
                tracing::warn!(
                    "Partition {} page {}: skipped {} ({})",
                    snapshot.partition,
                    snapshot.page_index,
                    anomaly,
                    anomaly.kind()
                );
                page.anomalies.push(anomaly);
            }
        }
    }

    Ok(page)
}

enum RowOutcome {
    Record(Record),
    Placeholder,
    Anomaly(ParseAnomaly),
}

fn parse_row(row: ElementRef<'_>, row_number: usize, snapshot: &PageSnapshot) -> RowOutcome {
    let cells: Vec<ElementRef<'_>> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect();

    // DataTables renders an empty result as a single placeholder cell
    if cells.len() == 1 && cells[0].value().classes().any(|c| c == "dataTables_empty") {
        return RowOutcome::Placeholder;
    }

    if cells.len() > CELLS_PER_ROW {
        return RowOutcome::Anomaly(ParseAnomaly::MalformedRow {
            row: row_number,
            cells: cells.len(),
        });
    }

    if cells.len() < CELLS_PER_ROW {
        let field = ["name", "country", "genre", "status"][cells.len()];
        return RowOutcome::Anomaly(ParseAnomaly::MissingField {
            row: row_number,
            field,
        });
    }

    let name = first_child_text(cells[0], "a").unwrap_or_else(|| cell_text(cells[0]));
    if name.is_empty() {
        return RowOutcome::Anomaly(ParseAnomaly::EmptyName { row: row_number });
    }

    let status_raw = first_child_text(cells[3], "span").unwrap_or_else(|| cell_text(cells[3]));
    if status_raw.is_empty() {
        return RowOutcome::Anomaly(ParseAnomaly::MissingField {
            row: row_number,
            field: "status",
        });
    }

    RowOutcome::Record(Record {
        name,
        country: cell_text(cells[1]),
        genre: cell_text(cells[2]),
        status: BandStatus::parse(&status_raw),
        status_raw,
        source_partition: snapshot.partition.clone(),
        source_page: snapshot.page_index,
    })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    collapse_whitespace(&cell.text().collect::<String>())
}

/// Text of the first descendant with the given tag, if it has any
fn first_child_text(cell: ElementRef<'_>, tag: &str) -> Option<String> {
    let selector = Selector::parse(tag).ok()?;
    cell.select(&selector)
        .next()
        .map(cell_text)
        .filter(|text| !text.is_empty())
}
