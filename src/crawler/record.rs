use crate::partition::Partition;
use std::fmt;

/// Lifecycle status of a band as shown in the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandStatus {
    Active,
    OnHold,
    SplitUp,
    ChangedName,
    Disputed,
    Unknown,
}

impl BandStatus {
    /// Normalizes listing text into a status
    ///
    /// Matching ignores case, surrounding whitespace and the hyphen in
    /// "split-up". Anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let normalized = collapse_whitespace(raw).to_lowercase().replace('-', " ");
        match normalized.as_str() {
            "active" => Self::Active,
            "on hold" => Self::OnHold,
            "split up" => Self::SplitUp,
            "changed name" => Self::ChangedName,
            "disputed" => Self::Disputed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::OnHold => "On hold",
            Self::SplitUp => "Split-up",
            Self::ChangedName => "Changed name",
            Self::Disputed => "Disputed",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog entry extracted from a listing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub country: String,
    pub genre: String,
    pub status: BandStatus,

    /// Status text exactly as listed, after whitespace trimming
    pub status_raw: String,

    pub source_partition: Partition,
    pub source_page: u32,
}

impl Record {
    /// Deduplication key of this record
    pub fn natural_key(&self) -> String {
        natural_key(&self.name)
    }

    /// Status written to the sink
    ///
    /// Unrecognized statuses keep their listed text so nothing is lost.
    pub fn status_label(&self) -> &str {
        match self.status {
            BandStatus::Unknown if !self.status_raw.is_empty() => &self.status_raw,
            status => status.as_str(),
        }
    }
}

/// Normalizes a name into its deduplication key
///
/// Case and runs of whitespace do not distinguish two names.
pub fn natural_key(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

/// Trims a string and collapses internal whitespace runs into one space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
