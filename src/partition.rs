//! Catalog partitions
//!
//! The catalog listing is split into a fixed, enumerable set of partitions:
//! one per letter `A`..`Z` plus special buckets for names starting with a
//! digit or symbol (`NBR`) and a catch-all (`~`). Each partition is paginated
//! independently and lives at `<base-url><label>`.

use crate::ConfigError;
use std::fmt;
use url::Url;

/// Labels of the special buckets appended after the letters
pub const SPECIAL_BUCKETS: [&str; 2] = ["NBR", "~"];

/// One unit of the traversal space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    label: String,
}

impl Partition {
    /// Creates a partition from its label
    ///
    /// Labels are opaque to the crawler, but they are appended to the base
    /// URL, so they must be non-empty and must not contain path separators.
    pub fn new(label: impl Into<String>) -> Result<Self, ConfigError> {
        let label = label.into();
        let trimmed = label.trim();

        if trimmed.is_empty() {
            return Err(ConfigError::InvalidPartition(
                "partition label cannot be empty".to_string(),
            ));
        }

        if trimmed.contains('/') || trimmed.contains('?') || trimmed.contains('#') {
            return Err(ConfigError::InvalidPartition(format!(
                "partition label '{}' cannot contain '/', '?' or '#'",
                trimmed
            )));
        }

        Ok(Self {
            label: trimmed.to_string(),
        })
    }

    /// Creates a single-letter partition
    pub fn letter(letter: char) -> Self {
        Self {
            label: letter.to_ascii_uppercase().to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true for buckets that are not a single letter
    pub fn is_special(&self) -> bool {
        let mut chars = self.label.chars();
        !matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphabetic())
    }

    /// Builds the listing URL of this partition
    ///
    /// The base URL is treated as a directory, so `https://host/lists` and
    /// `https://host/lists/` both yield `https://host/lists/<label>`.
    pub fn url(&self, base_url: &Url) -> Result<Url, url::ParseError> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&self.label)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Returns the default traversal order: `A`..`Z`, then the special buckets
pub fn default_partitions() -> Vec<Partition> {
    ('A'..='Z')
        .map(Partition::letter)
        .chain(SPECIAL_BUCKETS.iter().map(|label| Partition {
            label: (*label).to_string(),
        }))
        .collect()
}

/// Parses an ordered list of labels, rejecting duplicates
pub fn parse_partitions(labels: &[String]) -> Result<Vec<Partition>, ConfigError> {
    let mut partitions: Vec<Partition> = Vec::with_capacity(labels.len());

    for label in labels {
        let partition = Partition::new(label.as_str())?;
        if partitions.contains(&partition) {
            return Err(ConfigError::InvalidPartition(format!(
                "duplicate partition label '{}'",
                partition
            )));
        }
        partitions.push(partition);
    }

    Ok(partitions)
}
