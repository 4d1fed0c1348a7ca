//! Metallum-Crawler: a resumable crawler for partitioned, paginated catalogs
//!
//! This crate enumerates every record of a catalog whose listing is split into
//! fixed partitions (one per letter plus special buckets), each paginated
//! server-side behind a dynamic listing UI. Records are extracted from each
//! rendered page, deduplicated by natural key and written at most once to a
//! durable sink, with per-partition checkpoints so an interrupted run resumes
//! without re-fetching completed partitions.

pub mod config;
pub mod crawler;
pub mod output;
pub mod partition;
pub mod render;
pub mod sink;
pub mod state;
pub mod storage;

use std::fmt;
use thiserror::Error;

/// Main error type for crawler operations
///
/// Only errors that abort the whole run surface here. Partition-scoped
/// failures are recorded in [`crawler::CrawlResult::failures`] instead.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink write failed: {reason} (last checkpoint: {last_checkpoint})")]
    SinkWrite {
        reason: String,
        last_checkpoint: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid pagination transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PaginationState,
        to: state::PaginationState,
    },

    #[error("Traversal worker failed: {0}")]
    Worker(String),

    #[error("Sink writer lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),

    #[error("Invalid partition label: {0}")]
    InvalidPartition(String),
}

/// Failure classes of a renderer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderErrorKind {
    /// Waiting for content exceeded the page load timeout
    Timeout,

    /// The element acted upon went away while the page was changing
    StaleReference,

    /// Connection, request or upstream server failure
    TransientNetwork,

    /// Expected structure is absent on a stable page
    StructuralMismatch,
}

impl RenderErrorKind {
    /// Returns true if retrying the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::StructuralMismatch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::StaleReference => "stale_reference",
            Self::TransientNetwork => "transient_network",
            Self::StructuralMismatch => "structural_mismatch",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(Self::Timeout),
            "stale_reference" => Some(Self::StaleReference),
            "transient_network" => Some(Self::TransientNetwork),
            "structural_mismatch" => Some(Self::StructuralMismatch),
            _ => None,
        }
    }
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the session capability, before crawl context is attached
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SessionError {
    pub kind: RenderErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::Timeout, message)
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::StructuralMismatch, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::TransientNetwork, message)
    }
}

/// Renderer adapter error, tagged with where in the traversal it happened
#[derive(Debug, Clone)]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub reason: String,
    pub partition: Option<partition::Partition>,
    pub page_index: u32,
    pub attempts: u32,
}

impl RenderError {
    pub fn new(
        kind: RenderErrorKind,
        reason: impl Into<String>,
        partition: &partition::Partition,
        page_index: u32,
    ) -> Self {
        Self {
            kind,
            reason: reason.into(),
            partition: Some(partition.clone()),
            page_index,
            attempts: 1,
        }
    }

    /// Attaches crawl context to a capability-level error
    pub fn from_session(
        error: SessionError,
        partition: &partition::Partition,
        page_index: u32,
    ) -> Self {
        Self::new(error.kind, error.message, partition, page_index)
    }

    /// Annotates the error with the number of attempts made
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            Some(p) => write!(f, "{} on partition {} page {}", self.kind, p, self.page_index)?,
            None => write!(f, "{} on page {}", self.kind, self.page_index)?,
        }
        write!(f, ": {} ({} attempt(s))", self.reason, self.attempts)
    }
}

impl std::error::Error for RenderError {}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlResult, PartitionFailure};
pub use partition::Partition;
pub use state::{CrawlState, PaginationState};
