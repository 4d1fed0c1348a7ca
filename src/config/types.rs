use crate::partition::{default_partitions, parse_partitions, Partition};
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Metallum-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Returns the partitions to traverse, in traversal order
    pub fn partitions(&self) -> Result<Vec<Partition>, ConfigError> {
        match &self.crawler.partitions {
            Some(labels) => parse_partitions(labels),
            None => Ok(default_partitions()),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Listing root; each partition lives at `<base-url><label>`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Ordered partition labels (defaults to A-Z, NBR, ~)
    #[serde(default)]
    pub partitions: Option<Vec<String>>,

    /// Maximum wait for the listing to materialize or refresh (milliseconds)
    #[serde(rename = "page-load-timeout-ms", default = "default_page_load_timeout")]
    pub page_load_timeout_ms: u64,

    /// Minimum time between consecutive requests to the upstream site (milliseconds)
    #[serde(rename = "politeness-delay-ms", default = "default_politeness_delay")]
    pub politeness_delay_ms: u64,

    /// Total attempts for each renderer operation
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Safety ceiling against runaway "has more" detection
    #[serde(
        rename = "max-pages-per-partition",
        default = "default_max_pages_per_partition"
    )]
    pub max_pages_per_partition: u32,

    /// Skip partitions already completed by an earlier run
    #[serde(rename = "resume-from-checkpoint", default = "default_true")]
    pub resume_from_checkpoint: bool,

    /// Number of independent renderer sessions
    #[serde(default = "default_sessions")]
    pub sessions: u32,

    /// Polling period of wait-for-condition loops (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl CrawlerConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Retry/backoff configuration for renderer operations
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Delay before the second attempt (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Growth factor applied per further attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound of a single delay before jitter (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Adds up to 20% random jitter to each delay
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            jitter: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// CSS selectors describing the listing markup
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Listing container that must be present once a page has rendered
    #[serde(default = "default_listing_selector")]
    pub listing: String,

    /// One element per catalog row
    #[serde(default = "default_rows_selector")]
    pub rows: String,

    /// The "next page" control
    #[serde(rename = "next-button", default = "default_next_selector")]
    pub next_button: String,

    /// Class marking the next control as disabled on the last page
    #[serde(rename = "disabled-class", default = "default_disabled_class")]
    pub disabled_class: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing: default_listing_selector(),
            rows: default_rows_selector(),
            next_button: default_next_selector(),
            disabled_class: default_disabled_class(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database (checkpoints, runs, and the record table)
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// When set, records go to this CSV file instead of the SQLite table
    #[serde(rename = "csv-path", default)]
    pub csv_path: Option<String>,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<String>,
}

fn default_page_load_timeout() -> u64 {
    10_000
}

fn default_politeness_delay() -> u64 {
    1_500
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_pages_per_partition() -> u32 {
    10_000
}

fn default_sessions() -> u32 {
    1
}

fn default_poll_interval() -> u64 {
    250
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_listing_selector() -> String {
    "#bandListAlpha".to_string()
}

fn default_rows_selector() -> String {
    "#bandListAlpha tbody tr".to_string()
}

fn default_next_selector() -> String {
    "#bandListAlpha_next".to_string()
}

fn default_disabled_class() -> String {
    "paginate_button_disabled".to_string()
}
