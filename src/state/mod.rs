//! State module for tracking crawl progress
//!
//! This module provides state management for partitions during the crawl process.
//!
//! # Components
//!
//! - `PaginationState`: The pagination state machine of one partition
//! - `CrawlState`: Persisted per-partition progress used for resumption
//! - `Throttle`: The politeness floor between upstream requests

mod crawl_state;
mod pagination_state;
mod politeness;

// Re-export main types
pub use crawl_state::CrawlState;
pub use pagination_state::PaginationState;
pub use politeness::Throttle;
