use crate::partition::Partition;

/// Persisted progress of one partition
///
/// Created when a partition traversal begins, updated after every committed
/// page, and marked completed once the last page has been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlState {
    /// The partition this state belongs to
    pub partition: Partition,

    /// Index of the last committed page (1-based, 0 before the first page)
    pub page_index: u32,

    /// Records this partition contributed to the sink
    pub records_emitted: u64,

    /// Whether the last page has been reached
    pub completed: bool,
}

impl CrawlState {
    /// Creates a new state for a partition that has not been started
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            page_index: 0,
            records_emitted: 0,
            completed: false,
        }
    }

    /// Starts a new pass over the partition from its first page
    ///
    /// Records already emitted stay counted; pages are re-fetched and any
    /// record written earlier is filtered by deduplication.
    pub fn restart(&self) -> Self {
        Self {
            partition: self.partition.clone(),
            page_index: 0,
            records_emitted: self.records_emitted,
            completed: false,
        }
    }

    /// Records that a page has been committed
    pub fn record_page(&mut self, page_index: u32, records_emitted: u64) {
        self.page_index = page_index;
        self.records_emitted = records_emitted;
    }

    /// Marks the partition as fully traversed
    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Short human-readable form used in logs and error reports
    pub fn describe(&self) -> String {
        format!(
            "partition {} page {} ({} records{})",
            self.partition,
            self.page_index,
            self.records_emitted,
            if self.completed { ", completed" } else { "" }
        )
    }
}
