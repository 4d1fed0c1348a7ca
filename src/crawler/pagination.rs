//! Pagination controller
//!
//! Drives one partition through `Start -> Loading -> HasPage <-> Advancing`
//! until `Done` or `Failed`, committing every page to the sink writer and
//! checkpointing before moving on.

use crate::config::{Config, SelectorConfig};
use crate::crawler::parser::parse_records;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::{FailureReason, PartitionFailure};
use crate::partition::Partition;
use crate::render::{PageSnapshot, Renderer};
use crate::sink::SinkWriter;
use crate::state::{CrawlState, PaginationState};
use crate::{CrawlerError, RenderError, Result};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Terminal outcome of one partition traversal
#[derive(Debug, Clone)]
pub enum PartitionOutcome {
    /// The last page was reached
    Done(CrawlState),

    /// The partition failed; other partitions are unaffected
    Failed(PartitionFailure, CrawlState),

    /// Cancellation was requested; progress up to the last page is saved
    Interrupted(CrawlState),
}

impl PartitionOutcome {
    pub fn state(&self) -> &CrawlState {
        match self {
            Self::Done(state) | Self::Failed(_, state) | Self::Interrupted(state) => state,
        }
    }
}

/// Result of a renderer call under the retry policy
enum Attempt<T> {
    Ready(T),
    GaveUp(RenderError),
    Cancelled,
}

/// Runs the pagination state machine for one partition at a time
#[derive(Debug, Clone)]
pub struct PaginationController {
    policy: RetryPolicy,
    max_pages: u32,
    selectors: SelectorConfig,
    cancel: CancellationToken,
}

impl PaginationController {
    pub fn new(
        policy: RetryPolicy,
        max_pages: u32,
        selectors: SelectorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            policy,
            max_pages,
            selectors,
            cancel,
        }
    }

    pub fn from_config(config: &Config, cancel: CancellationToken) -> Self {
        Self::new(
            RetryPolicy::from_config(config),
            config.crawler.max_pages_per_partition,
            config.selectors.clone(),
            cancel,
        )
    }

    /// Traverses a partition to a terminal state
    ///
    /// # Arguments
    ///
    /// * `renderer` - The session-bound renderer; used by this call only
    /// * `writer` - The shared sink writer
    /// * `start` - Where to start from; the traversal always begins at page 1
    ///
    /// # Returns
    ///
    /// * `Ok(PartitionOutcome)` - Done, failed or interrupted
    /// * `Err(CrawlerError)` - A fatal error (sink or checkpoint write)
    pub async fn run<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        writer: &Mutex<SinkWriter>,
        start: CrawlState,
    ) -> Result<PartitionOutcome> {
        let partition = start.partition.clone();
        let mut state = start;
        let mut machine = PaginationState::Start;

        if self.cancel.is_cancelled() {
            return Ok(PartitionOutcome::Interrupted(state));
        }

        transition(&partition, &mut machine, PaginationState::Loading)?;
        let mut current = match self.load(renderer, &partition).await {
            Attempt::Ready(snapshot) => snapshot,
            Attempt::GaveUp(error) => {
                transition(&partition, &mut machine, PaginationState::Failed)?;
                return self.fail(writer, state, PartitionFailure::from_render_error(&partition, error));
            }
            Attempt::Cancelled => return Ok(PartitionOutcome::Interrupted(state)),
        };

        transition(&partition, &mut machine, PaginationState::HasPage)?;
        if let Err(error) = self.commit_page(writer, &current, &mut state) {
            transition(&partition, &mut machine, PaginationState::Failed)?;
            return self.fail_on(writer, state, error);
        }

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Stopping {} on cancellation", state.describe());
                return Ok(PartitionOutcome::Interrupted(state));
            }

            transition(&partition, &mut machine, PaginationState::Advancing)?;
            let next = match self.advance(renderer, &current).await {
                Attempt::Ready(next) => next,
                Attempt::GaveUp(error) => {
                    transition(&partition, &mut machine, PaginationState::Failed)?;
                    return self.fail(writer, state, PartitionFailure::from_render_error(&partition, error));
                }
                Attempt::Cancelled => return Ok(PartitionOutcome::Interrupted(state)),
            };

            let next = match next {
                Some(next) => next,
                None => {
                    transition(&partition, &mut machine, PaginationState::Done)?;
                    state.mark_completed();
                    lock(writer)?.checkpoint(&state)?;
                    tracing::info!("Partition {} done: {}", partition, state.describe());
                    return Ok(PartitionOutcome::Done(state));
                }
            };

            if next.page_index > self.max_pages {
                transition(&partition, &mut machine, PaginationState::Failed)?;
                let failure = PartitionFailure {
                    partition: partition.clone(),
                    reason: FailureReason::PaginationLoopSuspected,
                    message: format!(
                        "page {} exceeds the ceiling of {} pages",
                        next.page_index, self.max_pages
                    ),
                    attempts: 1,
                    page_index: next.page_index,
                };
                return self.fail(writer, state, failure);
            }

            transition(&partition, &mut machine, PaginationState::HasPage)?;
            if let Err(error) = self.commit_page(writer, &next, &mut state) {
                transition(&partition, &mut machine, PaginationState::Failed)?;
                return self.fail_on(writer, state, error);
            }
            current = next;
        }
    }

    /// Parses a page, emits its records and checkpoints the partition
    ///
    /// Parse errors are returned as the inner error; sink errors are fatal
    /// and returned as the outer one.
    fn commit_page(
        &self,
        writer: &Mutex<SinkWriter>,
        snapshot: &PageSnapshot,
        state: &mut CrawlState,
    ) -> std::result::Result<(), CommitError> {
        let page = parse_records(snapshot, &self.selectors).map_err(CommitError::Page)?;

        let mut writer = lock(writer).map_err(CommitError::Fatal)?;
        let summary = writer.emit(&page.records).map_err(CommitError::Fatal)?;
        writer.record_anomalies(page.anomalies.len());

        state.record_page(snapshot.page_index, writer.count_for(&snapshot.partition));
        writer.checkpoint(state).map_err(CommitError::Fatal)?;

        tracing::info!(
            "Partition {} page {}: {} records ({} new, {} duplicates, {} skipped rows)",
            snapshot.partition,
            snapshot.page_index,
            page.records.len(),
            summary.written,
            summary.duplicates,
            page.anomalies.len()
        );

        Ok(())
    }

    async fn load<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        partition: &Partition,
    ) -> Attempt<PageSnapshot> {
        let mut backoff = self.policy.start();
        loop {
            let error = match renderer.load_partition(partition).await {
                Ok(snapshot) => return Attempt::Ready(snapshot),
                Err(error) => error,
            };

            let description = error.to_string();
            match backoff.on_error(error) {
                Ok(delay) => {
                    tracing::warn!(
                        "Load attempt {}/{} failed ({}), retrying in {:?}",
                        backoff.attempts(),
                        self.policy.max_attempts(),
                        description,
                        delay
                    );
                    if self.pause(delay).await {
                        return Attempt::Cancelled;
                    }
                }
                Err(error) => return Attempt::GaveUp(error),
            }
        }
    }

    async fn advance<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        current: &PageSnapshot,
    ) -> Attempt<Option<PageSnapshot>> {
        let mut backoff = self.policy.start();
        loop {
            let error = match renderer.advance_page(current).await {
                Ok(next) => return Attempt::Ready(next),
                Err(error) => error,
            };

            let description = error.to_string();
            match backoff.on_error(error) {
                Ok(delay) => {
                    tracing::warn!(
                        "Advance attempt {}/{} failed ({}), retrying in {:?}",
                        backoff.attempts(),
                        self.policy.max_attempts(),
                        description,
                        delay
                    );
                    if self.pause(delay).await {
                        return Attempt::Cancelled;
                    }
                }
                Err(error) => return Attempt::GaveUp(error),
            }
        }
    }

    /// Sleeps for `delay`; returns true if cancelled meanwhile
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    fn fail(
        &self,
        writer: &Mutex<SinkWriter>,
        state: CrawlState,
        failure: PartitionFailure,
    ) -> Result<PartitionOutcome> {
        tracing::warn!("Partition failed: {}", failure);
        lock(writer)?.checkpoint(&state)?;
        Ok(PartitionOutcome::Failed(failure, state))
    }

    fn fail_on(
        &self,
        writer: &Mutex<SinkWriter>,
        state: CrawlState,
        error: CommitError,
    ) -> Result<PartitionOutcome> {
        match error {
            CommitError::Page(error) => {
                let failure = PartitionFailure::from_render_error(&state.partition, error);
                self.fail(writer, state, failure)
            }
            CommitError::Fatal(error) => Err(error),
        }
    }
}

/// Failure while committing a page
enum CommitError {
    /// The page itself is unusable; fails the partition
    Page(RenderError),

    /// The sink or checkpoint store failed; aborts the run
    Fatal(CrawlerError),
}

fn lock(writer: &Mutex<SinkWriter>) -> Result<MutexGuard<'_, SinkWriter>> {
    writer.lock().map_err(|_| CrawlerError::LockPoisoned)
}

fn transition(
    partition: &Partition,
    current: &mut PaginationState,
    next: PaginationState,
) -> Result<()> {
    if !current.can_transition_to(next) {
        return Err(CrawlerError::InvalidTransition {
            from: *current,
            to: next,
        });
    }

    tracing::debug!("Partition {}: {} -> {}", partition, current, next);
    *current = next;
    Ok(())
}
