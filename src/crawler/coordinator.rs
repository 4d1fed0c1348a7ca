//! Crawler coordinator - partition traversal across renderer sessions
//!
//! This module contains the traversal engine that coordinates a whole run:
//! - Opening the checkpoint store and the record sink
//! - Skipping partitions a previous run completed
//! - Assigning the remaining partitions to renderer sessions
//! - Recording failed partitions and stopping on fatal errors
//! - Building the final result

use crate::config::Config;
use crate::crawler::pagination::{PaginationController, PartitionOutcome};
use crate::crawler::CrawlResult;
use crate::partition::Partition;
use crate::render::Renderer;
use crate::sink::{open_sink, RecordSink, SinkWriter};
use crate::storage::SqliteStorage;
use crate::{CrawlerError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    partitions: Vec<Partition>,
    writer: Arc<Mutex<SinkWriter>>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration, recorded with the run
    /// * `resume` - Whether to keep checkpoints and records of earlier runs
    /// * `cancel` - Cancellation signal for the whole run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlerError)` - Failed to initialize
    pub fn new(
        config: Config,
        config_hash: &str,
        resume: bool,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let sink = open_sink(&config.output).map_err(|e| CrawlerError::SinkWrite {
            reason: e.to_string(),
            last_checkpoint: "none".to_string(),
        })?;
        Self::with_sink(config, sink, config_hash, resume, cancel)
    }

    /// Creates a coordinator that writes records to `sink`
    ///
    /// Checkpoints still go to the database named by the configuration.
    pub fn with_sink(
        config: Config,
        sink: Box<dyn RecordSink>,
        config_hash: &str,
        resume: bool,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let partitions = config.partitions()?;

        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let writer = SinkWriter::open(sink, storage, config_hash, resume)?;

        Ok(Self {
            config: Arc::new(config),
            partitions,
            writer: Arc::new(Mutex::new(writer)),
            cancel,
        })
    }

    /// The traversal order of this run
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn run_id(&self) -> Result<i64> {
        Ok(lock(&self.writer)?.run_id())
    }

    /// Runs every pending partition to a terminal state
    ///
    /// Partitions are dealt round-robin to the renderers, each driven by its
    /// own task; with one renderer they run sequentially in order. A failed
    /// partition never stops the others. A fatal error stops every worker
    /// after its current page and is returned once all have finished.
    ///
    /// # Arguments
    ///
    /// * `renderers` - One renderer per session; each is closed before its
    ///   task ends
    pub async fn run<R>(&self, renderers: Vec<R>) -> Result<CrawlResult>
    where
        R: Renderer + 'static,
    {
        if renderers.is_empty() {
            return Err(CrawlerError::Worker("no renderer sessions".to_string()));
        }

        let pending: Vec<Partition> = {
            let writer = lock(&self.writer)?;
            self.partitions
                .iter()
                .filter(|p| {
                    let completed = writer.is_completed(p);
                    if completed {
                        tracing::info!("Skipping partition {}: completed by an earlier run", p);
                    }
                    !completed
                })
                .cloned()
                .collect()
        };

        tracing::info!(
            "Starting run {} over {} partitions ({} pending) with {} session(s)",
            lock(&self.writer)?.run_id(),
            self.partitions.len(),
            pending.len(),
            renderers.len()
        );

        let mut assignments: Vec<Vec<Partition>> = vec![Vec::new(); renderers.len()];
        for (i, partition) in pending.into_iter().enumerate() {
            assignments[i % renderers.len()].push(partition);
        }

        // Stops all workers on user cancellation or on a fatal error
        let stop = self.cancel.child_token();
        let controller = PaginationController::from_config(&self.config, stop.clone());

        let mut workers = JoinSet::new();
        for (worker_id, (renderer, partitions)) in
            renderers.into_iter().zip(assignments).enumerate()
        {
            let controller = controller.clone();
            let writer = Arc::clone(&self.writer);
            let stop = stop.clone();
            workers.spawn(async move {
                run_worker(worker_id, renderer, partitions, controller, writer, stop).await
            });
        }

        let mut fatal: Option<CrawlerError> = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(|e| CrawlerError::Worker(e.to_string())).and_then(|r| r);
            if let Err(error) = outcome {
                tracing::error!("Traversal stopped: {}", error);
                stop.cancel();
                fatal.get_or_insert(error);
            }
        }

        let mut writer = lock(&self.writer)?;
        if let Some(error) = fatal {
            tracing::error!("Last checkpoint: {}", writer.describe_last_checkpoint());
            writer.abort()?;
            return Err(error);
        }

        let result = writer.finalize(&self.partitions, self.cancel.is_cancelled())?;
        tracing::info!(
            "Run {} finished: {} records, {} failed partitions{}",
            result.run_id,
            result.total_records,
            result.failures.len(),
            if result.cancelled { " (cancelled)" } else { "" }
        );
        Ok(result)
    }
}

/// Drives one renderer session through its assigned partitions
async fn run_worker<R: Renderer>(
    worker_id: usize,
    mut renderer: R,
    partitions: Vec<Partition>,
    controller: PaginationController,
    writer: Arc<Mutex<SinkWriter>>,
    stop: CancellationToken,
) -> Result<()> {
    let result = traverse(worker_id, &mut renderer, &partitions, &controller, &writer, &stop).await;

    if let Err(e) = renderer.close().await {
        tracing::warn!("Worker {}: failed to close renderer session: {}", worker_id, e);
    }

    result
}

async fn traverse<R: Renderer>(
    worker_id: usize,
    renderer: &mut R,
    partitions: &[Partition],
    controller: &PaginationController,
    writer: &Mutex<SinkWriter>,
    stop: &CancellationToken,
) -> Result<()> {
    for (i, partition) in partitions.iter().enumerate() {
        if stop.is_cancelled() {
            tracing::info!("Worker {}: stopping before partition {}", worker_id, partition);
            break;
        }

        tracing::info!(
            "Worker {}: partition {} ({}/{})",
            worker_id,
            partition,
            i + 1,
            partitions.len()
        );

        let start = lock(writer)?.start_state(partition);
        match controller.run(renderer, writer, start).await? {
            PartitionOutcome::Done(_) => {}
            PartitionOutcome::Failed(failure, _) => {
                lock(writer)?.record_failure(failure)?;
            }
            PartitionOutcome::Interrupted(state) => {
                tracing::info!("Worker {}: interrupted at {}", worker_id, state.describe());
                break;
            }
        }
    }

    Ok(())
}

fn lock(writer: &Mutex<SinkWriter>) -> Result<MutexGuard<'_, SinkWriter>> {
    writer.lock().map_err(|_| CrawlerError::LockPoisoned)
}
