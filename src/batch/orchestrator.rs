//! Sequential processing of a task's items.
//!
//! The orchestrator walks the items of a task in order, starting at the
//! task's `current_index` so that a paused or interrupted run picks up where
//! it stopped. Each item is skipped when its artifact already exists, or
//! fetched through [`with_retry`] and the [`TransferEngine`]. Progress flows
//! into the [`TaskRegistry`] through a [`ProgressSink`] bound to the task.

use crate::error::{Error, Result};
use crate::progress::speed::SpeedEstimator;
use crate::task::{ItemError, TaskId, TaskKind, TaskRegistry, TaskStatus, TransferItem};
use crate::transfer::engine::remove_partial;
use crate::transfer::{with_retry, Progress, ProgressSink, RetryPolicy, TransferEngine};
use crate::verify;

use std::error::Error as StdError;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a batch treats existing artifacts and failed items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Do not fetch items whose destination already holds the artifact.
    pub skip_existing: bool,
    /// Stop the whole batch at the first failed item.
    pub fail_fast: bool,
    /// Hash finished artifacts that carry an expected SHA-256.
    pub verify_checksums: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            skip_existing: true,
            fail_fast: false,
            verify_checksums: true,
        }
    }
}

/// Overall progress after `index` finished items plus `item_progress`
/// percent of the current one, out of `count` items.
///
/// Rounded to the nearest percent and held at 99 until the last item is
/// done, so 100 is only ever reported for a finished task.
pub fn aggregate_progress(index: usize, item_progress: u8, count: usize) -> u8 {
    if count == 0 {
        return 100;
    }
    let item = f64::from(item_progress.min(100)) / 100.0;
    let value = ((index as f64 + item) / count as f64 * 100.0).round();
    let value = value.clamp(0.0, 100.0) as u8;
    let finished = index + 1 >= count && item_progress >= 100;
    if finished {
        value
    } else {
        value.min(99)
    }
}

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Fetched,
    Skipped,
}

/// Feeds engine progress into the task record.
struct TaskProgress<'a> {
    registry: &'a TaskRegistry,
    id: &'a TaskId,
    index: usize,
    count: usize,
    speed: SpeedEstimator,
}

impl ProgressSink for TaskProgress<'_> {
    fn on_progress(&mut self, progress: Progress) {
        let speed = self.speed.sample(progress.downloaded, Instant::now());
        let item_progress = progress.percent.unwrap_or(0);
        // The last percent is reached by the transition, not by the stream.
        let aggregate = aggregate_progress(self.index, item_progress.min(99), self.count);
        let index = self.index;
        self.registry.update(self.id, |task| {
            task.current_item_progress = item_progress;
            task.downloaded_bytes = progress.downloaded;
            task.total_bytes = progress.total;
            task.speed_bytes_per_sec = speed;
            task.aggregate_progress = aggregate;
            if let Some(item) = task.items.get_mut(index) {
                if progress.total.is_some() {
                    item.expected_size = progress.total;
                }
            }
        });
    }
}

/// Runs tasks of the registry one item after the other.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    engine: TransferEngine,
    registry: TaskRegistry,
    retry: RetryPolicy,
    options: BatchOptions,
}

impl Orchestrator {
    /// Creates an orchestrator.
    pub fn new(
        engine: TransferEngine,
        registry: TaskRegistry,
        retry: RetryPolicy,
        options: BatchOptions,
    ) -> Self {
        Self {
            engine,
            registry,
            retry,
            options,
        }
    }

    /// Gets the registry the orchestrator reports into.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Gets the transfer engine.
    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    /// Gets the batch options.
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Processes the task from its current item to the end.
    ///
    /// Returns the status the task was left in. A task that is terminal or
    /// already has a run in flight is left alone and its status returned.
    pub async fn run(&self, id: &TaskId) -> Result<TaskStatus> {
        let Some(cancel) = self.registry.begin_run(id) else {
            return self
                .registry
                .get(id)
                .map(|task| task.status)
                .ok_or_else(|| Error::TaskNotFound(id.to_string()));
        };
        let task = self
            .registry
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        let count = task.items.len();
        let fail_fast = self.options.fail_fast || task.kind != TaskKind::BatchDownload;
        let retry = match task.max_attempts {
            Some(max_attempts) => self.retry.clone().with_max_attempts(max_attempts),
            None => self.retry.clone(),
        };
        info!(
            "Running task {} from item {} of {}",
            id, task.current_index, count
        );

        for index in task.current_index..count {
            let item = &task.items[index];
            if cancel.is_cancelled() {
                return self.stop(id, item).await;
            }

            let expected = item.expected_size;
            self.registry.update(id, |task| {
                task.current_index = index;
                task.current_item_progress = 0;
                task.downloaded_bytes = 0;
                task.total_bytes = expected;
                task.speed_bytes_per_sec = 0.0;
                task.aggregate_progress = aggregate_progress(index, 0, count);
            });

            match self.process(id, index, count, item, &retry, &cancel).await {
                Ok(outcome) => {
                    debug!("Item {} of task {}: {:?}", index, id, outcome);
                    self.registry.update(id, |task| {
                        task.current_item_progress = 100;
                        task.speed_bytes_per_sec = 0.0;
                        task.aggregate_progress = aggregate_progress(index + 1, 0, count);
                    });
                }
                Err(e) if e.is_cancellation() => return self.stop(id, item).await,
                Err(e) => {
                    let message = describe(&e);
                    error!(
                        "Item {} of task {} ({}) failed: {}",
                        index, id, item.source_url, message
                    );
                    if fail_fast {
                        self.registry.fail(id, message);
                        return Ok(TaskStatus::Error);
                    }
                    let source_url = item.source_url.to_string();
                    self.registry.update(id, |task| {
                        task.item_errors.push(ItemError {
                            index,
                            source_url,
                            message,
                        });
                        task.speed_bytes_per_sec = 0.0;
                        task.aggregate_progress = aggregate_progress(index + 1, 0, count);
                    });
                }
            }
        }

        self.registry.complete(id);
        Ok(TaskStatus::Completed)
    }

    async fn process(
        &self,
        id: &TaskId,
        index: usize,
        count: usize,
        item: &TransferItem,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome> {
        if self.options.skip_existing && verify::is_present(item).await? {
            info!(
                "Skipping {}, {:?} already exists",
                item.source_url, item.destination_path
            );
            return Ok(ItemOutcome::Skipped);
        }

        let outcome = with_retry(retry, cancel, |attempt| {
            self.registry.update(id, |task| {
                if let Some(item) = task.items.get_mut(index) {
                    item.attempt_count += 1;
                }
            });
            debug!("Attempt {} for {}", attempt, item.source_url);
            async move {
                let mut sink = TaskProgress {
                    registry: &self.registry,
                    id,
                    index,
                    count,
                    speed: SpeedEstimator::new(),
                };
                self.engine
                    .transfer(&item.source_url, &item.destination_path, &mut sink, cancel)
                    .await
            }
        })
        .await?;

        if let Some(expected) = item
            .expected_sha256
            .as_deref()
            .filter(|_| self.options.verify_checksums)
        {
            if let Err(e) = verify::verify_sha256(&outcome.path, expected).await {
                warn!("Discarding {:?}: {}", outcome.path, e);
                remove_partial(&outcome.path).await?;
                return Err(e);
            }
        }
        info!(
            "Fetched {} into {:?} ({} bytes, resumed from {})",
            item.source_url, outcome.path, outcome.bytes, outcome.resumed_from
        );
        Ok(ItemOutcome::Fetched)
    }

    /// Final transition after the run observed its cancellation token.
    async fn stop(&self, id: &TaskId, item: &TransferItem) -> Result<TaskStatus> {
        let task = self
            .registry
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        if task.pause_requested {
            self.registry.mark_paused(id);
            return Ok(TaskStatus::Pending);
        }
        if task.discard_partial {
            let partial = self.engine.partial_path(&item.destination_path);
            if let Err(e) = remove_partial(&partial).await {
                warn!("Could not discard {:?}: {}", partial, describe(&e));
            } else {
                debug!("Discarded {:?}", partial);
            }
        }
        self.registry.mark_canceled(id);
        Ok(TaskStatus::Canceled)
    }
}

/// The error with its source chain, for task records and logs.
pub(crate) fn describe(err: &Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
