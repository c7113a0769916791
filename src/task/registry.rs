//! Task registry: the single owner of task records.
//!
//! Every mutation goes through [`TaskRegistry::update`] (or one of the
//! transition helpers built on it), which enforces two rules: a terminal
//! task is never modified again, and the aggregate progress of a running
//! task never goes down.
//!
//! Cancellation is cooperative. The registry flips flags on the record and
//! fires the [`CancellationToken`] of the run in flight; the orchestrator
//! observes it between chunks and performs the final transition.

use super::model::{CancelAck, TaskId, TaskKind, TaskSnapshot, TaskStatus, TransferItem, TransferTask};
use super::store::{MemoryTaskStore, TaskStore};

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Cancel { discard: bool },
    Pause,
}

/// What a stop request found and changed.
#[derive(Debug)]
struct StopOutcome {
    found: bool,
    applied: bool,
    in_flight: bool,
    /// Current item of a task canceled with discard while no run was in flight.
    idle_item: Option<TransferItem>,
}

impl StopOutcome {
    fn ack(&self) -> CancelAck {
        CancelAck {
            accepted: self.found,
        }
    }
}

/// Shared, clonable registry of transfer tasks.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
    tokens: Arc<DashMap<TaskId, CancellationToken>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// A registry backed by [`MemoryTaskStore`].
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryTaskStore::new()))
    }

    /// A registry backed by a custom store.
    pub fn with_store(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            tokens: Arc::new(DashMap::new()),
        }
    }

    /// Allocates a pending task with a fresh id.
    pub fn create(&self, kind: TaskKind, items: Vec<TransferItem>) -> TaskId {
        let id = TaskId::generate();
        self.create_with_id(id.clone(), kind, items);
        id
    }

    /// Allocates a pending task under a caller-chosen id.
    ///
    /// Returns `false` and leaves the existing record alone if the id is taken.
    pub fn create_with_id(&self, id: TaskId, kind: TaskKind, items: Vec<TransferItem>) -> bool {
        let inserted = self
            .store
            .insert_if_absent(TransferTask::new(id.clone(), kind, items));
        if inserted {
            debug!("Created {:?} task {}", kind, id);
        }
        inserted
    }

    /// A copy of the task record.
    pub fn get(&self, id: &TaskId) -> Option<TransferTask> {
        self.store.get(id)
    }

    /// The poll shape of the task.
    pub fn snapshot(&self, id: &TaskId) -> Option<TaskSnapshot> {
        self.store.get(id).map(|task| task.snapshot())
    }

    /// Snapshots of every known task.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        self.store
            .ids()
            .iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    /// Merges changes into a task.
    ///
    /// Unknown ids are a no-op (logged, since the caller probably holds a
    /// stale id). Terminal tasks are left untouched. Returns whether `f` ran.
    pub fn update<F>(&self, id: &TaskId, f: F) -> bool
    where
        F: FnOnce(&mut TransferTask),
    {
        let mut f = Some(f);
        let mut applied = false;
        let found = self.store.modify(id, &mut |task: &mut TransferTask| {
            if task.is_terminal() {
                return;
            }
            let Some(f) = f.take() else { return };
            let was_running = task.status == TaskStatus::Running;
            let floor = task.aggregate_progress;
            f(task);
            if was_running && task.status == TaskStatus::Running && task.aggregate_progress < floor {
                task.aggregate_progress = floor;
            }
            task.last_updated_at = Utc::now();
            applied = true;
        });
        if !found {
            warn!("Update for unknown task {}", id);
        }
        applied
    }

    /// Lets `name` resolve to `id`.
    pub fn alias(&self, name: &str, id: &TaskId) {
        self.store.set_alias(name, id.clone());
    }

    /// The task currently known under `name`.
    pub fn resolve(&self, name: &str) -> Option<TaskId> {
        self.store.alias(name)
    }

    /// Requests cancellation; the partial file is kept for a later resume.
    pub fn cancel(&self, id: &TaskId) -> CancelAck {
        self.request_stop(id, Stop::Cancel { discard: false }).ack()
    }

    /// Requests cancellation and deletion of the current item's partial file.
    ///
    /// Only a run in flight deletes the partial file; for a task without one
    /// use [`TransferService::cancel_with_discard`](crate::TransferService::cancel_with_discard),
    /// or [`TaskRegistry::discard`] and remove the returned item's partial.
    pub fn cancel_with_discard(&self, id: &TaskId) -> CancelAck {
        self.discard(id).0
    }

    /// Like [`TaskRegistry::cancel_with_discard`], also returning the current
    /// item when the task was canceled without a run in flight.
    ///
    /// The caller deletes that item's partial file.
    pub fn discard(&self, id: &TaskId) -> (CancelAck, Option<TransferItem>) {
        let outcome = self.request_stop(id, Stop::Cancel { discard: true });
        (outcome.ack(), outcome.idle_item)
    }

    /// Stops a running task at the next chunk and returns it to `Pending`.
    ///
    /// Returns `true` only when a run was in flight and is now pausing;
    /// unknown, pending, terminal and already canceling tasks give `false`.
    pub fn pause(&self, id: &TaskId) -> bool {
        self.request_stop(id, Stop::Pause).applied
    }

    fn request_stop(&self, id: &TaskId, stop: Stop) -> StopOutcome {
        let mut applied = false;
        let mut in_flight_run = false;
        let mut idle_item = None;
        let found = self.store.modify(id, &mut |task: &mut TransferTask| {
            if task.is_terminal() {
                return;
            }
            let in_flight = task.status == TaskStatus::Running;
            match stop {
                Stop::Cancel { discard } => {
                    task.cancel_requested = true;
                    task.pause_requested = false;
                    task.discard_partial |= discard;
                    if !in_flight {
                        task.status = TaskStatus::Canceled;
                        task.speed_bytes_per_sec = 0.0;
                        if discard {
                            idle_item = task.items.get(task.current_index).cloned();
                        }
                    }
                }
                Stop::Pause if in_flight && !task.cancel_requested => {
                    task.cancel_requested = true;
                    task.pause_requested = true;
                }
                Stop::Pause => return,
            }
            task.last_updated_at = Utc::now();
            applied = true;
            in_flight_run = in_flight;
        });
        let outcome = StopOutcome {
            found,
            applied,
            in_flight: in_flight_run,
            idle_item,
        };

        if !outcome.found {
            debug!("Stop requested for unknown task {}", id);
            return outcome;
        }
        if outcome.in_flight {
            if let Some(token) = self.tokens.get(id) {
                token.cancel();
            }
            info!("Stop ({:?}) requested for task {}", stop, id);
        }
        outcome
    }

    /// Marks the task running and hands out the token for this run.
    ///
    /// Returns `None` for unknown or terminal tasks and for tasks that
    /// already have a run in flight.
    pub fn begin_run(&self, id: &TaskId) -> Option<CancellationToken> {
        let token = CancellationToken::new();
        let mut started = false;
        self.store.modify(id, &mut |task: &mut TransferTask| {
            if task.is_terminal() || task.status == TaskStatus::Running {
                return;
            }
            // Token and status change together under the record's lock.
            self.tokens.insert(task.id.clone(), token.clone());
            task.status = TaskStatus::Running;
            task.cancel_requested = false;
            task.pause_requested = false;
            task.discard_partial = false;
            task.speed_bytes_per_sec = 0.0;
            task.started_at.get_or_insert_with(Utc::now);
            task.last_updated_at = Utc::now();
            started = true;
        });
        if !started {
            return None;
        }
        info!("Task {} running", id);
        Some(token)
    }

    /// Marks every item processed.
    pub fn complete(&self, id: &TaskId) -> bool {
        let done = self.update(id, |task| {
            task.status = TaskStatus::Completed;
            task.aggregate_progress = 100;
            task.speed_bytes_per_sec = 0.0;
        });
        self.end_run(id);
        if done {
            info!("Task {} completed", id);
        }
        done
    }

    /// Marks the task failed with `message`.
    pub fn fail(&self, id: &TaskId, message: impl Into<String>) -> bool {
        let message = message.into();
        let done = self.update(id, |task| {
            task.status = TaskStatus::Error;
            task.error = Some(message);
            task.speed_bytes_per_sec = 0.0;
        });
        self.end_run(id);
        done
    }

    /// Marks the task canceled.
    pub fn mark_canceled(&self, id: &TaskId) -> bool {
        let done = self.update(id, |task| {
            task.status = TaskStatus::Canceled;
            task.cancel_requested = true;
            task.speed_bytes_per_sec = 0.0;
        });
        self.end_run(id);
        if done {
            info!("Task {} canceled", id);
        }
        done
    }

    /// Returns a stopped run to `Pending`, keeping its position.
    pub fn mark_paused(&self, id: &TaskId) -> bool {
        let done = self.update(id, |task| {
            task.status = TaskStatus::Pending;
            task.cancel_requested = false;
            task.pause_requested = false;
            task.speed_bytes_per_sec = 0.0;
        });
        self.end_run(id);
        if done {
            info!("Task {} paused at item {}", id, self.get(id).map_or(0, |t| t.current_index));
        }
        done
    }

    fn end_run(&self, id: &TaskId) {
        self.tokens.remove(id);
    }

    /// Drops a terminal task so its id can be reused.
    ///
    /// Pending and running tasks are kept and `None` is returned.
    pub fn remove_finished(&self, id: &TaskId) -> Option<TransferTask> {
        if !self.store.get(id)?.is_terminal() {
            return None;
        }
        self.tokens.remove(id);
        self.store.remove(id)
    }

    /// Drops terminal tasks not updated within `older_than`; returns how many.
    pub fn prune(&self, older_than: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(older_than) else {
            return 0;
        };
        let cutoff = Utc::now() - age;
        let stale: Vec<TaskId> = self
            .store
            .ids()
            .into_iter()
            .filter(|id| {
                self.store
                    .get(id)
                    .is_some_and(|t| t.is_terminal() && t.last_updated_at <= cutoff)
            })
            .collect();
        for id in &stale {
            self.store.remove(id);
            self.tokens.remove(id);
        }
        if !stale.is_empty() {
            debug!("Pruned {} finished tasks", stale.len());
        }
        stale.len()
    }
}
