//! The transfer service: the single entry point for downloads and polling.
//!
//! Requests create (or find) a task in the registry and spawn a background
//! run of the [`Orchestrator`] for it. Callers then poll snapshots by id.
//!
//! # Examples
//!
//! ```rust,no_run
//! use comfy_fetch::service::{DownloadRequest, TransferService};
//!
//! # async fn example() -> Result<(), comfy_fetch::Error> {
//! let service = TransferService::builder().build()?;
//! let id = service.download(DownloadRequest::new(
//!     "https://example.com/vae/ae.safetensors",
//!     "models/vae/ae.safetensors",
//! ))?;
//!
//! if let Some(snapshot) = service.poll(&id) {
//!     println!("{}% ({:?})", snapshot.overall_progress, snapshot.status);
//! }
//! # Ok(())
//! # }
//! ```

use super::builder::TransferServiceBuilder;
use super::config::{FinishCallback, ServiceConfig};
use crate::batch::orchestrator::{describe, Orchestrator};
use crate::error::{Error, Result};
use crate::http::create_http_client;
use crate::task::{CancelAck, TaskId, TaskKind, TaskRegistry, TaskSnapshot, TaskStatus, TransferItem};
use crate::transfer::engine::remove_partial_now;
use crate::transfer::TransferEngine;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// A request to fetch one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// HTTP(S) URL of the file.
    pub source_url: String,
    /// Final location of the file.
    pub destination_path: PathBuf,
    /// Reuse this id, e.g. to resume a download after a restart.
    pub task_id: Option<TaskId>,
    /// Override of the configured attempt budget.
    pub max_attempts: Option<u32>,
}

impl DownloadRequest {
    /// A request with a fresh task id and the default attempt budget.
    pub fn new(source_url: impl Into<String>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_path: destination_path.into(),
            task_id: None,
            max_attempts: None,
        }
    }

    /// Run under `task_id`.
    pub fn with_task_id(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Override the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// A request to fetch several files under one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Callers using the same alias converge on one task.
    pub alias: Option<String>,
    pub kind: TaskKind,
    pub items: Vec<TransferItem>,
    pub max_attempts: Option<u32>,
}

impl BatchRequest {
    /// A batch download of `items`.
    pub fn new(items: Vec<TransferItem>) -> Self {
        Self {
            alias: None,
            kind: TaskKind::BatchDownload,
            items,
            max_attempts: None,
        }
    }

    /// Register the task under `alias`.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Track the batch as another kind of task.
    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Override the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

struct Inner {
    orchestrator: Orchestrator,
    on_finish: Option<Arc<FinishCallback>>,
    // Serializes task admission so alias lookups and creation do not race.
    admission: Mutex<()>,
}

/// Resumable, pollable file transfers.
///
/// Cheap to clone; clones share the registry and the HTTP client.
#[derive(Clone)]
pub struct TransferService {
    inner: Arc<Inner>,
}

impl fmt::Debug for TransferService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferService")
            .field("orchestrator", &self.inner.orchestrator)
            .field("on_finish", &self.inner.on_finish.is_some())
            .finish()
    }
}

impl TransferService {
    /// Creates a builder with the default options.
    pub fn builder() -> TransferServiceBuilder {
        TransferServiceBuilder::new()
    }

    pub(crate) fn new(config: ServiceConfig, registry: TaskRegistry) -> Result<Self> {
        let client = create_http_client(config.http)?;
        let engine = TransferEngine::new(client, config.engine);
        let orchestrator = Orchestrator::new(engine, registry, config.retry, config.batch);
        Ok(Self {
            inner: Arc::new(Inner {
                orchestrator,
                on_finish: config.on_finish,
                admission: Mutex::new(()),
            }),
        })
    }

    /// Gets the task registry.
    pub fn registry(&self) -> &TaskRegistry {
        self.inner.orchestrator.registry()
    }

    /// Starts fetching one file in the background and returns its task id.
    ///
    /// With a `task_id` that names a pending or running task, that task is
    /// resumed instead; a finished task under that id is replaced. The
    /// partial file on disk is picked up either way.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn download(&self, request: DownloadRequest) -> Result<TaskId> {
        let item = TransferItem::parse(&request.source_url, request.destination_path)?;
        let registry = self.registry();

        let id = {
            let _admission = self.admit()?;
            let id = request.task_id.unwrap_or_else(TaskId::generate);
            if registry.remove_finished(&id).is_some() {
                debug!("Replacing finished task {}", id);
            }
            if registry.create_with_id(id.clone(), TaskKind::SingleDownload, vec![item.clone()]) {
                registry.update(&id, |task| task.max_attempts = request.max_attempts);
            } else if let Some(task) = registry.get(&id) {
                let same_item = task.items.first().is_some_and(|existing| {
                    existing.source_url == item.source_url
                        && existing.destination_path == item.destination_path
                });
                if !same_item || task.max_attempts != request.max_attempts {
                    warn!(
                        "Task {} already exists; resuming it as recorded and ignoring {} -> {:?} (max attempts {:?})",
                        id, item.source_url, item.destination_path, request.max_attempts
                    );
                } else {
                    info!("Resuming task {}", id);
                }
            }
            id
        };

        self.spawn(id.clone());
        Ok(id)
    }

    /// Starts fetching several files under one task in the background.
    ///
    /// When `alias` already names a pending or running task, no new task is
    /// created: a pending one is started and its id returned. Otherwise a
    /// new task is created and the alias is pointed at it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn download_batch(&self, request: BatchRequest) -> Result<TaskId> {
        let registry = self.registry();

        let id = {
            let _admission = self.admit()?;
            let existing = request
                .alias
                .as_deref()
                .and_then(|alias| registry.resolve(alias))
                .filter(|id| registry.get(id).is_some_and(|task| !task.is_terminal()));

            match existing {
                Some(id) => {
                    info!("Joining task {} for {:?}", id, request.alias);
                    id
                }
                None => {
                    let id = registry.create(request.kind, request.items);
                    registry.update(&id, |task| task.max_attempts = request.max_attempts);
                    if let Some(alias) = &request.alias {
                        registry.alias(alias, &id);
                    }
                    id
                }
            }
        };

        self.spawn(id.clone());
        Ok(id)
    }

    /// Runs the task in the foreground until it stops.
    pub async fn run(&self, id: &TaskId) -> Result<TaskStatus> {
        self.inner.orchestrator.run(id).await
    }

    /// Snapshot of the task, `None` if the id is unknown.
    pub fn poll(&self, id: &TaskId) -> Option<TaskSnapshot> {
        self.registry().snapshot(id)
    }

    /// Snapshot of the task registered under `alias`.
    pub fn poll_alias(&self, alias: &str) -> Option<TaskSnapshot> {
        self.registry()
            .resolve(alias)
            .and_then(|id| self.poll(&id))
    }

    /// Requests cancellation; the partial file is kept.
    pub fn cancel(&self, id: &TaskId) -> CancelAck {
        self.registry().cancel(id)
    }

    /// Requests cancellation and deletion of the partial file.
    ///
    /// A run in flight deletes the partial file when it stops. For a pending
    /// task, paused ones included, it is deleted here before returning.
    pub fn cancel_with_discard(&self, id: &TaskId) -> CancelAck {
        let (ack, idle_item) = self.registry().discard(id);
        if let Some(item) = idle_item {
            let partial = self
                .inner
                .orchestrator
                .engine()
                .partial_path(&item.destination_path);
            match remove_partial_now(&partial) {
                Ok(()) => debug!("Discarded {:?}", partial),
                Err(e) => warn!("Could not discard {:?}: {}", partial, describe(&e)),
            }
        }
        ack
    }

    /// Stops a running task and returns it to pending.
    pub fn pause(&self, id: &TaskId) -> bool {
        self.registry().pause(id)
    }

    fn admit(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.inner
            .admission
            .lock()
            .map_err(|_| Error::Internal("task admission lock poisoned".into()))
    }

    fn spawn(&self, id: TaskId) {
        let service = self.clone();
        let run_id = id.clone();
        let handle = tokio::spawn(async move { service.run(&run_id).await });

        let service = self.clone();
        tokio::spawn(async move {
            let status = match handle.await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    let message = describe(&e);
                    error!("Task {} stopped: {}", id, message);
                    service.registry().fail(&id, message);
                    TaskStatus::Error
                }
                Err(e) => {
                    let err = Error::Internal(e.to_string());
                    error!("Task {} aborted: {}", id, err);
                    service.registry().fail(&id, err.to_string());
                    TaskStatus::Error
                }
            };

            // A run that found another run in flight reports nothing.
            if status == TaskStatus::Running {
                return;
            }
            if let (Some(callback), Some(snapshot)) = (&service.inner.on_finish, service.poll(&id)) {
                callback(&snapshot);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_fails_fast() {
        let service = TransferService::builder().build().unwrap();
        let result = service.download(DownloadRequest::new("ftp://example.com/a.bin", "a.bin"));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        assert!(service.registry().list().is_empty());
    }

    #[tokio::test]
    async fn test_poll_unknown() {
        let service = TransferService::builder().build().unwrap();
        assert!(service.poll(&TaskId::from("unknown")).is_none());
        assert!(!service.cancel(&TaskId::from("unknown")).accepted);
        assert!(!service.pause(&TaskId::from("unknown")));
    }

    #[test]
    fn test_request_builders() {
        let request = DownloadRequest::new("https://example.com/a.bin", "/tmp/a.bin")
            .with_task_id("resume-me")
            .with_max_attempts(1);
        assert_eq!(request.task_id, Some(TaskId::from("resume-me")));
        assert_eq!(request.max_attempts, Some(1));

        let batch = BatchRequest::new(vec![])
            .with_alias("essential-models")
            .with_kind(TaskKind::PluginInstall);
        assert_eq!(batch.alias.as_deref(), Some("essential-models"));
        assert_eq!(batch.kind, TaskKind::PluginInstall);
    }
}
