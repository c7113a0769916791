//! Task and item records kept by the registry, and the snapshot callers poll.

use crate::error::{Error, Result};
use crate::transfer::engine::partial_path;

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Opaque, caller-visible task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What a task was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// One model or asset.
    SingleDownload,
    /// Several assets under one task, e.g. the essential models.
    BatchDownload,
    /// A custom node install.
    PluginInstall,
    /// A custom node removal.
    PluginUninstall,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, or stopped by a pause; a run will pick it up.
    Pending,
    /// A run is in flight.
    Running,
    /// Every item was processed.
    Completed,
    /// The task failed.
    Error,
    /// The task was canceled.
    Canceled,
}

impl TaskStatus {
    /// Terminal tasks never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Canceled
        )
    }
}

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    /// Where to fetch it from.
    pub source_url: Url,
    /// Where it ends up.
    pub destination_path: PathBuf,
    /// Declared size, filled in from the server headers.
    pub expected_size: Option<u64>,
    /// Optional lowercase hex SHA-256 of the finished artifact.
    pub expected_sha256: Option<String>,
    /// Attempts made so far.
    pub attempt_count: u32,
}

impl TransferItem {
    /// An item fetching `source_url` into `destination_path`.
    pub fn new(source_url: Url, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            source_url,
            destination_path: destination_path.into(),
            expected_size: None,
            expected_sha256: None,
            attempt_count: 0,
        }
    }

    /// Parses `source_url` and builds an item; only http(s) is accepted.
    pub fn parse(source_url: &str, destination_path: impl Into<PathBuf>) -> Result<Self> {
        let url = Url::parse(source_url).map_err(|e| {
            Error::InvalidUrl(format!("The url \"{}\" cannot be parsed: {}", source_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "The url \"{}\" is not an HTTP(S) url",
                source_url
            )));
        }
        Ok(Self::new(url, destination_path))
    }

    /// Builds an item saving into `directory` under the URL's last path segment.
    pub fn from_url(source_url: &Url, directory: &Path) -> Result<Self> {
        let filename = source_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .filter(|name| !name.is_empty() && name != "." && name != "..")
            .filter(|name| !name.contains(['/', '\\']))
            .ok_or_else(|| {
                Error::InvalidUrl(format!("The url \"{}\" does not contain a filename", source_url))
            })?;
        Ok(Self::new(source_url.clone(), directory.join(filename)))
    }

    /// Attach an expected digest.
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.expected_sha256 = Some(sha256.into().to_ascii_lowercase());
        self
    }

    /// Path of the partial file for this item.
    pub fn partial_path(&self, suffix: &str) -> PathBuf {
        partial_path(&self.destination_path, suffix)
    }
}

/// A failed item, kept in the task's error ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    /// Index of the item in the task.
    pub index: usize,
    /// Source URL of the item.
    pub source_url: String,
    /// Error message.
    pub message: String,
}

/// A pollable record of one download, install or uninstall request.
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub items: Vec<TransferItem>,
    pub current_index: usize,
    pub aggregate_progress: u8,
    pub current_item_progress: u8,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed_bytes_per_sec: f64,
    pub error: Option<String>,
    pub item_errors: Vec<ItemError>,
    /// Per-task override of the retry budget.
    pub max_attempts: Option<u32>,
    pub cancel_requested: bool,
    /// The stop in flight is a pause: return to `Pending` rather than `Canceled`.
    pub pause_requested: bool,
    /// Delete the current item's partial file when the cancellation lands.
    pub discard_partial: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl TransferTask {
    /// A pending task.
    pub fn new(id: TaskId, kind: TaskKind, items: Vec<TransferItem>) -> Self {
        Self {
            id,
            kind,
            status: TaskStatus::Pending,
            items,
            current_index: 0,
            aggregate_progress: 0,
            current_item_progress: 0,
            downloaded_bytes: 0,
            total_bytes: None,
            speed_bytes_per_sec: 0.0,
            error: None,
            item_errors: Vec::new(),
            max_attempts: None,
            cancel_requested: false,
            pause_requested: false,
            discard_partial: false,
            started_at: None,
            last_updated_at: Utc::now(),
        }
    }

    /// Whether the task reached a final state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time left for the current item at the current speed.
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total_bytes?;
        if self.speed_bytes_per_sec <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.downloaded_bytes) as f64;
        Some(Duration::from_secs_f64(remaining / self.speed_bytes_per_sec))
    }

    /// The poll shape of this task.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id.clone(),
            kind: self.kind,
            status: self.status,
            overall_progress: self.aggregate_progress,
            current_index: self.current_index,
            item_count: self.items.len(),
            current_item_progress: self.current_item_progress,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes.unwrap_or(0),
            speed_bytes_per_sec: self.speed_bytes_per_sec,
            eta_seconds: self.eta().map(|d| d.as_secs_f64()),
            error: self.error.clone(),
            item_errors: self.item_errors.clone(),
        }
    }
}

/// What polling callers see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub overall_progress: u8,
    pub current_index: usize,
    pub item_count: usize,
    pub current_item_progress: u8,
    pub downloaded_bytes: u64,
    /// 0 when the size is unknown.
    pub total_bytes: u64,
    pub speed_bytes_per_sec: f64,
    pub eta_seconds: Option<f64>,
    pub error: Option<String>,
    pub item_errors: Vec<ItemError>,
}

/// Answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    /// `false` only when the task id is unknown.
    pub accepted: bool,
}
