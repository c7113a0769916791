//! comfy-fetch is a crate providing resumable, cancelable HTTP(S) downloads
//! tracked as pollable tasks, the way a ComfyUI console fetches models and
//! custom nodes.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use comfy_fetch::{DownloadRequest, Error, TaskStatus, TransferService};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Error> {
//! let service = TransferService::builder().build()?;
//! let id = service.download(DownloadRequest::new(
//!     "https://huggingface.co/stabilityai/sdxl-vae/resolve/main/sdxl_vae.safetensors",
//!     "models/vae/sdxl_vae.safetensors",
//! ))?;
//!
//! while let Some(snapshot) = service.poll(&id) {
//!     if snapshot.status.is_terminal() {
//!         assert_eq!(snapshot.status, TaskStatus::Completed);
//!         break;
//!     }
//!     tokio::time::sleep(Duration::from_millis(500)).await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`transfer`] - single resumable transfer attempts and bounded retries
//! - [`task`] - task records, snapshots and the registry
//! - [`batch`] - sequential processing of a task's items
//! - [`service`] - the `TransferService` entry point and its builder
//! - [`progress`] - speed estimation and terminal display
//! - [`verify`] - checks on finished artifacts
//! - [`error`] - centralized error handling with the `Error` enum
//! - [`http`] - HTTP client construction
//! - [`utils`] - header parsing helpers

pub mod batch;
pub mod error;
pub mod http;
pub mod progress;
pub mod service;
pub mod task;
pub mod transfer;
pub mod utils;
pub mod verify;

pub use batch::{BatchOptions, Orchestrator};
pub use error::{Error, Result};
pub use http::{create_http_client, HttpClientConfig};
pub use progress::{ProgressBarOpts, SpeedEstimator, StyleOptions, TaskDisplay};
pub use service::{BatchRequest, DownloadRequest, TransferService, TransferServiceBuilder};
pub use task::{
    CancelAck, TaskId, TaskKind, TaskRegistry, TaskSnapshot, TaskStatus, TransferItem,
};
pub use transfer::{EngineConfig, Progress, ProgressSink, RetryPolicy, TransferEngine};
