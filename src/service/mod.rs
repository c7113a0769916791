//! The transfer service, its builder and configuration.
//!
//! - `service` - [`TransferService`] with the download, poll and cancel operations
//! - `builder` - [`TransferServiceBuilder`] for configuring the service
//! - `config` - [`ServiceConfig`] and the finish callback type
//!
//! # Examples
//!
//! ```rust,no_run
//! use comfy_fetch::service::{BatchRequest, TransferServiceBuilder};
//! use comfy_fetch::task::TransferItem;
//!
//! # async fn example() -> Result<(), comfy_fetch::Error> {
//! let service = TransferServiceBuilder::new().fail_fast(false).build()?;
//! let items = vec![
//!     TransferItem::parse("https://example.com/vae.safetensors", "models/vae/vae.safetensors")?,
//!     TransferItem::parse("https://example.com/clip.safetensors", "models/clip/clip.safetensors")?,
//! ];
//! let id = service.download_batch(BatchRequest::new(items).with_alias("essential-models"))?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod service;

pub use builder::TransferServiceBuilder;
pub use config::{FinishCallback, ServiceConfig};
pub use service::{BatchRequest, DownloadRequest, TransferService};
