//! Single-file transfers.
//!
//! - [`engine`] - one resumable HTTP(S) download attempt
//! - [`retry`] - bounded retries of whole attempts
//! - [`progress`] - progress reports and the sink they are pushed into
//!
//! # Example
//!
//! ```rust,no_run
//! use comfy_fetch::http::{create_http_client, HttpClientConfig};
//! use comfy_fetch::transfer::{with_retry, EngineConfig, Progress, RetryPolicy, TransferEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TransferEngine::new(
//!     create_http_client(HttpClientConfig::default())?,
//!     EngineConfig::default(),
//! );
//! let url = reqwest::Url::parse("https://example.com/ckpt/model.safetensors")?;
//! let cancel = CancellationToken::new();
//! let outcome = with_retry(&RetryPolicy::default(), &cancel, |_attempt| {
//!     let engine = engine.clone();
//!     let url = url.clone();
//!     let cancel = cancel.clone();
//!     async move {
//!         let mut sink = |p: Progress| println!("{:?}%", p.percent);
//!         engine
//!             .transfer(&url, "models/model.safetensors".as_ref(), &mut sink, &cancel)
//!             .await
//!     }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod progress;
pub mod retry;

pub use engine::{partial_path, EngineConfig, TransferEngine, TransferOutcome, PARTIAL_SUFFIX};
pub use progress::{NoProgress, Progress, ProgressSink};
pub use retry::{with_retry, RetryPolicy};
