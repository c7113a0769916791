//! Configuration structures and defaults for the transfer service.
//!
//! [`ServiceConfig`] groups the settings of every layer the service wires
//! together. It is normally filled in through
//! [`TransferServiceBuilder`](super::TransferServiceBuilder).
//!
//! # Examples
//!
//! ## Using Callbacks
//!
//! ```rust
//! use comfy_fetch::service::FinishCallback;
//! use comfy_fetch::task::{TaskSnapshot, TaskStatus};
//!
//! let callback: FinishCallback = Box::new(|snapshot: &TaskSnapshot| {
//!     match snapshot.status {
//!         TaskStatus::Completed => println!("✓ {} done", snapshot.task_id),
//!         TaskStatus::Error => println!("✗ {} failed: {:?}", snapshot.task_id, snapshot.error),
//!         _ => println!("• {} stopped", snapshot.task_id),
//!     }
//! });
//! ```

use crate::batch::BatchOptions;
use crate::http::HttpClientConfig;
use crate::task::TaskSnapshot;
use crate::transfer::{EngineConfig, RetryPolicy};

use std::sync::Arc;

/// Callback type for finished runs.
pub type FinishCallback = Box<dyn Fn(&TaskSnapshot) + Send + Sync>;

/// Configuration structure for the transfer service.
#[derive(Clone, Default)]
pub struct ServiceConfig {
    /// HTTP client setup.
    pub http: HttpClientConfig,
    /// Per-attempt transfer settings.
    pub engine: EngineConfig,
    /// Attempts per item and the pause between them.
    pub retry: RetryPolicy,
    /// Skip, failure and verification policy of batches.
    pub batch: BatchOptions,
    /// Callback for when a spawned run ends.
    pub on_finish: Option<Arc<FinishCallback>>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("http", &self.http)
            .field("engine", &self.engine)
            .field("retry", &self.retry)
            .field("batch", &self.batch)
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.engine.max_redirects, 5);
        assert_eq!(config.engine.read_timeout, Duration::from_secs(60));
        assert_eq!(config.engine.partial_suffix, ".part");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_secs(3));
        assert!(config.batch.skip_existing);
        assert!(config.on_finish.is_none());
    }

    #[test]
    fn test_debug_hides_callback() {
        let config = ServiceConfig {
            on_finish: Some(Arc::new(Box::new(|_: &TaskSnapshot| {}))),
            ..ServiceConfig::default()
        };
        assert!(format!("{:?}", config).contains("on_finish: true"));
    }
}
