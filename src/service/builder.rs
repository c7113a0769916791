//! Builder for [`TransferService`].
//!
//! # Examples
//!
//! ```rust
//! use comfy_fetch::service::TransferServiceBuilder;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), comfy_fetch::Error> {
//! let service = TransferServiceBuilder::new()
//!     .max_attempts(5)
//!     .retry_delay(Duration::from_secs(1))
//!     .read_timeout(Duration::from_secs(30))
//!     .on_finish(|snapshot| println!("{} -> {:?}", snapshot.task_id, snapshot.status))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use super::config::ServiceConfig;
use super::service::TransferService;
use crate::error::Result;
use crate::task::{TaskRegistry, TaskSnapshot};

use reqwest::header::{HeaderMap, HeaderValue, IntoHeaderName};
use reqwest::Proxy;
use std::sync::Arc;
use std::time::Duration;

/// A builder used to create a [`TransferService`].
#[derive(Debug, Default)]
pub struct TransferServiceBuilder {
    config: ServiceConfig,
    registry: Option<TaskRegistry>,
}

impl TransferServiceBuilder {
    /// Creates a builder with the default options.
    pub fn new() -> Self {
        TransferServiceBuilder::default()
    }

    /// Starts from a complete configuration.
    pub fn with_config(config: ServiceConfig) -> Self {
        Self {
            config,
            registry: None,
        }
    }

    /// Shares an existing registry instead of creating one.
    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the deadline for establishing a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.connect_timeout = timeout;
        self
    }

    /// Set the transport-level retries of the HTTP client.
    ///
    /// Whole transfers are retried by the service regardless; this only
    /// enables `reqwest-retry` underneath.
    pub fn request_retries(mut self, retries: u32) -> Self {
        self.config.http.request_retries = retries;
        self
    }

    /// Route every request through `proxy`.
    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.config.http.proxy = Some(proxy);
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    /// Add default headers.
    ///
    /// Calling `.headers()` several times merges the maps.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut new = self.config.http.headers.take().unwrap_or_default();
        new.extend(headers);
        self.config.http.headers = Some(new);
        self
    }

    /// Add one default header, e.g. an `Authorization` token for a model host.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        let mut new = self.config.http.headers.take().unwrap_or_default();
        new.insert(name, value);
        self.config.http.headers = Some(new);
        self
    }

    /// Set the maximum number of redirect hops per attempt.
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.engine.max_redirects = max_redirects;
        self
    }

    /// Set the deadline for receiving response headers.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.response_timeout = timeout;
        self
    }

    /// Set the longest silence tolerated between two body chunks.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.read_timeout = timeout;
        self
    }

    /// Set the suffix of partial files.
    pub fn partial_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.engine.partial_suffix = suffix.into();
        self
    }

    /// Set the number of attempts per item.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self
    }

    /// Set the pause between two attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.delay = delay;
        self
    }

    /// Set whether items whose artifact already exists are skipped.
    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.config.batch.skip_existing = skip;
        self
    }

    /// Set whether a batch stops at its first failed item.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.config.batch.fail_fast = fail_fast;
        self
    }

    /// Set whether finished artifacts are checked against their SHA-256.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.batch.verify_checksums = verify;
        self
    }

    /// Set callback for when a spawned run ends.
    ///
    /// The callback receives the last snapshot of the task, whatever the
    /// outcome: completed, failed, canceled or paused.
    pub fn on_finish<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskSnapshot) + Send + Sync + 'static,
    {
        self.config.on_finish = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Create the [`TransferService`] with the specified options.
    pub fn build(self) -> Result<TransferService> {
        TransferService::new(self.config, self.registry.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, USER_AGENT};

    #[test]
    fn test_headers_are_merged() {
        let builder = TransferServiceBuilder::new()
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer token"))
            .headers(HeaderMap::from_iter([(
                USER_AGENT,
                HeaderValue::from_static("console/1.0"),
            )]));
        let headers = builder.config.http.headers.unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[AUTHORIZATION], "Bearer token");
    }

    #[test]
    fn test_setters() {
        let builder = TransferServiceBuilder::new()
            .max_attempts(5)
            .retry_delay(Duration::from_millis(10))
            .partial_suffix(".tmp")
            .skip_existing(false)
            .fail_fast(true);
        assert_eq!(builder.config.retry.max_attempts, 5);
        assert_eq!(builder.config.retry.delay, Duration::from_millis(10));
        assert_eq!(builder.config.engine.partial_suffix, ".tmp");
        assert!(!builder.config.batch.skip_existing);
        assert!(builder.config.batch.fail_fast);
    }

    #[test]
    fn test_build() {
        assert!(TransferServiceBuilder::new().build().is_ok());
    }
}
