//! HTTP client setup and middleware configuration.
//!
//! The inner reqwest client never follows redirects; the transfer engine
//! follows them itself and bounds the chain.
//!
//! # Features
//!
//! - **Tracing**: every request is wrapped by `reqwest-tracing`
//! - **Transport retries**: optional exponential backoff on request setup,
//!   off by default
//! - **Timeouts**: connect-phase deadline on the client
//! - **Proxy / headers**: optional proxy and default headers
//!
//! # Examples
//!
//! ```rust
//! use comfy_fetch::http::{create_http_client, HttpClientConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = create_http_client(HttpClientConfig::default())?;
//! # Ok(())
//! # }
//! ```

use reqwest::{header::HeaderMap, redirect, Proxy};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use reqwest_tracing::TracingMiddleware;
use std::time::Duration;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("comfy-fetch/", env!("CARGO_PKG_VERSION"));

/// Configuration for HTTP client setup.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Deadline for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Transport-level retries for sending a request (0 disables the middleware).
    pub request_retries: u32,
    /// Optional proxy configuration.
    pub proxy: Option<Proxy>,
    /// Default headers to include with all requests.
    pub headers: Option<HeaderMap>,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_retries: 0,
            proxy: None,
            headers: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Creates an HTTP client with middleware configuration.
///
/// This function sets up a reqwest client with:
/// - Redirects disabled (the engine follows them)
/// - A connect timeout
/// - Tracing middleware for request/response logging
/// - Retry middleware with exponential backoff, when `request_retries > 0`
/// - Optional proxy and default headers
pub fn create_http_client(
    config: HttpClientConfig,
) -> Result<ClientWithMiddleware, reqwest::Error> {
    let mut inner_client_builder = reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent);

    if let Some(proxy) = config.proxy {
        inner_client_builder = inner_client_builder.proxy(proxy);
    }

    if let Some(headers) = config.headers {
        inner_client_builder = inner_client_builder.default_headers(headers);
    }

    let inner_client = inner_client_builder.build()?;

    let mut builder = ClientBuilder::new(inner_client).with(TracingMiddleware::default());
    if config.request_retries > 0 {
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(config.request_retries);
        builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
    }

    Ok(builder.build())
}
