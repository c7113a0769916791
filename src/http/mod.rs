//! HTTP client construction.
//!
//! - [`client`] - client creation and middleware configuration
//!
//! Header parsing helpers live in [`crate::utils`].

pub mod client;

pub use client::{create_http_client, HttpClientConfig, DEFAULT_USER_AGENT};
