//! Error handling for comfy-fetch.
//!
//! All fallible operations return [`Error`]. Besides carrying context, the
//! variants encode the taxonomy the retry layer acts on: transient network
//! failures are retried, disk failures and definitive HTTP answers are not,
//! and cancellation is not an error condition for the task at all.

use reqwest::StatusCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can happen while transferring files or managing tasks.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from an underlying system.
    ///
    /// Captures internal failures that don't fit into other categories,
    /// such as a background job that panicked.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The provided URL cannot be parsed or is not an HTTP(S) URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No task is registered under the given identifier.
    #[error("Unknown task: {0}")]
    TaskNotFound(String),

    /// The server answered with a status outside 200/206 that is not a redirect.
    #[error("HTTP error {status} for {url}")]
    Http {
        /// Status code returned by the server.
        status: StatusCode,
        /// URL of the request that failed.
        url: String,
    },

    /// Connection level failure: reset, refused, DNS, broken body stream.
    #[error("Network error: {0}")]
    Network(String),

    /// Connect, response or idle read deadline elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A redirect response did not carry a usable `Location` header.
    #[error("Redirect {status} from {url} without a Location header")]
    RedirectWithoutLocation {
        /// Redirect status code.
        status: StatusCode,
        /// URL that answered with the redirect.
        url: String,
    },

    /// More redirect hops than allowed.
    #[error("Too many redirects (limit {limit}) starting at {url}")]
    TooManyRedirects {
        /// Configured hop limit.
        limit: usize,
        /// URL the transfer started from.
        url: String,
    },

    /// A redirect pointed back to a URL already visited.
    #[error("Redirect loop detected at {0}")]
    RedirectLoop(String),

    /// The stream ended without a single byte.
    #[error("Empty response body from {0}")]
    EmptyBody(String),

    /// The stream ended before (or after) the declared length.
    #[error("Incomplete transfer: received {received} of {expected} bytes")]
    Incomplete {
        /// Bytes present in the partial file.
        received: u64,
        /// Declared total size.
        expected: u64,
    },

    /// The finished artifact does not match its expected digest.
    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Path of the artifact.
        path: PathBuf,
        /// Expected lowercase hex digest.
        expected: String,
        /// Computed lowercase hex digest.
        actual: String,
    },

    /// Local filesystem failure (disk full, permissions, rename).
    #[error("Disk error on {path:?}")]
    Disk {
        /// Path the operation was working on.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The transfer observed a cancellation request.
    #[error("Transfer canceled")]
    Canceled,

    /// Error from the HTTP middleware stack.
    #[error("Middleware error")]
    Middleware {
        #[from]
        source: reqwest_middleware::Error,
    },

    /// Error from the Reqwest library.
    #[error("Reqwest Error")]
    Reqwest {
        #[from]
        source: reqwest::Error,
    },
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn disk(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Disk {
            path: path.into(),
            source,
        }
    }

    /// Classify a request error coming out of the middleware client.
    pub(crate) fn from_request(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => Error::from_reqwest(e),
            other => Error::Middleware { source: other },
        }
    }

    /// Classify a raw reqwest error into the transfer taxonomy.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_connect() || err.is_body() || err.is_request() || err.is_decode() {
            Error::Network(err.to_string())
        } else {
            Error::Reqwest { source: err }
        }
    }

    /// Whether another attempt against the same destination may succeed.
    ///
    /// Disk errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_)
            | Error::Timeout(_)
            | Error::EmptyBody(_)
            | Error::Incomplete { .. }
            | Error::Middleware { .. }
            | Error::Reqwest { .. } => true,
            Error::Http { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// Whether this error came from the local filesystem.
    pub fn is_disk(&self) -> bool {
        matches!(self, Error::Disk { .. })
    }
}

/// Result type alias for operations that can fail with a comfy-fetch error.
pub type Result<T> = std::result::Result<T, Error>;
