//! Byte-range transfer engine.
//!
//! One call to [`TransferEngine::transfer`] performs one resumable HTTP(S)
//! download attempt: it resumes from `<destination>.part`, follows redirects
//! itself, negotiates partial content, streams chunks to disk while reporting
//! [`Progress`], and renames the partial file onto the destination once the
//! body ended cleanly with the full length.
//!
//! # Example
//!
//! ```rust,no_run
//! use comfy_fetch::http::{create_http_client, HttpClientConfig};
//! use comfy_fetch::transfer::{EngineConfig, NoProgress, TransferEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = create_http_client(HttpClientConfig::default())?;
//! let engine = TransferEngine::new(client, EngineConfig::default());
//! let url = reqwest::Url::parse("https://example.com/models/vae.safetensors")?;
//! let outcome = engine
//!     .transfer(&url, "models/vae/vae.safetensors".as_ref(), &mut NoProgress, &CancellationToken::new())
//!     .await?;
//! println!("{} bytes at {:?}", outcome.bytes, outcome.path);
//! # Ok(())
//! # }
//! ```

use super::progress::{Progress, ProgressSink};
use crate::error::{Error, Result};
use crate::utils::content_length::{content_range, total_size};

use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, LOCATION, RANGE},
    Response, StatusCode, Url,
};
use reqwest_middleware::ClientWithMiddleware;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs, fs::OpenOptions, io::AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default suffix of partial files.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of redirect hops per attempt.
    pub max_redirects: usize,
    /// Ceiling for sending the request and receiving response headers.
    pub response_timeout: Duration,
    /// Longest silence tolerated between two body chunks.
    pub read_timeout: Duration,
    /// Suffix appended to the destination file name for the partial file.
    pub partial_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            response_timeout: Duration::from_secs(600),
            read_timeout: Duration::from_secs(60),
            partial_suffix: PARTIAL_SUFFIX.to_string(),
        }
    }
}

/// Result of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Final destination path.
    pub path: PathBuf,
    /// Size of the final file.
    pub bytes: u64,
    /// Total declared by the server, if any.
    pub total: Option<u64>,
    /// Offset the attempt resumed from (0 for a fresh transfer).
    pub resumed_from: u64,
}

/// Path of the partial file staged next to `destination`.
pub fn partial_path(destination: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    destination.with_file_name(name)
}

/// What to do with a response given the offset that was requested.
#[derive(Debug, PartialEq, Eq)]
enum Negotiation {
    /// Stream the body; `append` continues the partial file.
    Stream { append: bool, total: Option<u64> },
    /// The partial file already holds every byte.
    AlreadyComplete { total: u64 },
    /// The response cannot be used; drop the partial and ask again from 0.
    Restart,
    /// Definitive HTTP failure.
    Fail(StatusCode),
}

fn negotiate(status: StatusCode, headers: &HeaderMap, offset: u64) -> Negotiation {
    match status {
        StatusCode::PARTIAL_CONTENT => {
            let start = content_range(headers).and_then(|r| r.start);
            match start {
                Some(start) if start != offset => Negotiation::Restart,
                _ => Negotiation::Stream {
                    append: offset > 0,
                    total: total_size(status, headers, offset),
                },
            }
        }
        StatusCode::OK => Negotiation::Stream {
            append: false,
            total: total_size(status, headers, 0),
        },
        StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => {
            match content_range(headers).and_then(|r| r.total) {
                Some(total) if total == offset => Negotiation::AlreadyComplete { total },
                _ => Negotiation::Restart,
            }
        }
        other => Negotiation::Fail(other),
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Performs single resumable transfers over a shared HTTP client.
#[derive(Clone)]
pub struct TransferEngine {
    client: ClientWithMiddleware,
    config: EngineConfig,
}

impl fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEngine")
            .field("config", &self.config)
            .finish()
    }
}

impl TransferEngine {
    /// Creates an engine from a client built by [`crate::http::create_http_client`].
    pub fn new(client: ClientWithMiddleware, config: EngineConfig) -> Self {
        Self { client, config }
    }

    /// Gets the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Path of the partial file for `destination`.
    pub fn partial_path(&self, destination: &Path) -> PathBuf {
        partial_path(destination, &self.config.partial_suffix)
    }

    /// Transfers `url` into `destination`, resuming from the partial file.
    ///
    /// The partial file is never deleted on cancellation or network failure;
    /// it is only dropped when the server ignores the range request or sends
    /// more bytes than it declared.
    pub async fn transfer(
        &self,
        url: &Url,
        destination: &Path,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }

        let partial = self.partial_path(destination);
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                debug!("Creating destination directory {:?}", parent);
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::disk(parent, e))?;
            }
        }

        let mut offset = partial_len(&partial).await?;
        let mut restarted = false;
        let (response, append, total) = loop {
            let response = self.open(url, offset, cancel).await?;
            let status = response.status();
            match negotiate(status, response.headers(), offset) {
                Negotiation::Stream { append, total } => {
                    if offset > 0 && !append {
                        warn!(
                            "{} ignored the range request (status {}), restarting from zero",
                            url, status
                        );
                        remove_partial(&partial).await?;
                    }
                    break (response, append, total);
                }
                Negotiation::AlreadyComplete { total } => {
                    debug!("Partial file {:?} already holds all {} bytes", partial, total);
                    sink.on_progress(Progress::new(total, Some(total)));
                    return finalize(&partial, destination, total, Some(total), offset).await;
                }
                Negotiation::Restart if !restarted => {
                    warn!(
                        "{} answered {} to a range from byte {}, discarding partial file",
                        url, status, offset
                    );
                    remove_partial(&partial).await?;
                    offset = 0;
                    restarted = true;
                }
                Negotiation::Restart | Negotiation::Fail(_) => {
                    return Err(Error::Http {
                        status,
                        url: url.to_string(),
                    });
                }
            }
        };

        let resumed_from = if append { offset } else { 0 };
        let downloaded = self
            .stream_body(response, &partial, resumed_from, total, sink, cancel)
            .await?;

        if downloaded == 0 {
            return Err(Error::EmptyBody(url.to_string()));
        }
        if let Some(expected) = total {
            if downloaded < expected {
                return Err(Error::Incomplete {
                    received: downloaded,
                    expected,
                });
            }
            if downloaded > expected {
                warn!(
                    "{} sent {} bytes but declared {}, discarding partial file",
                    url, downloaded, expected
                );
                remove_partial(&partial).await?;
                return Err(Error::Incomplete {
                    received: downloaded,
                    expected,
                });
            }
        }

        finalize(&partial, destination, downloaded, total, resumed_from).await
    }

    /// Sends the GET, following redirects up to the configured hop limit.
    async fn open(&self, url: &Url, offset: u64, cancel: &CancellationToken) -> Result<Response> {
        let mut current = url.clone();
        let mut visited = HashSet::from([current.clone()]);
        let mut hops = 0usize;

        loop {
            let mut req = self.client.get(current.clone());
            if offset > 0 {
                req = req.header(RANGE, format!("bytes={}-", offset));
            }
            debug!("Fetching {} from byte {}", current, offset);

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Canceled),
                sent = tokio::time::timeout(self.config.response_timeout, req.send()) => sent,
            };
            let response = match sent {
                Ok(res) => res.map_err(Error::from_request)?,
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "no response from {} within {:?}",
                        current, self.config.response_timeout
                    )))
                }
            };

            let status = response.status();
            if !is_redirect(status) {
                return Ok(response);
            }

            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| current.join(location).ok())
                .ok_or_else(|| Error::RedirectWithoutLocation {
                    status,
                    url: current.to_string(),
                })?;

            hops += 1;
            if hops > self.config.max_redirects {
                return Err(Error::TooManyRedirects {
                    limit: self.config.max_redirects,
                    url: url.to_string(),
                });
            }
            if !visited.insert(next.clone()) {
                return Err(Error::RedirectLoop(next.to_string()));
            }
            debug!("Redirect {} -> {} ({})", current, next, status);
            current = next;
        }
    }

    /// Streams the body into the partial file and returns its final length.
    async fn stream_body(
        &self,
        response: Response,
        partial: &Path,
        offset: u64,
        total: Option<u64>,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut downloaded = offset;
        sink.on_progress(Progress::new(downloaded, total));

        // Opened lazily so a body without bytes never creates a partial file.
        let mut file: Option<fs::File> = None;
        let mut stream = response.bytes_stream();

        debug!("Retrieving chunks into {:?}", partial);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = tokio::time::timeout(self.config.read_timeout, stream.next()) => Some(next),
            };

            let chunk = match next {
                None => {
                    close(file.take(), partial).await.ok();
                    debug!("Transfer into {:?} canceled at byte {}", partial, downloaded);
                    return Err(Error::Canceled);
                }
                Some(Err(_)) => {
                    close(file.take(), partial).await.ok();
                    return Err(Error::Timeout(format!(
                        "no data for {:?} after byte {}",
                        self.config.read_timeout, downloaded
                    )));
                }
                Some(Ok(None)) => break,
                Some(Ok(Some(Err(e)))) => {
                    close(file.take(), partial).await.ok();
                    return Err(Error::from_reqwest(e));
                }
                Some(Ok(Some(Ok(chunk)))) => chunk,
            };
            if chunk.is_empty() {
                continue;
            }

            if file.is_none() {
                file = Some(open_partial(partial, offset > 0).await?);
            }
            if let Some(handle) = file.as_mut() {
                handle
                    .write_all(&chunk)
                    .await
                    .map_err(|e| Error::disk(partial, e))?;
            }

            downloaded += chunk.len() as u64;
            sink.on_progress(Progress::new(downloaded, total));
        }

        close(file.take(), partial).await?;
        Ok(downloaded)
    }
}

async fn partial_len(partial: &Path) -> Result<u64> {
    match fs::metadata(partial).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Ok(0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(Error::disk(partial, e)),
    }
}

async fn open_partial(partial: &Path, append: bool) -> Result<fs::File> {
    debug!("Opening partial file {:?} (append: {})", partial, append);
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(partial)
        .await
        .map_err(|e| Error::disk(partial, e))
}

async fn close(file: Option<fs::File>, partial: &Path) -> Result<()> {
    if let Some(mut file) = file {
        file.flush().await.map_err(|e| Error::disk(partial, e))?;
        file.sync_all().await.map_err(|e| Error::disk(partial, e))?;
    }
    Ok(())
}

/// Blocking [`remove_partial`], for callers outside a run.
pub(crate) fn remove_partial_now(partial: &Path) -> Result<()> {
    match std::fs::remove_file(partial) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::disk(partial, e)),
    }
}

pub(crate) async fn remove_partial(partial: &Path) -> Result<()> {
    match fs::remove_file(partial).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::disk(partial, e)),
    }
}

async fn finalize(
    partial: &Path,
    destination: &Path,
    bytes: u64,
    total: Option<u64>,
    resumed_from: u64,
) -> Result<TransferOutcome> {
    fs::rename(partial, destination)
        .await
        .map_err(|e| Error::disk(destination, e))?;
    debug!("Moved {:?} to {:?} ({} bytes)", partial, destination, bytes);
    Ok(TransferOutcome {
        path: destination.to_path_buf(),
        bytes,
        total,
        resumed_from,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_RANGE};

    fn headers(pairs: &[(reqwest::header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        let p = partial_path(Path::new("/models/vae/ae.safetensors"), ".part");
        assert_eq!(p, PathBuf::from("/models/vae/ae.safetensors.part"));
    }

    #[test]
    fn test_negotiate_resumed_partial_content() {
        let h = headers(&[(CONTENT_RANGE, "bytes 400-999/1000"), (CONTENT_LENGTH, "600")]);
        assert_eq!(
            negotiate(StatusCode::PARTIAL_CONTENT, &h, 400),
            Negotiation::Stream {
                append: true,
                total: Some(1000)
            }
        );
    }

    #[test]
    fn test_negotiate_full_content_drops_offset() {
        let h = headers(&[(CONTENT_LENGTH, "1000")]);
        assert_eq!(
            negotiate(StatusCode::OK, &h, 400),
            Negotiation::Stream {
                append: false,
                total: Some(1000)
            }
        );
    }

    #[test]
    fn test_negotiate_mismatched_range_restarts() {
        let h = headers(&[(CONTENT_RANGE, "bytes 0-999/1000")]);
        assert_eq!(
            negotiate(StatusCode::PARTIAL_CONTENT, &h, 400),
            Negotiation::Restart
        );
    }

    #[test]
    fn test_negotiate_unsatisfiable_range() {
        let done = headers(&[(CONTENT_RANGE, "bytes */1000")]);
        assert_eq!(
            negotiate(StatusCode::RANGE_NOT_SATISFIABLE, &done, 1000),
            Negotiation::AlreadyComplete { total: 1000 }
        );
        let stale = headers(&[(CONTENT_RANGE, "bytes */800")]);
        assert_eq!(
            negotiate(StatusCode::RANGE_NOT_SATISFIABLE, &stale, 1000),
            Negotiation::Restart
        );
    }

    #[test]
    fn test_negotiate_errors() {
        assert_eq!(
            negotiate(StatusCode::NOT_FOUND, &HeaderMap::new(), 0),
            Negotiation::Fail(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            negotiate(StatusCode::RANGE_NOT_SATISFIABLE, &HeaderMap::new(), 0),
            Negotiation::Fail(StatusCode::RANGE_NOT_SATISFIABLE)
        );
    }

    #[test]
    fn test_redirect_statuses() {
        for code in [301u16, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!is_redirect(StatusCode::NOT_MODIFIED));
        assert!(!is_redirect(StatusCode::OK));
    }

    #[test]
    fn test_remove_partial_now_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("gone.part");
        assert!(remove_partial_now(&partial).is_ok());
        std::fs::write(&partial, [1u8; 3]).unwrap();
        remove_partial_now(&partial).unwrap();
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_partial_len_missing_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(partial_len(&dir.path().join("none.part")).await.unwrap(), 0);
        std::fs::write(dir.path().join("some.part"), [0u8; 7]).unwrap();
        assert_eq!(partial_len(&dir.path().join("some.part")).await.unwrap(), 7);
    }
}
