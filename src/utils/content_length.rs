//! Content length extraction utilities.
//!
//! Sizes come from `Content-Range` on partial responses and from
//! `Content-Length` otherwise. Everything works on a [`HeaderMap`] so the
//! parsing can be exercised without a live response.

use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::StatusCode;

/// A parsed `Content-Range` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte position, `None` for the unsatisfied form `bytes */N`.
    pub start: Option<u64>,
    /// Last byte position (inclusive).
    pub end: Option<u64>,
    /// Complete length, `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Parse a `Content-Range` value such as `bytes 400-999/1000` or `bytes */1000`.
///
/// ```rust
/// use comfy_fetch::utils::parse_content_range;
///
/// let range = parse_content_range("bytes 400-999/1000").unwrap();
/// assert_eq!(range.start, Some(400));
/// assert_eq!(range.total, Some(1000));
/// ```
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let (start, end) = match span.trim() {
        "*" => (None, None),
        s => {
            let (a, b) = s.split_once('-')?;
            (Some(a.trim().parse::<u64>().ok()?), Some(b.trim().parse::<u64>().ok()?))
        }
    };
    Some(ContentRange { start, end, total })
}

/// Read and parse the `Content-Range` header, if any.
pub fn content_range(headers: &HeaderMap) -> Option<ContentRange> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Read the `Content-Length` header, if any.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Total size of the resource a response is (part of).
///
/// For `206 Partial Content` the `Content-Range` total wins, falling back to
/// `Content-Length + offset`. Full responses use `Content-Length` alone.
/// `None` means the size is unknown.
pub fn total_size(status: StatusCode, headers: &HeaderMap, offset: u64) -> Option<u64> {
    if status == StatusCode::PARTIAL_CONTENT {
        content_range(headers)
            .and_then(|r| r.total)
            .or_else(|| content_length(headers).map(|len| len.saturating_add(offset)))
    } else {
        content_length(headers)
    }
}
