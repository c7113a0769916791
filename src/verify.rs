//! Checks on finished artifacts.
//!
//! An artifact counts as present when its final path holds a non-empty
//! regular file; when a SHA-256 is known it must match as well. Partial
//! files are never considered.

use crate::error::{Error, Result};
use crate::task::TransferItem;

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tokio::{fs, io::AsyncReadExt};
use tracing::debug;

const READ_BUFFER: usize = 1 << 20;

/// Lowercase hex SHA-256 of the file at `path`.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .await
        .map_err(|e| Error::disk(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| Error::disk(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fails with [`Error::HashMismatch`] when the digest differs from `expected`.
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::HashMismatch {
            path: path.to_path_buf(),
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

/// Whether the item's destination already holds a usable artifact.
pub async fn is_present(item: &TransferItem) -> Result<bool> {
    let path = &item.destination_path;
    let meta = match fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::disk(path, e)),
    };
    if !meta.is_file() || meta.len() == 0 {
        return Ok(false);
    }
    match &item.expected_sha256 {
        Some(expected) => match verify_sha256(path, expected).await {
            Ok(()) => Ok(true),
            Err(Error::HashMismatch { actual, .. }) => {
                debug!("{:?} exists but hashes to {}", path, actual);
                Ok(false)
            }
            Err(e) => Err(e),
        },
        None => Ok(true),
    }
}
