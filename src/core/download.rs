//! Bounded audio download to a temporary file.
//!
//! Downloads are capped twice: a Content-Length pre-check aborts before
//! anything is written, and a running total aborts mid-stream when the
//! server lied about (or omitted) the length. The caller owns the returned
//! `TempPath`; dropping it removes the file, so no exit path leaks a
//! partial artifact.

use std::path::Path;
use std::time::Duration;

use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Download failure taxonomy. The pipeline treats all variants uniformly
/// as "stage skipped for this episode"; the distinction exists for logs
/// and tests.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("resource exceeds download cap: {bytes} > {cap} bytes")]
    TooLarge { bytes: u64, cap: u64 },

    #[error("server returned status {0}")]
    Status(StatusCode),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Streams remote resources to local temp files under a hard byte cap.
pub struct Downloader {
    client: reqwest::Client,
    max_bytes: u64,
}

impl Downloader {
    /// `timeout` bounds the whole request including the body transfer;
    /// there is no retry at this level.
    pub fn new(max_bytes: u64, timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, max_bytes })
    }

    /// Download `url` to a fresh temporary file.
    ///
    /// On success the complete, fully-written artifact is returned; on any
    /// failure nothing is left on disk.
    pub async fn fetch_to_temp(&self, url: &str) -> Result<TempPath, DownloadError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        // Declared length is untrusted but lets us abort before writing.
        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    bytes: declared,
                    cap: self.max_bytes,
                });
            }
        }

        let tmp_path = tempfile::Builder::new()
            .prefix("episode-")
            .suffix(".audio")
            .tempfile()?
            .into_temp_path();

        let stream = Box::pin(response.bytes_stream().map_err(DownloadError::from));
        let written = copy_capped(stream, &tmp_path, self.max_bytes).await?;

        debug!(url, bytes = written, "download complete");
        Ok(tmp_path)
    }
}

/// Copy a byte stream to `dest`, enforcing the cap on the running total.
/// The error path leaves cleanup to the caller's `TempPath` ownership.
async fn copy_capped<S, B>(mut stream: S, dest: &Path, cap: u64) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, DownloadError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut file = tokio::fs::File::create(dest).await?;
    let mut total = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total += chunk.as_ref().len() as u64;
        if total > cap {
            return Err(DownloadError::TooLarge { bytes: total, cap });
        }
        file.write_all(chunk.as_ref()).await?;
    }

    file.flush().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunks(sizes: &[usize]) -> Vec<Result<Vec<u8>, DownloadError>> {
        sizes.iter().map(|&n| Ok(vec![0u8; n])).collect()
    }

    #[tokio::test]
    async fn test_copy_under_cap_succeeds() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("audio");

        let stream = futures_util::stream::iter(chunks(&[1024, 1024]));
        let written = copy_capped(stream, &dest, 4096).await.unwrap();

        assert_eq!(written, 2048);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 2048);
    }

    #[tokio::test]
    async fn test_exactly_at_cap_succeeds() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("audio");

        let stream = futures_util::stream::iter(chunks(&[2048, 2048]));
        assert_eq!(copy_capped(stream, &dest, 4096).await.unwrap(), 4096);
    }

    #[tokio::test]
    async fn test_one_byte_over_cap_fails() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("audio");

        // Total is cap + 1: enforcement must trip mid-stream even though
        // every individual chunk is small.
        let stream = futures_util::stream::iter(chunks(&[2048, 2048, 1]));
        let result = copy_capped(stream, &dest, 4096).await;

        assert!(matches!(result, Err(DownloadError::TooLarge { .. })));
    }
}
