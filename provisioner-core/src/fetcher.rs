//! Streaming archive download with retries and integrity verification.
//!
//! Archives can be large (multi-megabyte font and icon bundles), so the body
//! is streamed to disk chunk by chunk and hashed on the way through, never
//! buffered whole in memory. Transient failures are retried with exponential
//! backoff; permanent failures (client errors, malformed requests, checksum
//! mismatches) surface immediately.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::FetchError;

/// Knobs for the fetch stage.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Extra attempts after the first, for transient failures only.
    pub retries: u32,
    /// Per-request timeout, covering connect through body completion.
    pub timeout: Duration,
    /// Base delay before the first retry; doubles per attempt.
    pub backoff: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(30),
            backoff: Duration::from_millis(500),
        }
    }
}

/// Downloads `url` to `dest`, returning the number of bytes written.
///
/// `dest` must live inside the job's staging area; the final destination is
/// never touched here. When `expected_sha256` is set, the streamed hash must
/// match or the file is deleted and the fetch fails.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    expected_sha256: Option<&str>,
    dest: &Path,
    options: &FetchOptions,
) -> Result<u64, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        match download_once(client, url, expected_sha256, dest, options).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_transient() && attempt < options.retries => {
                let delay = options.backoff * 2u32.saturating_pow(attempt);
                warn!(
                    "Fetch attempt {} for {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    url,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn download_once(
    client: &reqwest::Client,
    url: &str,
    expected_sha256: Option<&str>,
    dest: &Path,
    options: &FetchOptions,
) -> Result<u64, FetchError> {
    info!("Downloading {} to {}", url, dest.display());

    let response = client
        .get(url)
        .timeout(options.timeout)
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status,
            url: url.to_string(),
        });
    }

    let total_bytes = response.content_length();
    debug!("Content-Length: {:?}", total_bytes);

    let result = write_body(response, url, expected_sha256, dest).await;
    if result.is_err() {
        // A partial file must not survive into a retry or past the job.
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

async fn write_body(
    response: reqwest::Response,
    url: &str,
    expected_sha256: Option<&str>,
    dest: &Path,
) -> Result<u64, FetchError> {
    let io_err = |source: std::io::Error| FetchError::Io {
        url: url.to_string(),
        source,
    };

    let mut file = File::create(dest).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut bytes_downloaded: u64 = 0;
    let mut hasher = Sha256::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(io_err)?;
        bytes_downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err)?;

    if bytes_downloaded == 0 {
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }

    if let Some(expected) = expected_sha256 {
        let actual = hex_digest(&hasher.finalize());
        if actual != expected.to_lowercase() {
            return Err(FetchError::ChecksumMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        debug!("SHA256 verified: {}", actual);
    }

    info!(
        "Download complete: {} bytes written to {}",
        bytes_downloaded,
        dest.display()
    );

    Ok(bytes_downloaded)
}

/// Formats a SHA256 hash as lowercase hex.
fn hex_digest(hash: &[u8]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}
