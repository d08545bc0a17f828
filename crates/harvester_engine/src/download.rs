use std::path::Path;
use std::sync::Arc;

use harvest_logging::{harvest_debug, harvest_warn};
use sha2::{Digest, Sha256};

use crate::config::RetryPolicy;
use crate::fetch::Fetcher;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::{AssetFetchError, DownloadError, FetchError, StoredAsset};

/// Fetches one binary resource with retry and stores it atomically.
#[derive(Clone)]
pub struct AssetDownloader {
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
}

impl AssetDownloader {
    pub fn new(fetcher: Arc<dyn Fetcher>, retry: RetryPolicy) -> Self {
        Self { fetcher, retry }
    }

    /// Download `url` into `destination`.
    ///
    /// Transient failures are retried with exponential backoff up to the
    /// policy's attempt budget; anything else fails on the spot. The
    /// destination is either fully written or left absent.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<StoredAsset, DownloadError> {
        let (dir, filename) = split_destination(destination)?;
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        let output = loop {
            attempt += 1;
            match self.fetcher.fetch(url).await {
                Ok(output) => break output,
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    harvest_debug!(
                        "Transient failure fetching {} (attempt {}/{}): {}; retrying in {:?}",
                        url,
                        attempt,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    harvest_warn!("Giving up on {} after {} attempt(s): {}", url, attempt, source);
                    return Err(give_up(url, attempt, source).into());
                }
            }
        };

        let digest = Sha256::digest(&output.bytes);
        let size = output.bytes.len() as u64;
        let path = AtomicFileWriter::new(dir.to_path_buf())
            .write_async(filename.to_string(), output.bytes)
            .await?;

        Ok(StoredAsset {
            path,
            bytes: size,
            sha256: hex(&digest),
            attempts: attempt,
        })
    }
}

fn give_up(url: &str, attempts: u32, source: FetchError) -> AssetFetchError {
    AssetFetchError {
        url: url.to_string(),
        attempts,
        source,
    }
}

fn split_destination(destination: &Path) -> Result<(&Path, &str), PersistError> {
    let filename = destination
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            PersistError::OutputDir(format!("{} has no file name", destination.display()))
        })?;
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, filename))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
