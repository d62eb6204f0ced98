//! Retrying downloader over a [`BundleHost`].

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::host::BundleHost;
use super::is_bundle_payload;

/// Outcome of a successful fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Payload downloaded and written; carries the byte count.
    Downloaded(u64),
    /// Destination already satisfied the skip-existing check; no transfer.
    Skipped,
}

/// All retries exhausted. The destination may still hold the last (invalid)
/// payload received, kept on disk for diagnosis.
#[derive(Debug, Error)]
#[error("download failed after {attempts} attempts: {last_error}")]
pub struct FetchError {
    pub attempts: u32,
    pub last_error: String,
}

/// Downloads a URL to a destination path with bounded retries, a fixed
/// backoff between attempts, and magic-signature validation of the payload.
pub struct FetchRetrier<H> {
    host: H,
    max_retries: u32,
    skip_existing: bool,
    backoff: Duration,
}

impl<H: BundleHost> FetchRetrier<H> {
    pub fn new(host: H, max_retries: u32, skip_existing: bool) -> Self {
        Self {
            host,
            max_retries: max_retries.max(1),
            skip_existing,
            backoff: Duration::from_secs(1),
        }
    }

    /// Override the fixed inter-attempt backoff (tests use zero).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Buffered fetch that always writes the received payload to `dest`,
    /// valid or not, so the actual bytes can be inspected after a failure.
    ///
    /// Used for the manifest index bundle, which is always refetched.
    pub async fn fetch_validated(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<WriteOutcome, FetchError> {
        self.ensure_parent(dest).await?;

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            match self.attempt(url, dest, attempt, WriteMode::Direct).await {
                Ok(written) => return Ok(WriteOutcome::Downloaded(written)),
                Err(e) => last_error = e,
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Err(FetchError {
            attempts: self.max_retries,
            last_error,
        })
    }

    /// Streaming-style fetch for asset bundles: a valid payload lands in a
    /// `.part` sibling first and is renamed into place only on success, so a
    /// later run's size comparison never sees a partial file.
    ///
    /// With `skip_existing`, an existing destination whose size matches the
    /// probed remote `Content-Length` (or whose size cannot be compared) is
    /// returned as `Skipped` without any GET.
    pub async fn fetch_bundle(&self, url: &str, dest: &Path) -> Result<WriteOutcome, FetchError> {
        self.ensure_parent(dest).await?;

        if self.skip_existing {
            if let Ok(meta) = tokio::fs::metadata(dest).await {
                match self.host.probe_content_length(url).await {
                    None => return Ok(WriteOutcome::Skipped),
                    Some(remote) if meta.len() == remote => return Ok(WriteOutcome::Skipped),
                    Some(_) => {}
                }
            }
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            match self.attempt(url, dest, attempt, WriteMode::Staged).await {
                Ok(written) => return Ok(WriteOutcome::Downloaded(written)),
                Err(e) => last_error = e,
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Err(FetchError {
            attempts: self.max_retries,
            last_error,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        attempt: u32,
        mode: WriteMode,
    ) -> Result<u64, String> {
        let body = match self.host.get(url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt, self.max_retries, e);
                return Err(e.to_string());
            }
        };

        if body.status >= 400 {
            warn!(
                "Attempt {}/{} failed: HTTP {}",
                attempt, self.max_retries, body.status
            );
            return Err(format!("HTTP {}", body.status));
        }

        if !is_bundle_payload(&body.bytes) {
            // Keep the invalid payload on disk for diagnosis.
            if let Err(e) = tokio::fs::write(dest, &body.bytes).await {
                return Err(format!("Failed to write {:?}: {}", dest, e));
            }
            let preview: Vec<u8> = body.bytes.iter().take(16).copied().collect();
            warn!(
                "Attempt {}/{} failed: payload is not a recognized bundle (head={:?})",
                attempt, self.max_retries, preview
            );
            return Err("payload is not a recognized bundle".to_string());
        }

        let written = body.bytes.len() as u64;
        match mode {
            WriteMode::Direct => {
                tokio::fs::write(dest, &body.bytes)
                    .await
                    .map_err(|e| format!("Failed to write {:?}: {}", dest, e))?;
            }
            WriteMode::Staged => {
                let part = part_path(dest);
                tokio::fs::write(&part, &body.bytes)
                    .await
                    .map_err(|e| format!("Failed to write {:?}: {}", part, e))?;
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| format!("Failed to move {:?} into place: {}", part, e))?;
            }
        }
        debug!("Downloaded {} bytes -> {:?}", written, dest);
        Ok(written)
    }

    async fn ensure_parent(&self, dest: &Path) -> Result<(), FetchError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError {
                    attempts: 0,
                    last_error: format!("Failed to create {:?}: {}", parent, e),
                })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    /// Write the payload straight to the destination.
    Direct,
    /// Write to a `.part` sibling and rename into place.
    Staged,
}

fn part_path(dest: &Path) -> std::path::PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}.part"))
}
