//! Content fetch cache.
//!
//! Downloads remote media into the cache directory, deduplicating by cache
//! key. A second fetch for a key already in flight attaches to the existing
//! transfer through a broadcast subscription; distinct keys download in
//! parallel behind a small semaphore. A destination file that already exists
//! with non-zero length is served without touching the network. There is no
//! checksum verification: any non-empty file is trusted, and failed transfers
//! leave their partial file on disk.

use crate::core::config::FetchConfig;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Semaphore};

const DEFAULT_EXTENSION: &str = ".mp4";
const PROGRESS_LOG_STEP_BYTES: u64 = 1024 * 1024;

/// Why a transfer failed, with a reason fit for a content_response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("download failed with HTTP status {0}")]
    Status(u16),
    #[error("download failed: {0}")]
    Transfer(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("download cancelled")]
    Cancelled,
}

/// Progress and completion updates observed by every attached caller.
#[derive(Debug, Clone)]
pub enum FetchUpdate {
    /// Percent complete; only emitted when the server reports a length.
    Progress(u8),
    Done(Result<PathBuf, FetchError>),
}

/// Result of asking the cache for a key.
pub enum FetchTicket {
    /// Complete local copy; no transfer started.
    Cached(PathBuf),
    /// Transfer in flight (new or attached); subscribe for updates.
    Pending(broadcast::Receiver<FetchUpdate>),
}

/// One entry in the on-disk cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub cache_key: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub complete: bool,
}

struct FetchInner {
    dir: PathBuf,
    client: reqwest::Client,
    inflight: Mutex<HashMap<String, broadcast::Sender<FetchUpdate>>>,
    permits: Arc<Semaphore>,
}

/// Shared handle to the fetch cache. Cheap to clone.
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<FetchInner>,
}

impl FetchCache {
    /// Open the cache over `cache_dir`, falling back to the shared downloads
    /// location and then the local data directory. The directory is created
    /// if absent.
    pub fn new(config: &FetchConfig, cache_dir: Option<PathBuf>) -> Result<Self> {
        let dir = cache_dir
            .or_else(|| dirs::download_dir().map(|d| d.join("Beacon")))
            .or_else(|| dirs::data_dir().map(|d| d.join("beacon").join("media")))
            .unwrap_or_else(|| PathBuf::from("beacon-media"));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create cache dir {}", dir.display()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .read_timeout(Duration::from_secs(config.read_timeout_seconds))
            .build()
            .context("build fetch client")?;
        Ok(Self {
            inner: Arc::new(FetchInner {
                dir,
                client,
                inflight: Mutex::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(config.max_concurrent)),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Deterministic cache key for one logical content item. Repeated pushes
    /// of the same item map to one file.
    pub fn cache_key(content_id: &str, title: Option<&str>, format: Option<&str>) -> String {
        let extension = match format {
            Some(f) if !f.is_empty() => {
                if f.starts_with('.') {
                    f.to_string()
                } else {
                    format!(".{f}")
                }
            }
            _ => DEFAULT_EXTENSION.to_string(),
        };
        let safe_name = match title {
            Some(t) if !t.is_empty() => t
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>(),
            _ => format!("video_{content_id}"),
        };
        format!("{safe_name}_{content_id}{extension}")
    }

    /// The durable truth for a key is the filesystem: a file may exist from
    /// a prior process lifetime. `complete` means non-zero length.
    pub fn lookup(&self, cache_key: &str) -> Option<CacheEntry> {
        let local_path = self.inner.dir.join(cache_key);
        let meta = std::fs::metadata(&local_path).ok()?;
        Some(CacheEntry {
            cache_key: cache_key.to_string(),
            local_path,
            size_bytes: meta.len(),
            complete: meta.len() > 0,
        })
    }

    /// Fetch a key, reusing a complete local copy or an in-flight transfer
    /// when one exists.
    pub fn fetch(&self, cache_key: &str, source_url: &str) -> FetchTicket {
        if let Some(entry) = self.lookup(cache_key) {
            if entry.complete {
                tracing::debug!(cache_key, path = %entry.local_path.display(), "cache hit");
                return FetchTicket::Cached(entry.local_path);
            }
        }

        let mut inflight = self.inner.inflight.lock();
        if let Some(tx) = inflight.get(cache_key) {
            tracing::debug!(cache_key, "attaching to in-flight download");
            return FetchTicket::Pending(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(128);
        inflight.insert(cache_key.to_string(), tx.clone());
        drop(inflight);

        let cache = self.clone();
        let key = cache_key.to_string();
        let url = source_url.to_string();
        tokio::spawn(async move {
            let result = cache.download(&key, &url, &tx).await;
            cache.inner.inflight.lock().remove(&key);
            // No receivers is fine; late attachers re-check the filesystem.
            let _ = tx.send(FetchUpdate::Done(result));
        });
        FetchTicket::Pending(rx)
    }

    /// Await a ticket's completion, discarding progress updates.
    pub async fn wait(ticket: FetchTicket) -> Result<PathBuf, FetchError> {
        match ticket {
            FetchTicket::Cached(path) => Ok(path),
            FetchTicket::Pending(mut rx) => loop {
                match rx.recv().await {
                    Ok(FetchUpdate::Done(result)) => return result,
                    Ok(FetchUpdate::Progress(_)) => {}
                    // Lagging skips progress updates only; Done is last.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(FetchError::Cancelled)
                    }
                }
            },
        }
    }

    async fn download(
        &self,
        cache_key: &str,
        url: &str,
        updates: &broadcast::Sender<FetchUpdate>,
    ) -> Result<PathBuf, FetchError> {
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        // The file may have completed while this task waited for a permit.
        if let Some(entry) = self.lookup(cache_key) {
            if entry.complete {
                return Ok(entry.local_path);
            }
        }

        let dest = self.inner.dir.join(cache_key);
        tracing::info!(cache_key, url, dest = %dest.display(), "starting download");

        let response = self
            .inner
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transfer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let total_len = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| FetchError::Write(e.to_string()))?;

        let mut response = response;
        let mut written: u64 = 0;
        let mut last_pct: u8 = 0;
        let mut next_log = PROGRESS_LOG_STEP_BYTES;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return Err(FetchError::Transfer(e.to_string())),
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Write(e.to_string()))?;
            written += chunk.len() as u64;
            if total_len > 0 {
                let pct = ((written * 100) / total_len).min(100) as u8;
                if pct > last_pct {
                    last_pct = pct;
                    let _ = updates.send(FetchUpdate::Progress(pct));
                }
            }
            if written >= next_log {
                tracing::debug!(cache_key, mib = written / PROGRESS_LOG_STEP_BYTES, "downloading");
                next_log += PROGRESS_LOG_STEP_BYTES;
            }
        }
        file.flush()
            .await
            .map_err(|e| FetchError::Write(e.to_string()))?;

        tracing::info!(cache_key, bytes = written, "download complete");
        Ok(dest)
    }
}
