//! Granule download and decompression.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use harvest_common::time::from_system_time;

use crate::error::{SyncError, SyncResult};

/// Transport for granule files.
#[async_trait]
pub trait GranuleFetcher: Send + Sync {
    /// Retrieve `url` into `dest`, replacing any existing file.
    async fn fetch(&self, url: &str, dest: &Path) -> SyncResult<()>;
}

/// HTTP granule transport that streams the body to disk.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| SyncError::Download(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl GranuleFetcher for HttpFetcher {
    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn fetch(&self, url: &str, dest: &Path) -> SyncResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Download(format!("HTTP error: {}", status)));
        }

        // Stream into a sibling file so a broken transfer never leaves a
        // truncated granule at `dest`.
        let partial = partial_path(dest);
        let mut file = fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SyncError::Download(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        fs::rename(&partial, dest).await?;
        debug!(bytes = written, "Download complete");
        Ok(())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

async fn local_mtime(path: &Path) -> SyncResult<Option<DateTime<Utc>>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(from_system_time(meta.modified()?))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Make sure an up-to-date copy of `url` exists for `dest` and return its path.
///
/// A local file is kept only when its modification time is strictly after
/// `remote_modified`; otherwise it is fetched again. For `.gz` payloads the
/// file checked is the decompressed sibling, never the archive: an archive
/// is always unpacked next to `dest` and removed.
#[instrument(skip(fetcher), fields(dest = %dest.display()))]
pub async fn ensure_local(
    fetcher: &dyn GranuleFetcher,
    url: &str,
    dest: &Path,
    remote_modified: DateTime<Utc>,
) -> SyncResult<PathBuf> {
    let usable = if is_gzip(dest) {
        dest.with_extension("")
    } else {
        dest.to_path_buf()
    };

    match local_mtime(&usable).await? {
        Some(mtime) if mtime > remote_modified => {
            debug!(path = %usable.display(), "Local granule already up to date");
            return Ok(usable);
        }
        Some(mtime) => info!(url = %url, local_mtime = %mtime, "Updating stale local granule"),
        None => info!(url = %url, "Downloading granule"),
    }

    fetcher.fetch(url, dest).await?;

    if is_gzip(dest) {
        return decompress_gz(dest).await;
    }
    Ok(usable)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

/// Decompress `archive` beside itself and delete it.
///
/// The output keeps the archive name minus `.gz`. When that name has no
/// extension left, the extension is taken from the sole other file in the
/// directory, as some providers compress files whose inner name differs.
pub async fn decompress_gz(archive: &Path) -> SyncResult<PathBuf> {
    let archive = archive.to_path_buf();
    tokio::task::spawn_blocking(move || decompress_gz_blocking(&archive)).await?
}

fn decompress_gz_blocking(archive: &Path) -> SyncResult<PathBuf> {
    let target = archive.with_extension("");

    // Neither a bad archive nor a partial output may survive to be picked
    // up by a later run.
    if let Err(e) = unpack_gz(archive, &target) {
        remove_if_present(&target);
        remove_if_present(archive);
        return Err(e);
    }
    std::fs::remove_file(archive)?;

    if target.extension().is_some() {
        return Ok(target);
    }

    let inferred = inferred_extension(&target)?;
    match inferred {
        Some(ext) => {
            let renamed = target.with_extension(ext);
            std::fs::rename(&target, &renamed)?;
            Ok(renamed)
        }
        None => {
            warn!(path = %target.display(), "Could not infer extension of decompressed file");
            Ok(target)
        }
    }
}

fn unpack_gz(archive: &Path, target: &Path) -> SyncResult<()> {
    let input = std::fs::File::open(archive)?;
    let mut decoder = flate2::read::GzDecoder::new(std::io::BufReader::new(input));
    let mut output = std::fs::File::create(target)?;
    std::io::copy(&mut decoder, &mut output)
        .map_err(|e| SyncError::Decompression(format!("{}: {}", archive.display(), e)))?;
    Ok(())
}

fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

fn inferred_extension(target: &Path) -> SyncResult<Option<String>> {
    let dir = match target.parent() {
        Some(dir) => dir,
        None => return Ok(None),
    };

    let mut others = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path != target {
            others.push(path);
        }
    }

    Ok(match others.as_slice() {
        [only] => only
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned()),
        _ => None,
    })
}
