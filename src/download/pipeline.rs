//! Fetch, extract and install a single map.

use super::extractor::{ExtractError, Extractor};
use super::limiter::ConcurrencyLimiter;
use crate::http::{HttpClient, HttpError};
use crate::utils::{get_scratch_path, is_map_archive, join_url, strip_archive_suffix};
use reqwest::Url;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Transfer failed: {0}")]
    Transport(#[from] HttpError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid map archive name {0:?}")]
    InvalidName(String),

    #[error("Download limiter is closed")]
    LimiterClosed,
}

fn fs_error(path: &Path) -> impl FnOnce(std::io::Error) -> DownloadError + '_ {
    move |source| DownloadError::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Downloads missing maps into the maps directory.
///
/// Each archive is streamed to `<maps>/mapupdater/<name>`, extracted in
/// place, and the decompressed file is moved to `<maps>/<name minus .bz2>`.
/// Failures stay with the map that caused them.
#[derive(Clone)]
pub struct DownloadPipeline {
    client: Arc<dyn HttpClient>,
    extractor: Arc<dyn Extractor>,
    limiter: ConcurrencyLimiter,
    fetch_url: Url,
    maps_path: PathBuf,
    scratch_path: PathBuf,
}

impl DownloadPipeline {
    pub fn new(
        client: Arc<dyn HttpClient>,
        extractor: Arc<dyn Extractor>,
        limiter: ConcurrencyLimiter,
        fetch_url: Url,
        maps_path: PathBuf,
    ) -> Self {
        let scratch_path = get_scratch_path(&maps_path);
        Self {
            client,
            extractor,
            limiter,
            fetch_url,
            maps_path,
            scratch_path,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Fetch one map, waiting for a limiter slot first.
    ///
    /// Returns the path of the installed map.
    pub async fn fetch_map(&self, filename: &str) -> Result<PathBuf, DownloadError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| DownloadError::LimiterClosed)?;

        self.run(filename).await
    }

    async fn run(&self, filename: &str) -> Result<PathBuf, DownloadError> {
        if !is_map_archive(filename) || filename.contains('/') || filename.contains('\\') {
            return Err(DownloadError::InvalidName(filename.to_string()));
        }
        let url = join_url(&self.fetch_url, filename)
            .ok_or_else(|| DownloadError::InvalidName(filename.to_string()))?;

        fs::create_dir_all(&self.scratch_path)
            .await
            .map_err(fs_error(&self.scratch_path))?;

        let map_name = strip_archive_suffix(filename);
        let temp_path = self.scratch_path.join(filename);
        let extracted_path = self.scratch_path.join(map_name);
        let installed_path = self.maps_path.join(map_name);

        let result = self
            .transfer_and_install(url.as_str(), &temp_path, &extracted_path, &installed_path)
            .await;

        if let Err(e) = remove_if_exists(&temp_path).await {
            warn!(path = %temp_path.display(), error = %e, "Failed to remove temporary archive");
        }

        match result {
            Ok(()) => {
                info!(filename, "Finished downloading");
                Ok(installed_path)
            }
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&extracted_path).await {
                    warn!(path = %extracted_path.display(), error = %cleanup, "Failed to remove partial extraction");
                }
                warn!(filename, error = %e, "Error downloading");
                Err(e)
            }
        }
    }

    async fn transfer_and_install(
        &self,
        url: &str,
        temp_path: &Path,
        extracted_path: &Path,
        installed_path: &Path,
    ) -> Result<(), DownloadError> {
        let mut file = fs::File::create(temp_path)
            .await
            .map_err(fs_error(temp_path))?;
        let bytes = self.client.download(url, &mut file).await?;
        file.flush().await.map_err(fs_error(temp_path))?;
        // Close before handing the archive to the extractor
        drop(file);
        debug!(url, bytes, "Transfer complete");

        self.extractor.extract(temp_path, &self.scratch_path).await?;

        if !fs::try_exists(extracted_path).await.unwrap_or(false) {
            return Err(DownloadError::Filesystem {
                path: extracted_path.to_path_buf(),
                source: std::io::Error::new(
                    ErrorKind::NotFound,
                    "extractor did not produce the expected file",
                ),
            });
        }

        fs::rename(extracted_path, installed_path)
            .await
            .map_err(fs_error(extracted_path))?;

        Ok(())
    }
}
