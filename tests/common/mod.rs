#![allow(dead_code)]

use async_trait::async_trait;
use mapupdater::download::{ExtractError, Extractor};
use mapupdater::http::{HttpClient, HttpError};
use mapupdater::listing::{ListingError, ListingProvider, RemoteListing};
use mapupdater::updater::MapUpdater;
use mapupdater::utils::strip_archive_suffix;
use mapupdater::UpdaterConfig;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const FETCH_URL: &str = "http://maps.example.com/tf/maps/";

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Configuration pointing at `maps_path` with the mock fetch URL
pub fn test_config(maps_path: &Path) -> UpdaterConfig {
    UpdaterConfig {
        maps_path: maps_path.to_path_buf(),
        fetch_url: FETCH_URL.to_string(),
        ..Default::default()
    }
}

/// Create an installed map with some content
pub async fn install_map(maps_path: &Path, name: &str) {
    tokio::fs::create_dir_all(maps_path).await.unwrap();
    tokio::fs::write(maps_path.join(name), format!("bsp data for {}", name))
        .await
        .unwrap();
}

/// Counts how many calls are in flight at once.
#[derive(Default)]
pub struct ActivityCounter {
    active: AtomicUsize,
    max_active: AtomicUsize,
    total: AtomicUsize,
}

impl ActivityCounter {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Serves archive bodies for any name under [`FETCH_URL`].
///
/// Names listed in `missing` answer 404.
#[derive(Default)]
pub struct MockHttpClient {
    pages: Mutex<HashMap<String, String>>,
    missing: Mutex<HashSet<String>>,
    delay: Duration,
    pub downloads: ActivityCounter,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn set_page(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn set_missing(&self, filename: &str) {
        self.missing
            .lock()
            .unwrap()
            .insert(format!("{}{}", FETCH_URL, filename));
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_text(&self, url: &str) -> Result<String, HttpError> {
        let page = self.pages.lock().unwrap().get(url).cloned();
        page.ok_or_else(|| HttpError::Status {
            url: url.to_string(),
            status: StatusCode::NOT_FOUND,
            body: "Not Found".to_string(),
        })
    }

    async fn download(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, HttpError> {
        self.downloads.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.downloads.exit();

        if self.missing.lock().unwrap().contains(url) {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: StatusCode::NOT_FOUND,
                body: "Not Found".to_string(),
            });
        }

        let body = format!("compressed {}", url.rsplit('/').next().unwrap_or_default());
        dest.write_all(body.as_bytes()).await?;
        Ok(body.len() as u64)
    }
}

/// "Extracts" an archive by copying it to its name without `.bz2`.
#[derive(Default)]
pub struct CopyExtractor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Extractor for CopyExtractor {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = archive.file_name().unwrap().to_string_lossy().to_string();
        tokio::fs::copy(archive, dest_dir.join(strip_archive_suffix(&name)))
            .await
            .map_err(|source| ExtractError::SpawnFailed {
                program: "copy".to_string(),
                source,
            })?;
        Ok(())
    }
}

/// How [`FaultyExtractor`] misbehaves for its target archive
#[derive(Debug, Clone, Copy)]
pub enum ExtractFault {
    /// The tool reports an error
    Error,
    /// The tool exits cleanly without writing anything
    NoOutput,
}

/// Extracts like [`CopyExtractor`] except for one archive name.
pub struct FaultyExtractor {
    target: String,
    fault: ExtractFault,
    inner: CopyExtractor,
}

impl FaultyExtractor {
    pub fn new(target: &str, fault: ExtractFault) -> Self {
        Self {
            target: target.to_string(),
            fault,
            inner: CopyExtractor::default(),
        }
    }
}

#[async_trait]
impl Extractor for FaultyExtractor {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
        let is_target = archive
            .file_name()
            .is_some_and(|name| name.to_string_lossy() == self.target);
        if !is_target {
            return self.inner.extract(archive, dest_dir).await;
        }

        match self.fault {
            ExtractFault::Error => Err(ExtractError::SpawnFailed {
                program: "aunpack".to_string(),
                source: std::io::Error::other("corrupt archive"),
            }),
            ExtractFault::NoOutput => Ok(()),
        }
    }
}

/// A listing provider with a fixed (changeable) answer.
#[derive(Default)]
pub struct MockListingProvider {
    names: Mutex<Vec<String>>,
    fail: Mutex<bool>,
    delay: Duration,
    pub calls: ActivityCounter,
}

impl MockListingProvider {
    pub fn new(names: &[&str]) -> Self {
        let provider = Self::default();
        provider.set_names(names);
        provider
    }

    pub fn with_delay(names: &[&str], delay: Duration) -> Self {
        let provider = Self {
            delay,
            ..Default::default()
        };
        provider.set_names(names);
        provider
    }

    pub fn set_names(&self, names: &[&str]) {
        *self.names.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl ListingProvider for MockListingProvider {
    async fn fetch_listing(&self) -> Result<RemoteListing, ListingError> {
        self.calls.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.exit();

        if *self.fail.lock().unwrap() {
            return Err(ListingError::Parse("Response returned wrong XML".to_string()));
        }
        Ok(self.names.lock().unwrap().iter().cloned().collect())
    }
}

/// Build an updater over mock collaborators
pub fn build_updater(
    config: &UpdaterConfig,
    client: Arc<MockHttpClient>,
    provider: Arc<MockListingProvider>,
) -> MapUpdater {
    build_updater_with_extractor(config, client, provider, Arc::new(CopyExtractor::default()))
}

pub fn build_updater_with_extractor(
    config: &UpdaterConfig,
    client: Arc<MockHttpClient>,
    provider: Arc<MockListingProvider>,
    extractor: Arc<dyn Extractor>,
) -> MapUpdater {
    MapUpdater::with_parts(config, client, provider, extractor).expect("Should build updater")
}
