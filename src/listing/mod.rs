mod bucket;
mod weblist;

pub use bucket::{BucketListProvider, BUCKET_NAMESPACE};
pub use weblist::DirectoryScrapeProvider;

use crate::config::{ListingConfig, UpdaterConfig};
use crate::http::{HttpClient, HttpError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Listing request to {url} returned HTTP {status}")]
    Transport { url: String, status: StatusCode },

    #[error("HTTP error: {0}")]
    HttpError(HttpError),

    #[error("Failed to parse listing: {0}")]
    Parse(String),

    #[error("No maps found at remote server")]
    Empty,
}

impl From<HttpError> for ListingError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Status { url, status, body } => {
                warn!(%url, %status, "Listing request failed:\n{}", body);
                ListingError::Transport { url, status }
            }
            other => ListingError::HttpError(other),
        }
    }
}

/// The set of archives the remote reports, keyed by lowercase name.
///
/// Values keep the name exactly as the remote reported it, which is what
/// gets requested and installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListing {
    entries: BTreeMap<String, String>,
}

impl RemoteListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name; the first spelling seen for a key wins
    pub fn insert(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.entries.entry(name.to_lowercase()).or_insert(name);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, reported name)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Union caller-forced names into the listing
    pub fn extend_forced(&mut self, forced: &[String]) {
        for name in forced {
            self.insert(name.clone());
        }
    }
}

impl<S: Into<String>> FromIterator<S> for RemoteListing {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut listing = RemoteListing::new();
        for name in iter {
            listing.insert(name);
        }
        listing
    }
}

/// Discovers which map archives exist on the remote server.
#[async_trait]
pub trait ListingProvider: Send + Sync {
    /// Fetch and parse the remote manifest.
    async fn fetch_listing(&self) -> Result<RemoteListing, ListingError>;

    /// Fetch the manifest and union `forced` into it.
    ///
    /// Forced names are treated as present remotely whatever the server
    /// reports.
    async fn fetch(&self, forced: &[String]) -> Result<RemoteListing, ListingError> {
        let mut listing = self.fetch_listing().await?;
        listing.extend_forced(forced);
        Ok(listing)
    }
}

/// Build the listing provider selected by the configuration
pub fn build_provider(
    config: &UpdaterConfig,
    client: Arc<dyn HttpClient>,
) -> Arc<dyn ListingProvider> {
    match &config.listing {
        ListingConfig::WebList => {
            Arc::new(DirectoryScrapeProvider::new(client, config.fetch_url.clone()))
        }
        ListingConfig::Bucket { list_url, key_prefix } => Arc::new(BucketListProvider::new(
            client,
            list_url.clone(),
            key_prefix.clone(),
        )),
    }
}
