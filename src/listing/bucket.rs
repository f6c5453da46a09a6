//! Listing provider for an object-storage bucket listing document.

use super::{ListingError, ListingProvider, RemoteListing};
use crate::http::HttpClient;
use crate::utils::is_map_archive;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::sync::Arc;
use tracing::{debug, warn};

/// Namespace of a `ListBucketResult` document
pub const BUCKET_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Reads map archives out of a bucket listing, restricted to one key prefix.
pub struct BucketListProvider {
    client: Arc<dyn HttpClient>,
    list_url: String,
    key_prefix: String,
}

impl BucketListProvider {
    pub fn new(client: Arc<dyn HttpClient>, list_url: String, key_prefix: String) -> Self {
        Self {
            client,
            list_url,
            key_prefix,
        }
    }
}

#[async_trait]
impl ListingProvider for BucketListProvider {
    async fn fetch_listing(&self) -> Result<RemoteListing, ListingError> {
        let xml = self.client.get_text(&self.list_url).await?;
        let listing = parse_bucket_listing(&xml, &self.key_prefix).inspect_err(|e| {
            if matches!(e, ListingError::Empty) {
                warn!(url = %self.list_url, "Listing contained no maps:\n{}", xml);
            }
        })?;
        debug!(url = %self.list_url, count = listing.len(), "Parsed bucket listing");
        Ok(listing)
    }
}

/// Parse a `ListBucketResult` document.
///
/// Keeps `Contents/Key` values that start with `key_prefix` and name a map
/// archive, with the prefix stripped. Keys that still contain `/` after
/// stripping live in a nested "directory" and are skipped. A listing with
/// no usable keys is an error: an empty result would otherwise remove every
/// local map.
pub fn parse_bucket_listing(xml: &str, key_prefix: &str) -> Result<RemoteListing, ListingError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let namespace = Namespace(BUCKET_NAMESPACE.as_bytes());
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;
    let mut truncated = false;
    let mut listing = RemoteListing::new();

    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| ListingError::Parse(e.to_string()))?;

        match event {
            Event::Start(e) => {
                let in_namespace = matches!(resolved, ResolveResult::Bound(ns) if ns == namespace);
                let local = e.local_name().as_ref().to_vec();

                if !seen_root {
                    if !in_namespace || local != b"ListBucketResult" {
                        return Err(ListingError::Parse(
                            "Response returned wrong XML".to_string(),
                        ));
                    }
                    seen_root = true;
                }

                if in_namespace {
                    path.push(local);
                } else {
                    path.push(Vec::new());
                }
            }
            Event::Empty(e) if !seen_root => {
                let in_namespace = matches!(resolved, ResolveResult::Bound(ns) if ns == namespace);
                if !in_namespace || e.local_name().as_ref() != b"ListBucketResult" {
                    return Err(ListingError::Parse("Response returned wrong XML".to_string()));
                }
                seen_root = true;
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(text) if is_key_path(&path) => {
                let key = text
                    .unescape()
                    .map_err(|e| ListingError::Parse(e.to_string()))?;
                if let Some(name) = map_name_for_key(&key, key_prefix) {
                    listing.insert(name);
                }
            }
            Event::Text(text) if is_truncated_path(&path) => {
                truncated = text.eq_ignore_ascii_case(b"true");
            }
            Event::Eof => {
                if !path.is_empty() {
                    return Err(ListingError::Parse(
                        "Listing document ended before its root element closed".to_string(),
                    ));
                }
                break;
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(ListingError::Parse("Response returned wrong XML".to_string()));
    }
    if truncated {
        // TODO: follow continuation markers once a bucket outgrows one page
        warn!(
            count = listing.len(),
            "Bucket listing is truncated, maps past the first page will be treated as stale"
        );
    }
    if listing.is_empty() {
        return Err(ListingError::Empty);
    }

    Ok(listing)
}

fn is_key_path(path: &[Vec<u8>]) -> bool {
    matches!(
        path,
        [root, contents, key]
            if root == b"ListBucketResult" && contents == b"Contents" && key == b"Key"
    )
}

fn is_truncated_path(path: &[Vec<u8>]) -> bool {
    matches!(path, [root, flag] if root == b"ListBucketResult" && flag == b"IsTruncated")
}

fn map_name_for_key<'a>(key: &'a str, key_prefix: &str) -> Option<&'a str> {
    let name = key.strip_prefix(key_prefix)?;
    if !is_map_archive(name) || name.contains('/') {
        return None;
    }
    Some(name)
}
