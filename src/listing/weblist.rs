//! Listing provider for a plain HTML directory index.

use super::{ListingError, ListingProvider, RemoteListing};
use crate::http::HttpClient;
use crate::utils::is_map_archive;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Matches the `href` of an anchor element, with any quoting style.
static ANCHOR_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("anchor pattern is valid")
});

/// Scrapes map archive links out of an HTML index page.
pub struct DirectoryScrapeProvider {
    client: Arc<dyn HttpClient>,
    index_url: String,
}

impl DirectoryScrapeProvider {
    pub fn new(client: Arc<dyn HttpClient>, index_url: String) -> Self {
        Self { client, index_url }
    }
}

#[async_trait]
impl ListingProvider for DirectoryScrapeProvider {
    async fn fetch_listing(&self) -> Result<RemoteListing, ListingError> {
        let html = self.client.get_text(&self.index_url).await?;
        let listing = parse_index(&html);
        debug!(url = %self.index_url, count = listing.len(), "Parsed directory index");
        Ok(listing)
    }
}

/// Collect archive links from an index page.
///
/// Only flat links count: a target containing `/` points outside the
/// listed directory.
pub fn parse_index(html: &str) -> RemoteListing {
    ANCHOR_HREF
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|href| decode_entities(href.as_str()))
        .filter(|href| is_map_archive(href) && !href.contains('/'))
        .collect()
}

/// Decode the handful of entities an index generator puts in attributes
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTOINDEX: &str = r#"<html>
<head><title>Index of /tf/maps/</title></head>
<body>
<h1>Index of /tf/maps/</h1><hr><pre><a href="../">../</a>
<a href="?C=N;O=D">Name</a>
<a href="jump_beef.bsp.bz2">jump_beef.bsp.bz2</a>      01-Jan-2016 10:00  4.2M
<A HREF='Rj_Zone.BSP.BZ2'>Rj_Zone.BSP.BZ2</A>            01-Jan-2016 10:00  3.1M
<a class="file" href=jump_rush.bsp.bz2>jump_rush.bsp.bz2</a>
<a href="old/jump_gay.bsp.bz2">old/jump_gay.bsp.bz2</a>
<a href="README.txt">README.txt</a>
<a href="jump_x.bsp">jump_x.bsp</a>
<a href="tom&amp;jerry.bsp.bz2">tom&amp;jerry.bsp.bz2</a>
</pre><hr></body>
</html>"#;

    #[test]
    fn test_parse_index_keeps_flat_archive_links() {
        let listing = parse_index(AUTOINDEX);
        let names: Vec<&str> = listing.iter().map(|(_, name)| name).collect();
        assert_eq!(
            names,
            vec![
                "jump_beef.bsp.bz2",
                "jump_rush.bsp.bz2",
                "Rj_Zone.BSP.BZ2",
                "tom&jerry.bsp.bz2",
            ]
        );
    }

    #[test]
    fn test_parse_index_without_links() {
        assert!(parse_index("<html><body>nothing here</body></html>").is_empty());
    }
}
