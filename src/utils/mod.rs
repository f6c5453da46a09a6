use reqwest::Url;
use std::path::{Path, PathBuf};

/// Suffix of an installed, decompressed map
pub const MAP_SUFFIX: &str = ".bsp";

/// Compression suffix appended to map filenames for transport
pub const ARCHIVE_SUFFIX: &str = ".bz2";

/// Name of the scratch folder used for downloads and extraction
pub const SCRATCH_FOLDER: &str = "mapupdater";

/// Name of the folder stale maps are moved into when not deleting outright
pub const QUARANTINE_FOLDER: &str = "deletez";

/// Name of the marker file written after a clean run
pub const SENTINEL_FILE: &str = "tempus_map_updater_run_once";

/// Get the path to the scratch folder
pub fn get_scratch_path(maps_path: &Path) -> PathBuf {
    maps_path.join(SCRATCH_FOLDER)
}

/// Get the path to the quarantine folder
pub fn get_quarantine_path(maps_path: &Path) -> PathBuf {
    maps_path.join(QUARANTINE_FOLDER)
}

/// Get the path to the sentinel marker file
pub fn get_sentinel_path(maps_path: &Path) -> PathBuf {
    maps_path.join(SENTINEL_FILE)
}

/// Get current timestamp in ISO 8601 format
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Whether a name ends with `suffix`, ignoring ASCII case
pub fn has_suffix_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Whether a remote name looks like a compressed map archive
pub fn is_map_archive(name: &str) -> bool {
    has_suffix_ignore_case(name, &format!("{MAP_SUFFIX}{ARCHIVE_SUFFIX}"))
}

/// Strip the compression suffix, leaving the installed map name
pub fn strip_archive_suffix(name: &str) -> &str {
    if has_suffix_ignore_case(name, ARCHIVE_SUFFIX) {
        &name[..name.len() - ARCHIVE_SUFFIX.len()]
    } else {
        name
    }
}

/// Comparable key of an installed map: lowercase name plus compression suffix
pub fn local_map_key(file_name: &str) -> String {
    format!("{}{}", file_name.to_lowercase(), ARCHIVE_SUFFIX)
}

/// Append `name` as a single path segment of `base`.
///
/// The segment is percent-encoded, so names containing spaces or `#`
/// still address a single object.
pub fn join_url(base: &Url, name: &str) -> Option<Url> {
    let mut url = base.clone();
    url.path_segments_mut().ok()?.pop_if_empty().push(name);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_helpers() {
        assert!(is_map_archive("surf_ski.bsp.bz2"));
        assert!(is_map_archive("SURF_SKI.BSP.BZ2"));
        assert!(!is_map_archive("surf_ski.bsp"));
        assert!(!is_map_archive("bz2"));
        assert_eq!(strip_archive_suffix("jump_a.bsp.bz2"), "jump_a.bsp");
        assert_eq!(strip_archive_suffix("jump_a.BSP.BZ2"), "jump_a.BSP");
        assert_eq!(strip_archive_suffix("jump_a.bsp"), "jump_a.bsp");
    }

    #[test]
    fn test_local_map_key() {
        assert_eq!(local_map_key("Jump_Beef.bsp"), "jump_beef.bsp.bz2");
    }

    #[test]
    fn test_join_url() {
        let base = Url::parse("http://maps.example.com/tf/maps").unwrap();
        let url = join_url(&base, "jump_a.bsp.bz2").unwrap();
        assert_eq!(url.as_str(), "http://maps.example.com/tf/maps/jump_a.bsp.bz2");

        let base = Url::parse("http://maps.example.com/tf/maps/").unwrap();
        let url = join_url(&base, "jump a.bsp.bz2").unwrap();
        assert_eq!(url.as_str(), "http://maps.example.com/tf/maps/jump%20a.bsp.bz2");
    }

    #[test]
    fn test_join_url_rejects_non_base() {
        let base = Url::parse("mailto:maps@example.com").unwrap();
        assert!(join_url(&base, "a.bsp.bz2").is_none());
    }
}
