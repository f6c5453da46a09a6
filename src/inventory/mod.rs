use crate::utils::{has_suffix_ignore_case, local_map_key, MAP_SUFFIX};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An installed, decompressed map in the maps directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMapFile {
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercase name plus compression suffix, comparable to remote keys
    pub key: String,
}

impl LocalMapFile {
    fn from_path(path: PathBuf) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let key = local_map_key(&file_name);
        Some(Self {
            path,
            file_name,
            key,
        })
    }
}

/// Scan the maps directory for installed maps.
///
/// Only immediate children are considered; directories (the scratch and
/// quarantine folders among them) are skipped.
pub fn scan_local_maps(maps_path: &Path) -> Result<Vec<LocalMapFile>, std::io::Error> {
    if !maps_path.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("maps directory {} does not exist", maps_path.display()),
        ));
    }

    let mut maps = Vec::new();

    for entry in WalkDir::new(maps_path).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;

        if entry.file_type().is_dir() {
            continue;
        }

        let is_map = entry
            .file_name()
            .to_str()
            .is_some_and(|name| has_suffix_ignore_case(name, MAP_SUFFIX));
        if !is_map {
            continue;
        }

        if let Some(map) = LocalMapFile::from_path(entry.into_path()) {
            maps.push(map);
        }
    }

    maps.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_lists_only_top_level_maps() {
        let temp_dir = tempfile::tempdir().unwrap();
        let maps_path = temp_dir.path();

        fs::write(maps_path.join("jump_beef.bsp"), b"map").unwrap();
        fs::write(maps_path.join("Rj_Zone.BSP"), b"map").unwrap();
        fs::write(maps_path.join("jump_beef.nav"), b"nav").unwrap();
        fs::write(maps_path.join("tempus_map_updater_run_once"), b"").unwrap();
        fs::create_dir(maps_path.join("mapupdater")).unwrap();
        fs::write(maps_path.join("mapupdater").join("jump_x.bsp"), b"map").unwrap();
        fs::create_dir(maps_path.join("folder.bsp")).unwrap();

        let maps = scan_local_maps(maps_path).unwrap();
        let keys: Vec<&str> = maps.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["jump_beef.bsp.bz2", "rj_zone.bsp.bz2"]);
        assert_eq!(maps[1].file_name, "Rj_Zone.BSP");
        assert_eq!(maps[1].path, maps_path.join("Rj_Zone.BSP"));
    }

    #[test]
    fn test_scan_missing_directory_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(scan_local_maps(&temp_dir.path().join("missing")).is_err());
    }
}
