use crate::config::StalePolicy;
use crate::download::remove_if_exists;
use crate::inventory::LocalMapFile;
use crate::utils::get_quarantine_path;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use super::execute::FailedMap;

/// What happened to the stale maps of one run
#[derive(Debug, Clone, Default)]
pub struct StaleOutcome {
    pub removed: Vec<String>,
    pub failed: Vec<FailedMap>,
}

/// Delete or quarantine every stale map.
///
/// A map that is already gone counts as removed. Other failures are
/// recorded per file and do not stop the remaining removals.
pub async fn remove_stale_maps(
    maps_path: &Path,
    stale: &[LocalMapFile],
    policy: StalePolicy,
) -> StaleOutcome {
    let mut outcome = StaleOutcome::default();
    if stale.is_empty() {
        return outcome;
    }

    let quarantine_path = get_quarantine_path(maps_path);
    if policy == StalePolicy::Quarantine {
        if let Err(e) = fs::create_dir_all(&quarantine_path).await {
            warn!(path = %quarantine_path.display(), error = %e, "Failed to create quarantine folder");
            outcome.failed = stale
                .iter()
                .map(|map| FailedMap::new(&map.file_name, &e))
                .collect();
            return outcome;
        }
    }

    for map in stale {
        let result = match policy {
            StalePolicy::Delete => remove_if_exists(&map.path).await,
            StalePolicy::Quarantine => {
                let target = quarantine_target(&quarantine_path, &map.file_name).await;
                match fs::rename(&map.path, target).await {
                    Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
                    _ => Ok(()),
                }
            }
        };

        match result {
            Ok(()) => outcome.removed.push(map.file_name.clone()),
            Err(e) => {
                warn!(map = %map.file_name, error = %e, "Failed to remove stale map");
                outcome.failed.push(FailedMap::new(&map.file_name, &e));
            }
        }
    }

    outcome
}

/// Free name for a map in the quarantine folder.
///
/// An earlier copy of the same map is kept; the newcomer gets a `.N` suffix.
async fn quarantine_target(quarantine_path: &Path, file_name: &str) -> PathBuf {
    let target = quarantine_path.join(file_name);
    if !fs::try_exists(&target).await.unwrap_or(false) {
        return target;
    }

    let mut n = 1u32;
    loop {
        let candidate = quarantine_path.join(format!("{}.{}", file_name, n));
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}
