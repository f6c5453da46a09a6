use crate::inventory::LocalMapFile;
use crate::listing::RemoteListing;
use std::collections::HashSet;

/// A map the remote lists that is not installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingMap {
    pub key: String,
    /// Name as the remote reported it, used for the download
    pub filename: String,
}

/// The diff between the remote listing and the maps directory
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    /// Remote archives with no installed counterpart
    pub to_download: Vec<MissingMap>,

    /// Installed maps the remote no longer lists
    pub to_remove: Vec<LocalMapFile>,

    /// Number of installed maps the remote still lists
    pub up_to_date: usize,
}

impl ReconciliationPlan {
    /// Check if the run has anything to do
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.to_remove.is_empty()
    }
}

/// Build a reconciliation plan from a remote listing and the local maps.
///
/// Both sides are compared by key (lowercase compressed filename), so a map
/// is never both missing and stale.
pub fn build_reconciliation_plan(
    remote: &RemoteListing,
    local: &[LocalMapFile],
) -> ReconciliationPlan {
    let local_keys: HashSet<&str> = local.iter().map(|m| m.key.as_str()).collect();

    let mut plan = ReconciliationPlan::default();

    for (key, filename) in remote.iter() {
        if !local_keys.contains(key) {
            plan.to_download.push(MissingMap {
                key: key.to_string(),
                filename: filename.to_string(),
            });
        }
    }

    for map in local {
        if remote.contains_key(&map.key) {
            plan.up_to_date += 1;
        } else {
            plan.to_remove.push(map.clone());
        }
    }

    plan
}
