use super::plan::build_reconciliation_plan;
use super::stale::remove_stale_maps;
use crate::config::StalePolicy;
use crate::download::DownloadPipeline;
use crate::inventory::scan_local_maps;
use crate::listing::{ListingError, ListingProvider};
use crate::utils::{get_sentinel_path, now_iso};
use futures_util::future::join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Listing error: {0}")]
    ListingError(#[from] ListingError),

    #[error("Filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A map that could not be fetched or removed, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMap {
    pub filename: String,
    pub error: String,
}

impl FailedMap {
    pub fn new(filename: &str, error: &dyn fmt::Display) -> Self {
        Self {
            filename: filename.to_string(),
            error: error.to_string(),
        }
    }
}

/// Overall outcome of a run that got past the listing fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    PartialFailure,
}

/// Result of reconciliation execution
#[derive(Debug, Clone, Default)]
pub struct ReconciliationResult {
    /// Stale maps deleted or quarantined
    pub removed: Vec<String>,
    pub fetched: Vec<String>,
    pub failed_downloads: Vec<FailedMap>,
    pub failed_removals: Vec<FailedMap>,
    /// Whether the sentinel marker was written
    pub marked_up_to_date: bool,
}

impl ReconciliationResult {
    pub fn is_clean(&self) -> bool {
        self.failed_downloads.is_empty() && self.failed_removals.is_empty()
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.is_clean() {
            RunOutcome::Success
        } else {
            RunOutcome::PartialFailure
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RunPhase {
    ListingFetch,
    Diffing,
    Reconciling,
    Finalizing,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::ListingFetch => "listing-fetch",
            RunPhase::Diffing => "diffing",
            RunPhase::Reconciling => "reconciling",
            RunPhase::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Runs reconciliation passes against one maps directory.
///
/// Nothing is cached between passes: every run fetches a fresh listing and
/// rescans the directory.
pub struct ReconciliationEngine {
    maps_path: PathBuf,
    provider: Arc<dyn ListingProvider>,
    pipeline: DownloadPipeline,
    stale_policy: StalePolicy,
    runs: AtomicU64,
}

impl ReconciliationEngine {
    pub fn new(
        maps_path: PathBuf,
        provider: Arc<dyn ListingProvider>,
        pipeline: DownloadPipeline,
        stale_policy: StalePolicy,
    ) -> Self {
        Self {
            maps_path,
            provider,
            pipeline,
            stale_policy,
            runs: AtomicU64::new(0),
        }
    }

    pub fn maps_path(&self) -> &Path {
        &self.maps_path
    }

    /// Execute one reconciliation pass.
    ///
    /// `forced` names are treated as listed by the remote. A listing
    /// failure aborts the pass before anything is touched; per-map failures
    /// are collected in the result.
    pub async fn run(&self, forced: &[String]) -> Result<ReconciliationResult, ReconcileError> {
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("reconcile", run);

        async {
            let result = self.execute(forced).await;
            if let Err(e) = &result {
                error!(error = %e, "Reconciliation failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, forced: &[String]) -> Result<ReconciliationResult, ReconcileError> {
        self.check_maps_dir().await?;

        debug!(phase = %RunPhase::ListingFetch, forced = forced.len());
        let remote = self.provider.fetch(forced).await?;

        debug!(phase = %RunPhase::Diffing, remote = remote.len());
        let local =
            scan_local_maps(&self.maps_path).map_err(|source| ReconcileError::Filesystem {
                path: self.maps_path.clone(),
                source,
            })?;
        let plan = build_reconciliation_plan(&remote, &local);

        debug!(
            phase = %RunPhase::Reconciling,
            missing = plan.to_download.len(),
            stale = plan.to_remove.len(),
            up_to_date = plan.up_to_date
        );

        if !plan.to_download.is_empty() {
            info!("Fetching {} map(s)", plan.to_download.len());
        }

        let removals = remove_stale_maps(&self.maps_path, &plan.to_remove, self.stale_policy);
        let downloads = join_all(plan.to_download.iter().map(|missing| async move {
            let result = self.pipeline.fetch_map(&missing.filename).await;
            (missing.filename.as_str(), result)
        }));
        let (stale_outcome, download_results) = tokio::join!(removals, downloads);

        debug!(phase = %RunPhase::Finalizing);
        let mut result = ReconciliationResult {
            removed: stale_outcome.removed,
            failed_removals: stale_outcome.failed,
            ..Default::default()
        };
        for (filename, download) in download_results {
            match download {
                Ok(_) => result.fetched.push(filename.to_string()),
                Err(e) => result.failed_downloads.push(FailedMap::new(filename, &e)),
            }
        }

        if !plan.to_download.is_empty() && result.is_clean() {
            match self.mark_up_to_date().await {
                Ok(()) => result.marked_up_to_date = true,
                Err(e) => error!(error = %e, "Failed to write up-to-date marker"),
            }
        }

        self.log_summary(&result);
        Ok(result)
    }

    /// The maps directory must already exist
    async fn check_maps_dir(&self) -> Result<(), ReconcileError> {
        let metadata = fs::metadata(&self.maps_path)
            .await
            .map_err(|source| ReconcileError::Filesystem {
                path: self.maps_path.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(ReconcileError::Filesystem {
                path: self.maps_path.clone(),
                source: std::io::Error::other("maps path is not a directory"),
            });
        }
        Ok(())
    }

    async fn mark_up_to_date(&self) -> Result<(), ReconcileError> {
        let sentinel = get_sentinel_path(&self.maps_path);
        fs::write(&sentinel, now_iso())
            .await
            .map_err(|source| ReconcileError::Filesystem {
                path: sentinel,
                source,
            })
    }

    fn log_summary(&self, result: &ReconciliationResult) {
        if !result.removed.is_empty() {
            let verb = match self.stale_policy {
                StalePolicy::Delete => "Deleted",
                StalePolicy::Quarantine => "Quarantined",
            };
            info!(
                "{} {} map(s) not present at remote server: {}",
                verb,
                result.removed.len(),
                result.removed.join(", ")
            );
        }
        for failed in &result.failed_removals {
            warn!(filename = %failed.filename, error = %failed.error, "Stale map was not removed");
        }
        for failed in &result.failed_downloads {
            warn!(filename = %failed.filename, error = %failed.error, "Map was not installed");
        }

        match result.outcome() {
            RunOutcome::Success if result.marked_up_to_date => {
                info!(fetched = result.fetched.len(), "Now up-to-date.");
            }
            RunOutcome::Success => {
                debug!(removed = result.removed.len(), "Maps already in sync");
            }
            RunOutcome::PartialFailure => {
                warn!(
                    fetched = result.fetched.len(),
                    failed = result.failed_downloads.len() + result.failed_removals.len(),
                    "Reconciliation finished with failures"
                );
            }
        }
    }
}
