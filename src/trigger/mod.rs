//! What starts a reconciliation pass.
//!
//! Two sources feed the updater: a fixed-interval timer, and upload
//! notifications from the notification bus. Both go through
//! [`MapUpdater::check_maps`], so their passes never overlap.

mod notify;
mod wamp;

pub use notify::NotifyClient;
pub use wamp::{WampMessage, SUBPROTOCOL};

use crate::updater::MapUpdater;
use crate::utils::{has_suffix_ignore_case, ARCHIVE_SUFFIX, MAP_SUFFIX};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session aborted by router: {0}")]
    Aborted(String),
}

/// Signal sent to the long-running trigger loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    None,
    Shutdown,
}

/// Resolve once a shutdown has been signalled or the sender is gone
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<ShutdownSignal>) {
    loop {
        if *shutdown.borrow_and_update() == ShutdownSignal::Shutdown {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Turn uploaded map names into the forced set of a pass.
///
/// Uploads are announced by their decompressed name; only maps count, and
/// each gets the compression suffix the remote stores it under.
pub fn forced_from_upload(filenames: &[String]) -> Vec<String> {
    filenames
        .iter()
        .filter(|name| has_suffix_ignore_case(name, MAP_SUFFIX))
        .map(|name| format!("{}{}", name, ARCHIVE_SUFFIX))
        .collect()
}

/// Routes timer ticks and notifications into the updater.
#[derive(Clone)]
pub struct TriggerCoordinator {
    updater: Arc<MapUpdater>,
}

impl TriggerCoordinator {
    pub fn new(updater: Arc<MapUpdater>) -> Self {
        Self { updater }
    }

    /// Start a pass in the background; failures are logged by the engine
    pub fn spawn_check(&self, forced: Vec<String>) -> JoinHandle<()> {
        let updater = Arc::clone(&self.updater);
        tokio::spawn(async move {
            let _ = updater.check_maps(&forced).await;
        })
    }

    /// A notification session was established
    pub fn on_connected(&self) -> JoinHandle<()> {
        self.spawn_check(Vec::new())
    }

    /// Maps finished uploading; fetch them even if the listing lags behind
    pub fn on_upload_finished(&self, filenames: &[String]) -> JoinHandle<()> {
        info!(count = filenames.len(), "Remote update triggered.");
        self.spawn_check(forced_from_upload(filenames))
    }

    /// Run a pass now and then every `interval` until shutdown.
    ///
    /// A tick waits for its pass to finish; ticks missed meanwhile are
    /// delayed rather than run back to back.
    pub async fn run_periodic(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<ShutdownSignal>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.updater.check_maps(&[]).await;
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Periodic map check stopped");
                    break;
                }
            }
        }
    }
}
