mod guard;

pub use guard::SingleFlightGuard;

use crate::config::{ConfigError, UpdaterConfig};
use crate::download::{CommandExtractor, ConcurrencyLimiter, DownloadPipeline, Extractor};
use crate::http::{HttpClient, HttpError, ReqwestClient};
use crate::listing::{build_provider, ListingProvider};
use crate::reconciliation::{ReconcileError, ReconciliationEngine, ReconciliationResult};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    HttpError(#[from] HttpError),
}

/// The reconciliation engine behind a single-flight guard.
///
/// This is what triggers call into; overlapping calls are serialized.
pub struct MapUpdater {
    engine: ReconciliationEngine,
    guard: SingleFlightGuard,
}

impl MapUpdater {
    pub fn new(engine: ReconciliationEngine) -> Self {
        Self {
            engine,
            guard: SingleFlightGuard::new(),
        }
    }

    /// Build an updater from configuration with explicit collaborators
    pub fn with_parts(
        config: &UpdaterConfig,
        client: Arc<dyn HttpClient>,
        provider: Arc<dyn ListingProvider>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self, UpdaterError> {
        config.validate()?;

        let pipeline = DownloadPipeline::new(
            client,
            extractor,
            ConcurrencyLimiter::new(config.download_limit),
            config.fetch_base_url()?,
            config.maps_path.clone(),
        );
        let engine = ReconciliationEngine::new(
            config.maps_path.clone(),
            provider,
            pipeline,
            config.stale_policy(),
        );
        Ok(Self::new(engine))
    }

    /// Build an updater that talks to the real remote and extraction tool
    pub fn from_config(config: &UpdaterConfig) -> Result<Self, UpdaterError> {
        let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);
        let provider = build_provider(config, Arc::clone(&client));
        let extractor = Arc::new(CommandExtractor::new(
            config.extract_command.clone(),
            config.extract_timeout(),
        ));
        Self::with_parts(config, client, provider, extractor)
    }

    pub fn maps_path(&self) -> &Path {
        self.engine.maps_path()
    }

    /// Reconcile the maps directory, waiting for any pass already running.
    ///
    /// `forced` names are treated as present remotely for this pass.
    pub async fn check_maps(
        &self,
        forced: &[String],
    ) -> Result<ReconciliationResult, ReconcileError> {
        self.guard.run(self.engine.run(forced)).await
    }
}
