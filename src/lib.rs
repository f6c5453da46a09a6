pub mod config;
pub mod download;
pub mod http;
pub mod inventory;
pub mod listing;
pub mod reconciliation;
pub mod trigger;
pub mod updater;
pub mod utils;

// Re-export commonly used types
pub use config::{read_config, ConfigError, ListingConfig, NotifyConfig, StalePolicy, UpdaterConfig};
pub use download::{
    CommandExtractor, ConcurrencyLimiter, DownloadError, DownloadPipeline, ExtractError, Extractor,
};
pub use http::{HttpClient, HttpError, ReqwestClient};
pub use inventory::{scan_local_maps, LocalMapFile};
pub use listing::{
    build_provider, BucketListProvider, DirectoryScrapeProvider, ListingError, ListingProvider,
    RemoteListing,
};
pub use reconciliation::{
    build_reconciliation_plan, FailedMap, ReconcileError, ReconciliationEngine,
    ReconciliationPlan, ReconciliationResult, RunOutcome,
};
pub use trigger::{forced_from_upload, NotifyClient, NotifyError, ShutdownSignal, TriggerCoordinator};
pub use updater::{MapUpdater, SingleFlightGuard, UpdaterError};
