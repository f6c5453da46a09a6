mod execute;
mod plan;
mod stale;

pub use execute::{
    FailedMap, ReconcileError, ReconciliationEngine, ReconciliationResult, RunOutcome,
};
pub use plan::{build_reconciliation_plan, MissingMap, ReconciliationPlan};
pub use stale::{remove_stale_maps, StaleOutcome};
