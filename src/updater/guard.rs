use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Lets at most one reconciliation run at a time.
///
/// A caller arriving while a run is in flight waits for it to finish and
/// then runs its own pass; it does not share the earlier run's result.
/// Waiters are admitted in arrival order.
#[derive(Debug, Default)]
pub struct SingleFlightGuard {
    lock: Mutex<()>,
    waiting: AtomicUsize,
}

impl SingleFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callers currently queued behind the running pass
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub async fn run<F, T>(&self, run: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let queued = self.waiting.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(queued, "Reconciliation already running, waiting");
                let guard = self.lock.lock().await;
                self.waiting.fetch_sub(1, Ordering::SeqCst);
                guard
            }
        };
        run.await
    }
}
