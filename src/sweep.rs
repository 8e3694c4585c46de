//! Periodic age-based reclamation.
//!
//! Every pass lists the store and deletes each artifact whose age has reached
//! the TTL. A failed deletion is logged and the pass moves on; a pass never
//! returns an error. The scheduler is an explicit object that reads time
//! through the store's injected clock, so "when did the last sweep run" is
//! observable and testable without real sleeps.

use crate::deferred::DeferredDeletionScheduler;
use crate::store::ArtifactStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Artifacts seen by the listing.
    pub scanned: usize,
    /// Artifacts at or past the TTL that were removed by this pass.
    pub deleted: usize,
    /// Expired artifacts whose deletion failed; retried next pass.
    pub failed: usize,
}

/// Fixed-interval collector of expired artifacts.
#[derive(Debug)]
pub struct SweepScheduler {
    store: Arc<ArtifactStore>,
    ttl: Duration,
    interval: Duration,
    deferred: Option<Arc<DeferredDeletionScheduler>>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl SweepScheduler {
    pub fn new(store: Arc<ArtifactStore>, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            ttl,
            interval,
            deferred: None,
            last_sweep: Mutex::new(None),
        }
    }

    /// Prune fired arm states from `deferred` after every pass.
    pub fn with_deferred(mut self, deferred: Arc<DeferredDeletionScheduler>) -> Self {
        self.deferred = Some(deferred);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When the most recent pass started, by the store's clock.
    pub fn last_sweep_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a single pass.
    pub async fn run_pass(&self) -> SweepReport {
        let started = self.store.now();
        *self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner) = Some(started);

        let listed = match self.store.list().await {
            Ok(listed) => listed,
            Err(e) => {
                warn!("Sweep skipped: cannot list artifacts: {}", e);
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            scanned: listed.len(),
            ..SweepReport::default()
        };

        for entry in listed.iter().filter(|e| e.age >= self.ttl) {
            match self.store.delete(&entry.artifact.id).await {
                Ok(true) => {
                    debug!(
                        "Swept artifact {} (age {}s)",
                        entry.artifact.id,
                        entry.age.as_secs()
                    );
                    report.deleted += 1;
                }
                // Reclaimed by a deferred timer in the meantime.
                Ok(false) => {}
                Err(e) => {
                    warn!("Sweep could not delete {}: {}", entry.artifact.id, e);
                    report.failed += 1;
                }
            }
        }

        if let Some(deferred) = &self.deferred {
            let pruned = deferred.prune_fired();
            if pruned > 0 {
                debug!("Pruned {} fired deletion timers", pruned);
            }
        }

        if report.deleted > 0 || report.failed > 0 {
            info!(
                "Sweep pass: {} scanned, {} deleted, {} failed",
                report.scanned, report.deleted, report.failed
            );
        }
        report
    }

    /// Run passes forever on the configured interval. The first pass runs
    /// immediately. Abort the returned handle to stop.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                sweeper.run_pass().await;
            }
        })
    }
}
