//! One-shot deletion timers armed after a successful download.
//!
//! Each artifact moves through `Unarmed → Armed → Fired` at most once. The
//! transition to `Armed` happens under a lock, so any number of concurrent
//! downloads of the same artifact arm exactly one timer. Timers are detached
//! tokio tasks; nothing waits on them and nothing cancels them.
//!
//! The sweeper may delete the artifact before the timer fires. That is fine:
//! [`ArtifactStore::delete`] reports a missing blob as `Ok(false)` and the
//! fire is logged as a no-op.

use crate::artifact::ArtifactId;
use crate::store::ArtifactStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Arming state of one artifact. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Unarmed,
    Armed,
    Fired,
}

/// Collection of independent per-artifact deletion timers.
#[derive(Debug)]
pub struct DeferredDeletionScheduler {
    store: Arc<ArtifactStore>,
    states: Arc<Mutex<HashMap<ArtifactId, ArmState>>>,
    fired: Arc<AtomicUsize>,
}

impl DeferredDeletionScheduler {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            states: Arc::new(Mutex::new(HashMap::new())),
            fired: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Schedule deletion of `id` after `delay`, unless a timer was already
    /// armed for it. Returns `true` only when this call armed the timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm_once(&self, id: &ArtifactId, delay: Duration) -> bool {
        {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            match states.get(id) {
                Some(ArmState::Armed) | Some(ArmState::Fired) => {
                    debug!("Deferred deletion of {} already armed", id);
                    return false;
                }
                Some(ArmState::Unarmed) | None => {
                    states.insert(id.clone(), ArmState::Armed);
                }
            }
        }

        debug!("Armed deferred deletion of {} in {:?}", id, delay);

        let store = Arc::clone(&self.store);
        let states = Arc::clone(&self.states);
        let fired = Arc::clone(&self.fired);
        let id = id.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            match store.delete(&id).await {
                Ok(true) => info!("Reclaimed downloaded artifact {}", id),
                Ok(false) => debug!("Artifact {} was already reclaimed", id),
                Err(e) => warn!("Deferred deletion of {} failed: {}", id, e),
            }

            states
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, ArmState::Fired);
            fired.fetch_add(1, Ordering::SeqCst);
        });

        true
    }

    pub fn state(&self, id: &ArtifactId) -> ArmState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
            .unwrap_or(ArmState::Unarmed)
    }

    /// Number of timers armed but not yet fired.
    pub fn pending(&self) -> usize {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| **s == ArmState::Armed)
            .count()
    }

    /// Total timers that have fired since construction.
    pub fn fired_count(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Forget every `Fired` entry and return how many were dropped.
    ///
    /// A fired id has been deleted, so it can no longer be resolved and
    /// therefore never reaches `arm_once` again.
    pub fn prune_fired(&self) -> usize {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let before = states.len();
        states.retain(|_, s| *s != ArmState::Fired);
        before - states.len()
    }
}
