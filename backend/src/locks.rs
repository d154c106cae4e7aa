//! Per-study serialization of recommendation recomputes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = HashMap<Uuid, Arc<AsyncMutex<()>>>;

/// One async mutex per study, created on first use.
///
/// The guard is held across the read-reconcile-write sequence so two
/// recomputes of one study in this process never interleave. An entry is
/// removed when its last guard drops with nobody waiting, so the map only
/// holds studies with a recompute in flight.
#[derive(Clone, Default)]
pub struct StudyLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Held for the duration of one recompute
pub struct StudyLockGuard {
    study_id: Uuid,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    map: Arc<Mutex<LockMap>>,
}

impl StudyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, study_id: Uuid) -> StudyLockGuard {
        let lock = {
            // A poisoned map only means another thread panicked while inserting
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(study_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;

        StudyLockGuard {
            study_id,
            lock,
            guard: Some(guard),
            map: self.inner.clone(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Drop for StudyLockGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        // Clones are only taken under the map lock: the map's and ours mean no waiters
        let idle = map
            .get(&self.study_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2);
        if idle {
            map.remove(&self.study_id);
        }
    }
}
