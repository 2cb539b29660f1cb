//! Per-session registry of live workers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::router::RouterError;
use crate::worker::{WorkerRecord, WorkerSnapshot, WorkerState};

/// Live workers of one session, keyed by process id.
///
/// Lookups and mutations take the same lock, so a worker is never visible
/// half registered.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<u32, Arc<WorkerRecord>>>,
}

impl WorkerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record.
    ///
    /// An exited record still holding the same id (the OS reused it before
    /// the old end event was processed) is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Duplicate`] if a live worker already has the id.
    pub fn register(&self, record: Arc<WorkerRecord>) -> Result<(), RouterError> {
        let mut workers = self.write();
        let id = record.id();
        if let Some(existing) = workers.get(&id) {
            if existing.state() != WorkerState::Exited {
                return Err(RouterError::Duplicate(id));
            }
            tracing::debug!(id, "Replacing stale worker record");
        }
        workers.insert(id, record);
        Ok(())
    }

    /// Remove the entry for `id` only if it is still `record`.
    pub fn remove_if(&self, record: &Arc<WorkerRecord>) -> bool {
        let mut workers = self.write();
        let id = record.id();
        let is_current = workers
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, record));
        if is_current {
            workers.remove(&id);
        }
        is_current
    }

    /// Remove whatever is registered under `id`.
    pub fn remove(&self, id: u32) -> Option<Arc<WorkerRecord>> {
        self.write().remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<Arc<WorkerRecord>> {
        self.read().get(&id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.read().contains_key(&id)
    }

    /// Registered ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn all(&self) -> Vec<Arc<WorkerRecord>> {
        let mut records: Vec<_> = self.read().values().cloned().collect();
        records.sort_by_key(|r| r.id());
        records
    }

    /// Records running `script_name`.
    #[must_use]
    pub fn by_script(&self, script_name: &str) -> Vec<Arc<WorkerRecord>> {
        self.all()
            .into_iter()
            .filter(|r| r.script_name() == script_name)
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.all().iter().map(|r| r.snapshot()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u32, Arc<WorkerRecord>>> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u32, Arc<WorkerRecord>>> {
        self.workers.write().unwrap_or_else(PoisonError::into_inner)
    }
}
