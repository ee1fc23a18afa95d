//! Id → live run lookup.
//!
//! The registry never owns a run. It holds a [`RunHandle`] per id so that
//! `cancel(id)` can reach the run without the caller keeping a reference.
//! All map operations go through one mutex; the cancel flag lives outside of
//! it so that cancelling never waits for the lock holder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::CountdownError;

/// Non-owning reference to a live run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    started_at: DateTime<Utc>,
}

impl RunHandle {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
            started_at: Utc::now(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Request cancellation. Returns `true` if this call set the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct CountdownRegistry {
    entries: Mutex<HashMap<String, RunHandle>>,
}

impl CountdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `id`.
    ///
    /// An entry whose run was already cancelled is only waiting for its run
    /// to observe the flag; it is replaced. Any other existing entry makes
    /// registration fail.
    ///
    /// # Errors
    ///
    /// Returns [`CountdownError::DuplicateRun`] if a live, uncancelled run
    /// holds `id`.
    pub fn register(&self, id: &str, handle: RunHandle) -> Result<(), CountdownError> {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(id) {
            if !existing.is_cancelled() {
                return Err(CountdownError::DuplicateRun { id: id.to_string() });
            }
        }
        entries.insert(id.to_string(), handle);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<RunHandle> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Remove the entry for `id`. No-op when absent.
    pub fn remove(&self, id: &str) -> Option<RunHandle> {
        self.lock().remove(id)
    }

    /// Remove the entry for `id` only if it still belongs to `generation`.
    pub fn remove_if_current(&self, id: &str, generation: u64) -> bool {
        let mut entries = self.lock();
        match entries.get(id) {
            Some(handle) if handle.generation == generation => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn handles(&self) -> Vec<(String, RunHandle)> {
        self.lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunHandle>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
