//! In-process state store
//!
//! Clones share the same underlying state, so a test can hand one clone to
//! the sync worker and inspect the other.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{PersistedState, StateStore, StateUpdate, SyncState};
use crate::error::{Error, Result};
use crate::types::Settings;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<SyncState>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `apply`/`reset` fail until turned off
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current contents in the exported layout
    pub fn snapshot(&self) -> Result<PersistedState> {
        Ok(self.lock()?.to_persisted())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SyncState>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store("write rejected (injected failure)".to_string()));
        }
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn load(&self, queue_capacity: usize) -> Result<SyncState> {
        let state = self.lock()?;
        Ok(SyncState::from_persisted(
            state.to_persisted(),
            queue_capacity,
        ))
    }

    fn load_settings(&self) -> Result<Settings> {
        Ok(self.lock()?.settings.clone())
    }

    fn apply(&self, update: StateUpdate<'_>) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.check_writable()?;

        let mut state = self.lock()?;
        if let Some(settings) = update.settings {
            state.settings = settings.clone();
        }
        if let Some(ledger) = update.ledger {
            state.ledger.merge(ledger);
        }
        if let Some(queue) = update.queue {
            state.queue = queue.clone();
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.check_writable()?;
        *self.lock()? = SyncState::default();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
