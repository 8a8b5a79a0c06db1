//! Persisted state: settings, throttle ledger, delivery queue
//!
//! The sync worker owns a [`SyncState`] loaded once at start and pushes every
//! change back through [`StateStore::apply`]. One `apply` call is one atomic
//! write, whatever combination of parts it carries.
//!
//! Two backends:
//! - [`SqliteStore`]: the durable store used by the binaries
//! - [`MemoryStore`]: process-local, with write-failure injection for tests

mod memory;
pub mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::DeliveryQueue;
use crate::throttle::ThrottleLedger;
use crate::types::{Report, Settings};

/// Everything the sync worker keeps between triggers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
    pub settings: Settings,
    pub ledger: ThrottleLedger,
    pub queue: DeliveryQueue,
}

impl SyncState {
    pub fn from_persisted(persisted: PersistedState, queue_capacity: usize) -> Self {
        Self {
            settings: Settings {
                auto_collect: persisted.auto_collect,
                custom_page: persisted.custom_page,
                host_identity: persisted.host_identity,
            },
            ledger: ThrottleLedger::from_entries(persisted.last_sent),
            queue: DeliveryQueue::from_items(persisted.queue, queue_capacity),
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            auto_collect: self.settings.auto_collect,
            custom_page: self.settings.custom_page.clone(),
            queue: self.queue.to_vec(),
            last_sent: self
                .ledger
                .iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            host_identity: self.settings.host_identity.clone(),
        }
    }
}

/// The full state blob in its exported JSON layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub auto_collect: bool,
    pub custom_page: Option<String>,
    pub queue: Vec<Report>,
    pub last_sent: BTreeMap<String, i64>,
    pub host_identity: String,
}

/// Parts of the state to write in one transaction
#[derive(Debug, Default, Clone, Copy)]
pub struct StateUpdate<'a> {
    pub settings: Option<&'a Settings>,
    pub ledger: Option<&'a ThrottleLedger>,
    pub queue: Option<&'a DeliveryQueue>,
}

impl<'a> StateUpdate<'a> {
    pub fn settings(settings: &'a Settings) -> Self {
        Self {
            settings: Some(settings),
            ..Default::default()
        }
    }

    pub fn ledger(ledger: &'a ThrottleLedger) -> Self {
        Self {
            ledger: Some(ledger),
            ..Default::default()
        }
    }

    pub fn queue(queue: &'a DeliveryQueue) -> Self {
        Self {
            queue: Some(queue),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_none() && self.ledger.is_none() && self.queue.is_none()
    }
}

/// Storage backend for [`SyncState`].
///
/// Ledger writes only insert or advance entries; they never remove keys.
/// Queue writes replace the stored queue with the given contents.
pub trait StateStore: Send {
    /// Load the full state, trimming the queue to `queue_capacity`
    fn load(&self, queue_capacity: usize) -> Result<SyncState>;

    /// Load only the user-controlled settings
    fn load_settings(&self) -> Result<Settings>;

    /// Write every part present in `update` atomically
    fn apply(&self, update: StateUpdate<'_>) -> Result<()>;

    /// Restore defaults: empty queue and ledger, default settings
    fn reset(&self) -> Result<()>;
}
