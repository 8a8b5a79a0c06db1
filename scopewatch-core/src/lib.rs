//! # scopewatch-core
//!
//! Core library for scopewatch - a scoped navigation reporter.
//!
//! This library provides:
//! - Scope policy: which navigations produce `domain`/`page` reports
//! - A per-key throttle ledger and a bounded FIFO delivery queue
//! - Durable state storage with SQLite
//! - A delivery client for the external collector process
//! - A single-consumer sync worker tying it all together
//! - Configuration management and logging infrastructure
//!
//! ## Pipeline
//!
//! Each top-level navigation is evaluated against the scope rules. Candidate
//! reports pass through the throttle (which records them immediately), are
//! sent to the collector right away, and fall back to the queue when that
//! fails. A periodic timer and manual flush requests drain the queue.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scopewatch_core::{
//!     Config, DeliveryClient, NativeHostTransport, NavigationEvent, Orchestrator, SqliteStore,
//!     SyncOptions,
//! };
//!
//! # async fn demo() -> scopewatch_core::Result<()> {
//! let config = Config::load()?;
//! let store = SqliteStore::open(&Config::database_path())?;
//! store.migrate()?;
//!
//! let transport = Arc::new(NativeHostTransport::new(config.hosts.clone()));
//! let client = DeliveryClient::new(
//!     transport,
//!     (&config.client).into(),
//!     config.delivery.timeout(),
//! );
//!
//! let mut orchestrator = Orchestrator::new(store, client, SyncOptions::from(&config.delivery))?;
//! orchestrator
//!     .handle_navigation(&NavigationEvent::top_level("https://www.lib.edu/"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use collector::{ClientInfo, DeliveryClient, NativeHostTransport};
pub use config::Config;
pub use error::{DeliveryError, Error, Result};
pub use queue::{DeliveryQueue, QUEUE_CAP};
pub use store::{MemoryStore, PersistedState, SqliteStore, StateStore, StateUpdate, SyncState};
pub use sync::{
    FlushOutcome, FlushReply, NavigationOutcome, Orchestrator, SyncHandle, SyncOptions, SyncStats,
};
pub use throttle::ThrottleLedger;
pub use types::*;

// Public modules
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod policy;
pub mod queue;
pub mod store;
pub mod sync;
pub mod throttle;
pub mod types;
