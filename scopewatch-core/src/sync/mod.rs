//! Sync orchestration
//!
//! The [`Orchestrator`] runs the pipeline for each trigger:
//!
//! ```text
//! navigation → policy → throttle (record) → immediate delivery
//!                                            └─ on failure → queue
//! timer / manual flush → queue snapshot → delivery → clear on success
//! ```
//!
//! [`service::spawn`] puts one orchestrator behind a single-consumer command
//! channel so that navigations, timer ticks and manual flushes never run
//! concurrently.

mod orchestrator;
pub mod service;

pub use orchestrator::{FlushOutcome, NavigationOutcome, Orchestrator, SyncOptions};
pub use service::{FlushReply, SyncHandle};

/// Counters kept by the orchestrator for the lifetime of the process
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Navigations received
    pub events_seen: u64,
    /// Navigations that produced no candidate report
    pub events_ignored: u64,
    /// Reports that passed the throttle
    pub reports_admitted: u64,
    /// Candidate reports suppressed by the throttle
    pub reports_throttled: u64,
    /// Immediate attempts acknowledged by the collector
    pub immediate_deliveries: u64,
    /// Immediate attempts that failed and fell back to the queue
    pub immediate_failures: u64,
    /// Reports placed on the queue
    pub reports_queued: u64,
    /// Reports dropped from a full queue
    pub reports_evicted: u64,
    /// Non-empty flushes attempted
    pub flushes_attempted: u64,
    /// Flushes that delivered and cleared their snapshot
    pub flushes_succeeded: u64,
    /// Flushes that left the queue untouched
    pub flushes_failed: u64,
}
