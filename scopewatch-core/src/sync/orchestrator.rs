//! The event → throttle → deliver-or-queue pipeline
//!
//! State changes are staged on clones and swapped into the orchestrator only
//! after the store accepted them. A failed write aborts the trigger and the
//! in-memory state stays equal to what was last durably written.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::SyncStats;
use crate::collector::DeliveryClient;
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, Result};
use crate::policy;
use crate::queue::{DeliveryQueue, QUEUE_CAP};
use crate::store::{StateStore, StateUpdate, SyncState};
use crate::throttle::DEFAULT_COOLDOWN_MS;
use crate::types::{NavigationEvent, Report};

/// Timing and capacity knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub cooldown: chrono::Duration,
    pub queue_capacity: usize,
    pub flush_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            cooldown: chrono::Duration::milliseconds(DEFAULT_COOLDOWN_MS),
            queue_capacity: QUEUE_CAP,
            flush_interval: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&DeliveryConfig> for SyncOptions {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            queue_capacity: config.queue_capacity,
            flush_interval: config.flush_interval(),
        }
    }
}

/// What happened to one navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// No rule matched (or collection is off, or not a top-level http(s) page)
    Ignored,
    /// Every candidate was inside its cooldown window
    Throttled,
    /// The admitted reports were acknowledged immediately
    Delivered { count: usize },
    /// Immediate delivery failed; the admitted reports were queued
    Queued {
        count: usize,
        evicted: usize,
        reason: DeliveryError,
    },
}

/// What happened to one flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued
    Empty,
    /// The whole snapshot was acknowledged and removed from the queue
    Delivered { count: usize },
    /// Delivery failed; the queue is unchanged
    Failed { pending: usize, reason: DeliveryError },
}

impl FlushOutcome {
    /// True when nothing is left pending because of this flush
    pub fn is_ok(&self) -> bool {
        !matches!(self, FlushOutcome::Failed { .. })
    }
}

/// Owns the sync state and runs one trigger at a time
pub struct Orchestrator<S> {
    store: S,
    client: DeliveryClient,
    state: SyncState,
    options: SyncOptions,
    stats: SyncStats,
}

impl<S: StateStore> Orchestrator<S> {
    /// Load the persisted state and build an orchestrator around it
    pub fn new(store: S, client: DeliveryClient, options: SyncOptions) -> Result<Self> {
        let state = store.load(options.queue_capacity)?;
        tracing::info!(
            queued = state.queue.len(),
            ledger_keys = state.ledger.len(),
            host = %state.settings.host_identity,
            "Sync state loaded"
        );
        Ok(Self {
            store,
            client,
            state,
            options,
            stats: SyncStats::default(),
        })
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process one navigation observed now
    pub async fn handle_navigation(&mut self, event: &NavigationEvent) -> Result<NavigationOutcome> {
        self.handle_navigation_at(event, Utc::now()).await
    }

    /// Process one navigation observed at `now`
    pub async fn handle_navigation_at(
        &mut self,
        event: &NavigationEvent,
        now: DateTime<Utc>,
    ) -> Result<NavigationOutcome> {
        self.stats.events_seen += 1;
        self.refresh_settings()?;

        let candidates = policy::evaluate(event, &self.state.settings, now);
        if candidates.is_empty() {
            self.stats.events_ignored += 1;
            return Ok(NavigationOutcome::Ignored);
        }

        let candidate_count = candidates.len();
        let mut ledger = self.state.ledger.clone();
        let admitted = ledger.admit(candidates, now, self.options.cooldown);
        self.stats.reports_throttled += (candidate_count - admitted.len()) as u64;

        if admitted.is_empty() {
            return Ok(NavigationOutcome::Throttled);
        }

        // Record before attempting delivery: a failed or slow attempt must not
        // let these keys qualify again inside the cooldown window.
        if let Err(e) = self.store.apply(StateUpdate::ledger(&ledger)) {
            tracing::error!(error = %e, "Failed to persist throttle ledger; dropping navigation");
            return Err(e);
        }
        self.state.ledger = ledger;
        self.stats.reports_admitted += admitted.len() as u64;

        let host = self.state.settings.host_identity.clone();
        match self.client.send(&host, &admitted).await {
            Ok(_) => {
                self.stats.immediate_deliveries += 1;
                tracing::info!(host = %host, count = admitted.len(), "Reports delivered");
                Ok(NavigationOutcome::Delivered {
                    count: admitted.len(),
                })
            }
            Err(reason) => {
                self.stats.immediate_failures += 1;
                tracing::warn!(
                    host = %host,
                    count = admitted.len(),
                    error = %reason,
                    "Immediate delivery failed; queueing reports"
                );
                let count = admitted.len();
                let evicted = self.enqueue_all(admitted)?;
                Ok(NavigationOutcome::Queued {
                    count,
                    evicted,
                    reason,
                })
            }
        }
    }

    /// Try to deliver everything currently queued as one batch
    pub async fn flush(&mut self) -> Result<FlushOutcome> {
        self.refresh_settings()?;

        let Some(snapshot) = self.state.queue.flush_snapshot() else {
            tracing::debug!("Flush skipped: queue empty");
            return Ok(FlushOutcome::Empty);
        };

        self.stats.flushes_attempted += 1;
        let count = snapshot.len();
        let host = self.state.settings.host_identity.clone();

        match self.client.send(&host, snapshot.items()).await {
            Ok(_) => {
                let mut queue = self.state.queue.clone();
                queue.clear_delivered(snapshot);
                if let Err(e) = self.store.apply(StateUpdate::queue(&queue)) {
                    // Delivered but not cleared: the batch goes out again next time
                    tracing::error!(error = %e, count, "Failed to persist cleared queue");
                    return Err(e);
                }
                self.state.queue = queue;
                self.stats.flushes_succeeded += 1;
                tracing::info!(host = %host, count, "Queue flushed");
                Ok(FlushOutcome::Delivered { count })
            }
            Err(reason) => {
                self.stats.flushes_failed += 1;
                tracing::warn!(
                    host = %host,
                    pending = count,
                    error = %reason,
                    "Flush failed; queue kept for retry"
                );
                Ok(FlushOutcome::Failed {
                    pending: count,
                    reason,
                })
            }
        }
    }

    /// Settings belong to the settings store; re-read them on every trigger.
    fn refresh_settings(&mut self) -> Result<()> {
        match self.store.load_settings() {
            Ok(settings) => {
                self.state.settings = settings;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read settings");
                Err(e)
            }
        }
    }

    /// Queue reports one by one and persist the result in a single write
    fn enqueue_all(&mut self, reports: Vec<Report>) -> Result<usize> {
        let mut queue: DeliveryQueue = self.state.queue.clone();
        let count = reports.len();
        let evicted: usize = reports.into_iter().map(|r| queue.enqueue(r)).sum();

        if let Err(e) = self.store.apply(StateUpdate::queue(&queue)) {
            tracing::error!(error = %e, count, "Failed to persist queue; reports dropped");
            return Err(e);
        }

        if evicted > 0 {
            tracing::warn!(
                evicted,
                capacity = queue.capacity(),
                "Queue full; oldest reports evicted"
            );
        }

        self.state.queue = queue;
        self.stats.reports_queued += count as u64;
        self.stats.reports_evicted += evicted as u64;
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Channel, ClientInfo, Transport};
    use crate::store::MemoryStore;
    use crate::types::ReportKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Acknowledges every request while `up`, refuses to connect otherwise
    #[derive(Default)]
    struct SwitchTransport {
        up: AtomicBool,
        requests: Mutex<Vec<serde_json::Value>>,
        opened: AtomicUsize,
    }

    struct EchoChannel {
        reply: Option<serde_json::Value>,
        transport: Arc<SwitchTransport>,
    }

    struct Shared(Arc<SwitchTransport>);

    #[async_trait]
    impl Transport for Shared {
        async fn open(&self, _host: &str) -> std::result::Result<Box<dyn Channel>, DeliveryError> {
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            if !self.0.up.load(Ordering::SeqCst) {
                return Err(DeliveryError::Unreachable("collector down".to_string()));
            }
            Ok(Box::new(EchoChannel {
                reply: None,
                transport: self.0.clone(),
            }))
        }
    }

    #[async_trait]
    impl Channel for EchoChannel {
        async fn send(&mut self, message: &serde_json::Value) -> std::result::Result<(), DeliveryError> {
            self.transport.requests.lock().unwrap().push(message.clone());
            self.reply = Some(json!({"status": "success", "request_id": message["request_id"]}));
            Ok(())
        }

        async fn recv(&mut self) -> std::result::Result<Option<serde_json::Value>, DeliveryError> {
            Ok(self.reply.take())
        }

        async fn close(&mut self) {}
    }

    fn orchestrator(up: bool) -> (Orchestrator<MemoryStore>, MemoryStore, Arc<SwitchTransport>) {
        let transport = Arc::new(SwitchTransport::default());
        transport.up.store(up, Ordering::SeqCst);
        let client = DeliveryClient::new(
            Arc::new(Shared(transport.clone())),
            ClientInfo::default(),
            Duration::from_secs(1),
        );
        let store = MemoryStore::new();
        let orch = Orchestrator::new(store.clone(), client, SyncOptions::default()).unwrap();
        (orch, store, transport)
    }

    #[tokio::test]
    async fn test_delivered_navigation_records_key_and_leaves_queue_empty() {
        let (mut orch, store, transport) = orchestrator(true);

        let outcome = orch
            .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Delivered { count: 1 });

        let persisted = store.snapshot().unwrap();
        assert!(persisted.last_sent.contains_key("domain:lib.edu"));
        assert!(persisted.queue.is_empty());

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_navigation_records_key_and_queues_report() {
        let (mut orch, store, _transport) = orchestrator(false);

        let outcome = orch
            .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            NavigationOutcome::Queued {
                count: 1,
                evicted: 0,
                ..
            }
        ));

        let persisted = store.snapshot().unwrap();
        assert!(persisted.last_sent.contains_key("domain:lib.edu"));
        assert_eq!(persisted.queue.len(), 1);
        assert_eq!(persisted.queue[0].kind, ReportKind::Domain);
        assert_eq!(persisted.queue[0].value, "lib.edu");
    }

    #[tokio::test]
    async fn test_repeat_navigation_is_throttled_even_after_failure() {
        let (mut orch, store, transport) = orchestrator(false);
        let event = NavigationEvent::top_level("https://lib.edu/");

        orch.handle_navigation(&event).await.unwrap();
        transport.up.store(true, Ordering::SeqCst);
        let outcome = orch.handle_navigation(&event).await.unwrap();

        assert_eq!(outcome, NavigationOutcome::Throttled);
        assert_eq!(store.snapshot().unwrap().queue.len(), 1);
        assert_eq!(orch.stats().reports_throttled, 1);
    }

    #[tokio::test]
    async fn test_cooldown_expiry_allows_resend() {
        let (mut orch, _store, _transport) = orchestrator(true);
        let event = NavigationEvent::top_level("https://lib.edu/");
        let now = Utc::now();

        orch.handle_navigation_at(&event, now).await.unwrap();
        let later = now + chrono::Duration::days(7) + chrono::Duration::seconds(1);
        let outcome = orch.handle_navigation_at(&event, later).await.unwrap();
        assert_eq!(outcome, NavigationOutcome::Delivered { count: 1 });
    }

    #[tokio::test]
    async fn test_ineligible_navigation_touches_nothing() {
        let (mut orch, store, transport) = orchestrator(true);

        let outcome = orch
            .handle_navigation(&NavigationEvent::top_level("https://example.com/"))
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Ignored);
        assert_eq!(store.write_count(), 0);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_two_reports_share_one_ledger_write_and_one_request() {
        let (mut orch, store, transport) = orchestrator(true);
        let mut settings = store.load_settings().unwrap();
        settings.set_custom_page("https://site.gov/aid").unwrap();
        store.apply(StateUpdate::settings(&settings)).unwrap();
        let writes_before = store.write_count();

        let outcome = orch
            .handle_navigation(&NavigationEvent::top_level("https://site.gov/aid?x=1"))
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Delivered { count: 2 });
        assert_eq!(store.write_count(), writes_before + 1);

        let persisted = store.snapshot().unwrap();
        assert!(persisted.last_sent.contains_key("domain:site.gov"));
        assert!(persisted.last_sent.contains_key("page:https://site.gov/aid"));
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_keeps_queue_on_failure_and_clears_on_success() {
        let (mut orch, store, transport) = orchestrator(false);
        orch.handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
            .await
            .unwrap();
        orch.handle_navigation(&NavigationEvent::top_level("https://irs.gov/"))
            .await
            .unwrap();
        let before = store.snapshot().unwrap().queue;

        let outcome = orch.flush().await.unwrap();
        assert!(matches!(outcome, FlushOutcome::Failed { pending: 2, .. }));
        assert!(!outcome.is_ok());
        assert_eq!(store.snapshot().unwrap().queue, before);
        assert_eq!(orch.state().queue.to_vec(), before);

        transport.up.store(true, Ordering::SeqCst);
        let outcome = orch.flush().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Delivered { count: 2 });
        assert!(store.snapshot().unwrap().queue.is_empty());

        let requests = transport.requests.lock().unwrap();
        let values: Vec<_> = requests[0]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["value"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["lib.edu", "irs.gov"]);
    }

    #[tokio::test]
    async fn test_flush_of_empty_queue_sends_nothing() {
        let (mut orch, _store, transport) = orchestrator(true);
        let outcome = orch.flush().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Empty);
        assert!(outcome.is_ok());
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
        assert_eq!(orch.stats().flushes_attempted, 0);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_cycle_without_side_effects() {
        let (mut orch, store, transport) = orchestrator(true);
        store.set_fail_writes(true);

        let result = orch
            .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
            .await;
        assert!(result.is_err());
        assert!(orch.state().ledger.is_empty());
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);

        // Next trigger retries from the last durable state
        store.set_fail_writes(false);
        let outcome = orch
            .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Delivered { count: 1 });
    }

    #[tokio::test]
    async fn test_settings_changes_apply_to_next_event() {
        let (mut orch, store, _transport) = orchestrator(true);
        let mut settings = store.load_settings().unwrap();
        settings.auto_collect = false;
        store.apply(StateUpdate::settings(&settings)).unwrap();

        let outcome = orch
            .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
            .await
            .unwrap();
        assert_eq!(outcome, NavigationOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_overflow_evicts_oldest_and_counts() {
        let transport = Arc::new(SwitchTransport::default());
        let client = DeliveryClient::new(
            Arc::new(Shared(transport)),
            ClientInfo::default(),
            Duration::from_secs(1),
        );
        let store = MemoryStore::new();
        let options = SyncOptions {
            queue_capacity: 2,
            ..Default::default()
        };
        let mut orch = Orchestrator::new(store.clone(), client, options).unwrap();

        for host in ["a.gov", "b.gov", "c.gov"] {
            orch.handle_navigation(&NavigationEvent::top_level(format!("https://{host}/")))
                .await
                .unwrap();
        }

        let queue = store.snapshot().unwrap().queue;
        let values: Vec<_> = queue.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["b.gov", "c.gov"]);
        assert_eq!(orch.stats().reports_evicted, 1);
    }
}
