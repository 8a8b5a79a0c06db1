//! Integration tests for the navigation → delivery pipeline
//!
//! These tests run against a file-backed SQLite store and real collector
//! processes spawned from standard utilities:
//! - `cat` echoes every frame back, so the response carries the request id
//! - `true` exits immediately without answering
//! - `sleep` keeps the channel open and never answers

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use scopewatch_core::config::HostConfig;
use scopewatch_core::sync::service;
use scopewatch_core::{
    ClientInfo, DeliveryClient, DeliveryError, FlushOutcome, NativeHostTransport,
    NavigationEvent, NavigationOutcome, Orchestrator, ReportKind, Settings, SqliteStore,
    StateStore, StateUpdate, SyncOptions, ThrottleKey, DEFAULT_HOST_IDENTITY,
};
use tempfile::TempDir;

/// Register `command args..` as the collector for the default host identity
fn hosts(command: Option<(&str, &[&str])>) -> HashMap<String, HostConfig> {
    let mut hosts = HashMap::new();
    if let Some((command, args)) = command {
        hosts.insert(
            DEFAULT_HOST_IDENTITY.to_string(),
            HostConfig {
                command: command.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
        );
    }
    hosts
}

fn open_store(path: &Path) -> SqliteStore {
    let store = SqliteStore::open(path).expect("failed to open store");
    store.migrate().expect("failed to migrate store");
    store
}

fn orchestrator(
    path: &Path,
    collector: Option<(&str, &[&str])>,
    timeout: Duration,
) -> Orchestrator<SqliteStore> {
    scopewatch_core::logging::init_test();
    let transport = Arc::new(NativeHostTransport::new(hosts(collector)));
    let client = DeliveryClient::new(transport, ClientInfo::default(), timeout);
    Orchestrator::new(open_store(path), client, SyncOptions::default())
        .expect("failed to build orchestrator")
}

const ECHO: Option<(&str, &[&str])> = Some(("cat", &[]));

// ============================================
// Immediate delivery
// ============================================

#[tokio::test]
async fn test_scoped_visit_is_delivered_and_recorded() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");
    let mut orch = orchestrator(&db, ECHO, Duration::from_secs(5));

    let outcome = orch
        .handle_navigation(&NavigationEvent::top_level("https://www.Lib.EDU/catalog?q=1"))
        .await
        .unwrap();
    assert_eq!(outcome, NavigationOutcome::Delivered { count: 1 });
    drop(orch);

    // Durable after restart
    let state = open_store(&db).load(200).unwrap();
    assert!(state.queue.is_empty());
    assert!(state
        .ledger
        .last_sent(&ThrottleKey::new(ReportKind::Domain, "lib.edu")).is_some());
}

#[tokio::test]
async fn test_unscoped_and_subframe_visits_are_ignored() {
    let dir = TempDir::new().unwrap();
    let mut orch = orchestrator(&dir.path().join("state.db"), ECHO, Duration::from_secs(5));

    for event in [
        NavigationEvent::top_level("https://example.com/"),
        NavigationEvent::subframe("https://lib.edu/"),
        NavigationEvent::top_level("file:///etc/hosts"),
        NavigationEvent::top_level("not a url"),
    ] {
        let outcome = orch.handle_navigation(&event).await.unwrap();
        assert_eq!(outcome, NavigationOutcome::Ignored, "{}", event.url);
    }
    assert!(orch.state().ledger.is_empty());
}

#[tokio::test]
async fn test_custom_page_and_domain_go_in_one_batch() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");

    {
        let store = open_store(&db);
        let mut settings = Settings::default();
        settings
            .set_custom_page("https://www.Benefits.gov/Apply#start")
            .unwrap();
        store.apply(StateUpdate::settings(&settings)).unwrap();
    }

    let mut orch = orchestrator(&db, ECHO, Duration::from_secs(5));
    let outcome = orch
        .handle_navigation(&NavigationEvent::top_level(
            "https://WWW.benefits.gov/apply?step=2",
        ))
        .await
        .unwrap();
    assert_eq!(outcome, NavigationOutcome::Delivered { count: 2 });

    let ledger = &orch.state().ledger;
    assert!(ledger
        .last_sent(&ThrottleKey::new(ReportKind::Domain, "benefits.gov")).is_some());
    assert!(ledger
        .last_sent(&ThrottleKey::new(
            ReportKind::Page,
            "https://www.benefits.gov/apply"
        ))
        .is_some());
}

#[tokio::test]
async fn test_auto_collect_off_suppresses_reports() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");
    let mut orch = orchestrator(&db, ECHO, Duration::from_secs(5));

    let settings = Settings {
        auto_collect: false,
        ..Settings::default()
    };
    orch.store().apply(StateUpdate::settings(&settings)).unwrap();

    let outcome = orch
        .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
        .await
        .unwrap();
    assert_eq!(outcome, NavigationOutcome::Ignored);
}

// ============================================
// Failure paths
// ============================================

#[tokio::test]
async fn test_unregistered_collector_queues_and_throttles() {
    let dir = TempDir::new().unwrap();
    let mut orch = orchestrator(&dir.path().join("state.db"), None, Duration::from_secs(5));
    let event = NavigationEvent::top_level("https://lib.edu/");

    match orch.handle_navigation(&event).await.unwrap() {
        NavigationOutcome::Queued { count, reason, .. } => {
            assert_eq!(count, 1);
            assert!(matches!(reason, DeliveryError::Unreachable(_)));
        }
        other => panic!("expected queued, got {:?}", other),
    }

    // Recorded despite the failure: no second copy inside the window
    let again = orch.handle_navigation(&event).await.unwrap();
    assert_eq!(again, NavigationOutcome::Throttled);
    assert_eq!(orch.state().queue.len(), 1);
}

#[tokio::test]
async fn test_collector_that_exits_is_a_disconnect() {
    let dir = TempDir::new().unwrap();
    let mut orch = orchestrator(
        &dir.path().join("state.db"),
        Some(("true", &[])),
        Duration::from_secs(5),
    );

    match orch
        .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
        .await
        .unwrap()
    {
        NavigationOutcome::Queued { reason, .. } => {
            assert!(matches!(reason, DeliveryError::Disconnected(_)), "{reason}");
        }
        other => panic!("expected queued, got {:?}", other),
    }
}

#[tokio::test]
async fn test_silent_collector_times_out() {
    let dir = TempDir::new().unwrap();
    let mut orch = orchestrator(
        &dir.path().join("state.db"),
        Some(("sleep", &["5"])),
        Duration::from_millis(200),
    );

    let started = std::time::Instant::now();
    let outcome = orch
        .handle_navigation(&NavigationEvent::top_level("https://lib.edu/"))
        .await
        .unwrap();

    match outcome {
        NavigationOutcome::Queued { reason, .. } => {
            assert_eq!(reason, DeliveryError::TimedOut(Duration::from_millis(200)));
        }
        other => panic!("expected queued, got {:?}", other),
    }
    // Bounded by the timeout plus the exit grace, not by the sleeping process
    assert!(started.elapsed() < Duration::from_secs(3));
}

// ============================================
// Queue across restarts
// ============================================

#[tokio::test]
async fn test_queue_survives_restart_and_flushes_in_order() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");

    {
        let mut offline = orchestrator(&db, None, Duration::from_secs(5));
        for (i, host) in ["a.gov", "b.edu", "c.gov"].iter().enumerate() {
            let at = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
            offline
                .handle_navigation_at(&NavigationEvent::top_level(format!("https://{host}/")), at)
                .await
                .unwrap();
        }
        assert!(!offline.flush().await.unwrap().is_ok());
    }

    let state = open_store(&db).load(200).unwrap();
    let queued: Vec<_> = state.queue.iter().map(|r| r.value.clone()).collect();
    assert_eq!(queued, vec!["a.gov", "b.edu", "c.gov"]);
    assert!(state.queue.iter().all(|r| r.kind == ReportKind::Domain));

    let mut online = orchestrator(&db, ECHO, Duration::from_secs(5));
    assert_eq!(online.state().queue.len(), 3);
    assert_eq!(
        online.flush().await.unwrap(),
        FlushOutcome::Delivered { count: 3 }
    );
    assert_eq!(online.flush().await.unwrap(), FlushOutcome::Empty);
    drop(online);

    assert!(open_store(&db).load(200).unwrap().queue.is_empty());
}

#[tokio::test]
async fn test_worker_delivers_and_answers_flush() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("state.db");

    let (handle, task) = service::spawn(orchestrator(&db, ECHO, Duration::from_secs(5)));
    handle
        .submit(NavigationEvent::top_level("https://lib.edu/"))
        .unwrap();
    handle
        .submit(NavigationEvent::top_level("https://lib.edu/again"))
        .unwrap();

    let reply = handle.request_flush().await.unwrap();
    assert!(reply.ok);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.events_seen, 2);
    assert_eq!(stats.immediate_deliveries, 1);
    assert_eq!(stats.reports_throttled, 1);

    drop(handle);
    let orch = task.await.unwrap();
    assert!(orch.state().queue.is_empty());
}
