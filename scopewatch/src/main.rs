//! scopewatch - scoped navigation reporter
//!
//! Evaluates navigations against the `.edu`/`.gov` scope rule and the
//! configured custom page, throttles repeats, and delivers reports to the
//! registered collector process, queueing them while it is unavailable.
//!
//! Commands:
//! - `run`: long-lived worker fed by JSON lines on stdin (see `intake`)
//! - `visit <url>`: process a single navigation and exit
//! - `flush`: deliver the queue now and print `{"ok": bool}`
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/scopewatch/state.db (~/.local/share/scopewatch/state.db)
//! - Logs: $XDG_STATE_HOME/scopewatch/scopewatch.log (~/.local/state/scopewatch/scopewatch.log)
//! - Config: $XDG_CONFIG_HOME/scopewatch/config.toml (~/.config/scopewatch/config.toml)

mod intake;
mod process_lock;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use intake::{FlushResult, IntakeMessage};
use process_lock::{acquire_worker_guard, WorkerGuard};
use scopewatch_core::sync::service;
use scopewatch_core::{
    Config, DeliveryClient, FlushReply, NativeHostTransport, NavigationEvent, NavigationOutcome,
    Orchestrator, SqliteStore, SyncOptions,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "scopewatch")]
#[command(about = "Report scoped navigations to a native collector")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync worker, reading JSON-lines intake from stdin
    Run,

    /// Process a single navigation
    Visit {
        /// Absolute URL of the navigation
        url: String,

        /// Treat the navigation as a sub-frame (never reported)
        #[arg(long)]
        subframe: bool,
    },

    /// Deliver everything currently queued
    Flush,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        scopewatch_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("scopewatch starting");

    let (_worker_guard, orchestrator) = open_orchestrator(&config)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let result = runtime.block_on(async {
        match args.command {
            Command::Run => run(orchestrator).await,
            Command::Visit { url, subframe } => visit(orchestrator, url, subframe).await,
            Command::Flush => flush(orchestrator).await,
        }
    });

    // A pending stdin read after Ctrl-C must not hold the process open
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

/// Take the worker lock and load the persisted state behind it
fn open_orchestrator(config: &Config) -> Result<(WorkerGuard, Orchestrator<SqliteStore>)> {
    let db_path = Config::database_path();
    let guard = acquire_worker_guard(&db_path).context("failed to acquire process lock")?;

    tracing::info!(path = %db_path.display(), "Opening state database");
    let store = SqliteStore::open(&db_path).context("failed to open state database")?;
    store
        .migrate()
        .context("failed to run database migrations")?;

    let transport = Arc::new(NativeHostTransport::new(config.hosts.clone()));
    let client = DeliveryClient::new(
        transport,
        (&config.client).into(),
        config.delivery.timeout(),
    );

    let orchestrator = Orchestrator::new(store, client, SyncOptions::from(&config.delivery))
        .context("failed to load sync state")?;

    Ok((guard, orchestrator))
}

async fn run(orchestrator: Orchestrator<SqliteStore>) -> Result<()> {
    let (handle, worker) = service::spawn(orchestrator);
    let mut replies = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).split(b'\n');

    loop {
        let line = tokio::select! {
            line = lines.next_segment() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; draining accepted events");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Intake closed; draining accepted events");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read intake; draining accepted events");
                break;
            }
        };

        match intake::parse_line(&line) {
            Ok(None) => {}
            Ok(Some(IntakeMessage::Navigation(event))) => {
                if let Err(e) = handle.submit(event) {
                    tracing::error!(error = %e, "Sync worker stopped; ending intake");
                    break;
                }
            }
            Ok(Some(IntakeMessage::QueueFlush)) => {
                let handle = handle.clone();
                replies.spawn(async move {
                    let reply = match handle.request_flush().await {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::error!(error = %e, "Flush request failed");
                            FlushReply { ok: false }
                        }
                    };
                    print_json(&FlushResult::from(reply));
                });
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(&line),
                    "Skipping malformed intake line"
                );
            }
        }
    }

    drop(handle);
    while replies.join_next().await.is_some() {}

    let orchestrator = worker.await.context("sync worker panicked")?;
    let stats = orchestrator.stats();
    tracing::info!(
        events_seen = stats.events_seen,
        reports_admitted = stats.reports_admitted,
        reports_throttled = stats.reports_throttled,
        reports_queued = stats.reports_queued,
        reports_evicted = stats.reports_evicted,
        "scopewatch stopped"
    );
    Ok(())
}

async fn visit(
    mut orchestrator: Orchestrator<SqliteStore>,
    url: String,
    subframe: bool,
) -> Result<()> {
    let event = if subframe {
        NavigationEvent::subframe(url)
    } else {
        NavigationEvent::top_level(url)
    };

    let outcome = orchestrator
        .handle_navigation(&event)
        .await
        .context("failed to process navigation")?;

    match outcome {
        NavigationOutcome::Ignored => println!("Ignored: no report for {}", event.url),
        NavigationOutcome::Throttled => println!("Throttled: already reported recently"),
        NavigationOutcome::Delivered { count } => println!("Delivered {} report(s)", count),
        NavigationOutcome::Queued {
            count,
            evicted,
            reason,
        } => {
            println!("Queued {} report(s): {}", count, reason);
            if evicted > 0 {
                println!("Queue full: evicted {} oldest report(s)", evicted);
            }
        }
    }
    Ok(())
}

async fn flush(mut orchestrator: Orchestrator<SqliteStore>) -> Result<()> {
    let reply = match orchestrator.flush().await {
        Ok(outcome) => FlushReply::from(&outcome),
        Err(e) => {
            tracing::error!(error = %e, "Flush aborted");
            FlushReply { ok: false }
        }
    };
    print_json(&reply);
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::error!(error = %e, "Failed to encode reply"),
    }
}
