//! scopewatch-settings - settings control surface for scopewatch
//!
//! This tool provides commands for:
//! - Showing the current settings and queue status
//! - Turning automatic collection on or off
//! - Setting or clearing the custom page to watch
//! - Choosing which collector host receives deliveries
//! - Exporting the persisted state as JSON
//! - Clearing local data
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/scopewatch/state.db (~/.local/share/scopewatch/state.db)
//! - Config: $XDG_CONFIG_HOME/scopewatch/config.toml (~/.config/scopewatch/config.toml)

mod process_lock;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use process_lock::acquire_worker_guard;
use scopewatch_core::{Config, Settings, SqliteStore, StateStore, StateUpdate};

#[derive(Parser)]
#[command(name = "scopewatch-settings")]
#[command(about = "View and change scopewatch settings")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show settings and queue status
    Status,

    /// Turn automatic collection on or off
    AutoCollect {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Manage the custom page reported on exact match
    CustomPage {
        #[command(subcommand)]
        action: CustomPageAction,
    },

    /// Set the collector host identity that receives deliveries
    Host {
        /// Host identity, as registered under [hosts] in config.toml
        identity: String,
    },

    /// Print the persisted state as JSON
    Export,

    /// Clear the queue and throttle history and restore default settings
    Reset,
}

#[derive(Subcommand)]
enum CustomPageAction {
    /// Watch a page (scheme, host and path; query and fragment are ignored)
    Set {
        /// Absolute http(s) URL
        url: String,
    },

    /// Stop watching the custom page
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        scopewatch_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = Config::database_path();
    let store = SqliteStore::open(&db_path).context("failed to open state database")?;
    store
        .migrate()
        .context("failed to run database migrations")?;

    match args.command {
        Command::Status => cmd_status(&store, &config),
        Command::AutoCollect { state } => update_settings(&store, |settings| {
            settings.auto_collect = matches!(state, Toggle::On);
            println!(
                "Automatic collection {}",
                if settings.auto_collect { "enabled" } else { "disabled" }
            );
            Ok(())
        }),
        Command::CustomPage { action } => update_settings(&store, |settings| match &action {
            CustomPageAction::Set { url } => {
                let page = settings
                    .set_custom_page(url)
                    .context("failed to set custom page")?;
                println!("Custom page set to {}", page);
                Ok(())
            }
            CustomPageAction::Clear => {
                settings.clear_custom_page();
                println!("Custom page cleared");
                Ok(())
            }
        }),
        Command::Host { identity } => {
            if !config.hosts.contains_key(&identity) {
                println!(
                    "Warning: no collector registered for {} in {}",
                    identity,
                    Config::config_path().display()
                );
            }
            update_settings(&store, |settings| {
                settings.host_identity = identity.clone();
                println!("Collector host set to {}", identity);
                Ok(())
            })
        }
        Command::Export => cmd_export(&store, &config),
        Command::Reset => {
            // The worker owns the queue and ledger in memory; never wipe under it
            let _guard = acquire_worker_guard(&db_path)
                .context("cannot reset while scopewatch is running")?;
            store.reset().context("failed to clear local data")?;
            tracing::info!("Local data cleared");
            println!("Local data cleared");
            Ok(())
        }
    }
}

/// Read-modify-write the settings row
fn update_settings<F>(store: &SqliteStore, edit: F) -> Result<()>
where
    F: FnOnce(&mut Settings) -> Result<()>,
{
    let mut settings = store.load_settings().context("failed to read settings")?;
    edit(&mut settings)?;
    store
        .apply(StateUpdate::settings(&settings))
        .context("failed to save settings")?;
    tracing::info!(
        auto_collect = settings.auto_collect,
        custom_page = settings.custom_page.as_deref().unwrap_or("-"),
        host = %settings.host_identity,
        "Settings updated"
    );
    Ok(())
}

fn cmd_status(store: &SqliteStore, config: &Config) -> Result<()> {
    let state = store
        .load(config.delivery.queue_capacity)
        .context("failed to read state")?;
    let settings = &state.settings;

    println!("Scopewatch Settings");
    println!("===================");
    println!();
    println!(
        "Auto collect:    {}",
        if settings.auto_collect { "on" } else { "off" }
    );
    println!(
        "Custom page:     {}",
        settings.custom_page.as_deref().unwrap_or("(none)")
    );
    println!("Collector host:  {}", settings.host_identity);
    match config.hosts.get(&settings.host_identity) {
        Some(host) => println!("Host command:    {}", host.command.display()),
        None => println!("Host command:    (not registered)"),
    }
    println!();
    println!(
        "Queued reports:  {} / {}",
        state.queue.len(),
        state.queue.capacity()
    );
    println!("Throttled keys:  {}", state.ledger.len());
    println!("Database:        {}", Config::database_path().display());

    Ok(())
}

fn cmd_export(store: &SqliteStore, config: &Config) -> Result<()> {
    let state = store
        .load(config.delivery.queue_capacity)
        .context("failed to read state")?;
    let json = serde_json::to_string_pretty(&state.to_persisted())
        .context("failed to encode state")?;
    println!("{}", json);
    Ok(())
}
