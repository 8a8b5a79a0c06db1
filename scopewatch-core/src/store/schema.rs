//! State database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::{params, Connection};

use crate::types::Settings;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: settings, throttle ledger, delivery queue
    r#"
    -- Single-row settings table
    CREATE TABLE IF NOT EXISTS settings (
        id               INTEGER PRIMARY KEY CHECK (id = 1),
        auto_collect     INTEGER NOT NULL,
        custom_page      TEXT,
        host_identity    TEXT NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    -- Last accepted send per report key (epoch milliseconds)
    CREATE TABLE IF NOT EXISTS throttle_ledger (
        throttle_key     TEXT PRIMARY KEY,
        last_sent_ms     INTEGER NOT NULL
    );

    -- Undelivered reports, oldest first
    CREATE TABLE IF NOT EXISTS delivery_queue (
        position         INTEGER PRIMARY KEY,
        kind             TEXT NOT NULL CHECK (kind IN ('domain', 'page')),
        value            TEXT NOT NULL,
        seen_at          DATETIME NOT NULL
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    seed_defaults(conn)?;

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Insert the default settings row if none exists yet
fn seed_defaults(conn: &Connection) -> crate::error::Result<()> {
    let defaults = Settings::default();
    conn.execute(
        r#"
        INSERT OR IGNORE INTO settings (id, auto_collect, custom_page, host_identity, updated_at)
        VALUES (1, ?1, ?2, ?3, ?4)
        "#,
        params![
            defaults.auto_collect,
            defaults.custom_page,
            defaults.host_identity,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_queue_rejects_unknown_kind() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO delivery_queue (position, kind, value, seen_at) VALUES (0, 'host', 'x', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
