//! SQLite-backed state store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{StateStore, StateUpdate, SyncState};
use crate::error::{Error, Result};
use crate::queue::DeliveryQueue;
use crate::throttle::ThrottleLedger;
use crate::types::{Report, ReportKind, Settings};

/// State database handle (single connection)
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a state database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL keeps readers (settings CLI) off the worker's back
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        super::schema::run_migrations(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("state connection lock poisoned".to_string()))
    }

    fn read_settings(conn: &Connection) -> Result<Settings> {
        let row = conn
            .query_row(
                "SELECT auto_collect, custom_page, host_identity FROM settings WHERE id = 1",
                [],
                |row| {
                    Ok(Settings {
                        auto_collect: row.get(0)?,
                        custom_page: row.get(1)?,
                        host_identity: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    fn read_ledger(conn: &Connection) -> Result<ThrottleLedger> {
        let mut stmt = conn.prepare("SELECT throttle_key, last_sent_ms FROM throttle_ledger")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ThrottleLedger::from_entries(entries))
    }

    fn read_queue(conn: &Connection, capacity: usize) -> Result<DeliveryQueue> {
        let mut stmt =
            conn.prepare(
                "SELECT position, kind, value, seen_at FROM delivery_queue ORDER BY position ASC",
            )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut items = Vec::with_capacity(rows.len());
        for (position, kind, value, seen_at) in rows {
            let kind: ReportKind = kind.parse()?;
            let seen_at = DateTime::parse_from_rfc3339(&seen_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    Error::Store(format!(
                        "queued report at position {} has invalid seen_at {:?}: {}",
                        position, seen_at, e
                    ))
                })?;
            items.push(Report {
                kind,
                value,
                seen_at,
            });
        }
        Ok(DeliveryQueue::from_items(items, capacity))
    }

    fn write_settings(conn: &Connection, settings: &Settings) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO settings (id, auto_collect, custom_page, host_identity, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                auto_collect = excluded.auto_collect,
                custom_page = excluded.custom_page,
                host_identity = excluded.host_identity,
                updated_at = excluded.updated_at
            "#,
            params![
                settings.auto_collect,
                settings.custom_page,
                settings.host_identity,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn write_ledger(conn: &Connection, ledger: &ThrottleLedger) -> Result<()> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO throttle_ledger (throttle_key, last_sent_ms)
            VALUES (?1, ?2)
            ON CONFLICT(throttle_key) DO UPDATE SET
                last_sent_ms = MAX(last_sent_ms, excluded.last_sent_ms)
            "#,
        )?;
        for (key, last_sent) in ledger.iter() {
            stmt.execute(params![key, last_sent])?;
        }
        Ok(())
    }

    fn write_queue(conn: &Connection, queue: &DeliveryQueue) -> Result<()> {
        conn.execute("DELETE FROM delivery_queue", [])?;
        let mut stmt = conn.prepare(
            "INSERT INTO delivery_queue (position, kind, value, seen_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, report) in queue.iter().enumerate() {
            stmt.execute(params![
                position as i64,
                report.kind.as_str(),
                report.value,
                report.seen_at.to_rfc3339(),
            ])?;
        }
        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn load(&self, queue_capacity: usize) -> Result<SyncState> {
        let conn = self.conn()?;
        Ok(SyncState {
            settings: Self::read_settings(&conn)?,
            ledger: Self::read_ledger(&conn)?,
            queue: Self::read_queue(&conn, queue_capacity)?,
        })
    }

    fn load_settings(&self) -> Result<Settings> {
        let conn = self.conn()?;
        Self::read_settings(&conn)
    }

    fn apply(&self, update: StateUpdate<'_>) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(settings) = update.settings {
            Self::write_settings(&tx, settings)?;
        }
        if let Some(ledger) = update.ledger {
            Self::write_ledger(&tx, ledger)?;
        }
        if let Some(queue) = update.queue {
            Self::write_queue(&tx, queue)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM delivery_queue", [])?;
        tx.execute("DELETE FROM throttle_ledger", [])?;
        Self::write_settings(&tx, &Settings::default())?;
        tx.commit()?;
        Ok(())
    }
}
