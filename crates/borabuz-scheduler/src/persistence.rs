//! SQLite-backed persistence for alert configs, the notification queue,
//! the delivery log and permission state.
//!
//! Every execution context opens its own connection to the same file; WAL
//! mode and a busy timeout let the foreground bridge and the delivery runtime
//! write concurrently. Queue writes are whole-row replacements keyed by id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use borabuz_core::alert::{AlertConfig, Direction, ItemType, Permission};
use borabuz_core::error::{BoraBuzError, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::records::ScheduledNotification;

const PERMISSION_KEY: &str = "notification_permission";

const RECORD_COLUMNS: &str = "id, config_snapshot, recurring_time, offset_kind, offset_value, \
     scheduled_time_ms, processed, processed_at_ms";

/// SQLite store shared (by file, not by memory) between execution contexts.
pub struct AlertDb {
    conn: Mutex<Connection>,
}

/// One row of the delivery log.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryLogEntry {
    pub id: i64,
    pub record_id: Option<String>,
    pub title: String,
    pub body: String,
    /// `sent` or `failed`.
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
}

fn store_err(context: &str) -> impl Fn(rusqlite::Error) -> BoraBuzError + '_ {
    move |e| BoraBuzError::StoreUnavailable(format!("{context}: {e}"))
}

fn direction_key(direction: Option<Direction>) -> &'static str {
    direction.map(|d| d.as_str()).unwrap_or("")
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<ScheduledNotification> {
    let snapshot: String = row.get(1)?;
    let recurring_time: String = row.get(2)?;
    let offset_kind: String = row.get(3)?;
    Ok(ScheduledNotification {
        id: row.get(0)?,
        config_snapshot: serde_json::from_str(&snapshot).map_err(|e| conversion_err(1, e))?,
        recurring_time: recurring_time.parse().map_err(|e| conversion_err(2, e))?,
        offset_kind: offset_kind.parse().map_err(|e| conversion_err(3, e))?,
        offset_value: row.get(4)?,
        scheduled_time_epoch_ms: row.get(5)?,
        processed: row.get::<_, i32>(6)? != 0,
        processed_at_epoch_ms: row.get(7)?,
    })
}

impl AlertDb {
    /// Open or create the alert database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(store_err("DB open"))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .map_err(store_err("Pragmas"))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// Private in-memory database. Not shared with any other connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("DB open"))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BoraBuzError::StoreUnavailable(format!("DB lock poisoned: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Per-item alert configuration (full JSON, overwritten on save)
            CREATE TABLE IF NOT EXISTS alert_configs (
                id TEXT PRIMARY KEY,
                item_type TEXT NOT NULL,
                item_id TEXT NOT NULL,
                direction TEXT NOT NULL DEFAULT '',   -- '', 'ida', 'volta'
                config_json TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alert_configs_item
                ON alert_configs(item_type, item_id);

            -- Durable notification queue
            CREATE TABLE IF NOT EXISTS scheduled_notifications (
                id TEXT PRIMARY KEY,
                item_type TEXT NOT NULL,
                item_id TEXT NOT NULL,
                direction TEXT NOT NULL DEFAULT '',
                config_snapshot TEXT NOT NULL,        -- JSON AlertConfig
                recurring_time TEXT NOT NULL,         -- HH:MM
                offset_kind TEXT NOT NULL,            -- 'advance', 'after'
                offset_value INTEGER NOT NULL,
                scheduled_time_ms INTEGER NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                processed_at_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_due
                ON scheduled_notifications(processed, scheduled_time_ms);
            CREATE INDEX IF NOT EXISTS idx_scheduled_item
                ON scheduled_notifications(item_type, item_id, direction);

            -- Delivery attempts
            CREATE TABLE IF NOT EXISTS notification_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id TEXT,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL,                 -- 'sent', 'failed'
                error TEXT,
                created_at TEXT NOT NULL
            );

            -- Small key/value settings (permission state)
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(store_err("Migration"))?;
        Ok(())
    }

    // ─── Alert configs ──────────────────────────────────────

    /// Insert or fully overwrite a config.
    pub fn upsert_config(&self, config: &AlertConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO alert_configs
                 (id, item_type, item_id, direction, config_json, enabled, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    config.id,
                    config.item_type.as_str(),
                    config.item_id,
                    direction_key(config.direction),
                    json,
                    config.enabled as i32,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(store_err("Save config"))?;
        Ok(())
    }

    pub fn get_config(&self, id: &str) -> Result<Option<AlertConfig>> {
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT config_json FROM alert_configs WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err("Load config"))?;
        json.map(|j| serde_json::from_str(&j).map_err(BoraBuzError::from))
            .transpose()
    }

    pub fn list_configs(&self) -> Result<Vec<AlertConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, config_json FROM alert_configs ORDER BY item_type, item_id, direction")
            .map_err(store_err("List configs"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(store_err("List configs"))?;

        let mut configs = Vec::new();
        for row in rows {
            let (id, json) = row.map_err(store_err("List configs"))?;
            match serde_json::from_str(&json) {
                Ok(cfg) => configs.push(cfg),
                Err(e) => tracing::warn!("⚠️ Skipping unreadable alert config {id}: {e}"),
            }
        }
        Ok(configs)
    }

    /// Delete every config of an item (all directions) together with its
    /// queued records. Returns (configs, records) removed.
    pub fn delete_item(&self, item_type: ItemType, item_id: &str) -> Result<(usize, usize)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_err("Delete item"))?;
        let configs = tx
            .execute(
                "DELETE FROM alert_configs WHERE item_type = ?1 AND item_id = ?2",
                params![item_type.as_str(), item_id],
            )
            .map_err(store_err("Delete item"))?;
        let records = tx
            .execute(
                "DELETE FROM scheduled_notifications WHERE item_type = ?1 AND item_id = ?2",
                params![item_type.as_str(), item_id],
            )
            .map_err(store_err("Delete item"))?;
        tx.commit().map_err(store_err("Delete item"))?;
        Ok((configs, records))
    }

    // ─── Notification queue ──────────────────────────────────────

    /// Atomically drop every record of one item/direction key and insert
    /// `records` in their place, replacing colliding ids. A rebuilt record
    /// with the id and instant of one already delivered stays delivered.
    pub fn replace_records(
        &self,
        item_type: ItemType,
        item_id: &str,
        direction: Option<Direction>,
        records: &[ScheduledNotification],
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(store_err("Replace records"))?;

        let delivered: HashMap<String, (i64, Option<i64>)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, scheduled_time_ms, processed_at_ms FROM scheduled_notifications
                     WHERE item_type = ?1 AND item_id = ?2 AND direction = ?3 AND processed = 1",
                )
                .map_err(store_err("Replace records"))?;
            let rows = stmt
                .query_map(
                    params![item_type.as_str(), item_id, direction_key(direction)],
                    |row| Ok((row.get::<_, String>(0)?, (row.get(1)?, row.get(2)?))),
                )
                .map_err(store_err("Replace records"))?;
            let delivered = rows
                .collect::<rusqlite::Result<HashMap<_, _>>>()
                .map_err(store_err("Replace records"))?;
            delivered
        };

        let removed = tx
            .execute(
                "DELETE FROM scheduled_notifications
                 WHERE item_type = ?1 AND item_id = ?2 AND direction = ?3",
                params![item_type.as_str(), item_id, direction_key(direction)],
            )
            .map_err(store_err("Replace records"))?;

        {
            let mut insert = tx
                .prepare(
                    "INSERT OR REPLACE INTO scheduled_notifications
                     (id, item_type, item_id, direction, config_snapshot, recurring_time,
                      offset_kind, offset_value, scheduled_time_ms, processed, processed_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )
                .map_err(store_err("Replace records"))?;
            for rec in records {
                let cfg = &rec.config_snapshot;
                let (processed, processed_at) = match delivered.get(&rec.id) {
                    Some((at, processed_at)) if *at == rec.scheduled_time_epoch_ms => {
                        (true, *processed_at)
                    }
                    _ => (rec.processed, rec.processed_at_epoch_ms),
                };
                insert
                    .execute(params![
                        rec.id,
                        cfg.item_type.as_str(),
                        cfg.item_id,
                        direction_key(cfg.direction),
                        serde_json::to_string(cfg)?,
                        rec.recurring_time.to_string(),
                        rec.offset_kind.as_str(),
                        rec.offset_value,
                        rec.scheduled_time_epoch_ms,
                        processed as i32,
                        processed_at,
                    ])
                    .map_err(store_err("Replace records"))?;
            }
        }

        tx.commit().map_err(store_err("Replace records"))?;
        Ok(removed)
    }

    /// Remove every record of an item across all directions.
    pub fn delete_records_for_item(&self, item_type: ItemType, item_id: &str) -> Result<usize> {
        self.conn()?
            .execute(
                "DELETE FROM scheduled_notifications WHERE item_type = ?1 AND item_id = ?2",
                params![item_type.as_str(), item_id],
            )
            .map_err(store_err("Cancel records"))
    }

    /// Remove the records of exactly one item/direction key.
    pub fn delete_records_for_key(
        &self,
        item_type: ItemType,
        item_id: &str,
        direction: Option<Direction>,
    ) -> Result<usize> {
        self.replace_records(item_type, item_id, direction, &[])
    }

    fn query_records(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<ScheduledNotification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(store_err("Query records"))?;
        let rows = stmt
            .query_map(args, read_record)
            .map_err(store_err("Query records"))?;

        let mut records = Vec::new();
        for row in rows {
            match row {
                Ok(rec) => records.push(rec),
                Err(e) => tracing::warn!("⚠️ Skipping unreadable queue record: {e}"),
            }
        }
        Ok(records)
    }

    /// Unprocessed records due at `now_ms`, earliest first, ties by id.
    pub fn due_records(&self, now_ms: i64) -> Result<Vec<ScheduledNotification>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM scheduled_notifications
                 WHERE processed = 0 AND scheduled_time_ms <= ?1
                 ORDER BY scheduled_time_ms, id"
            ),
            [now_ms],
        )
    }

    pub fn all_records(&self) -> Result<Vec<ScheduledNotification>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM scheduled_notifications
                 ORDER BY scheduled_time_ms, id"
            ),
            [],
        )
    }

    pub fn records_for_item(&self, item_type: ItemType, item_id: &str) -> Result<Vec<ScheduledNotification>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM scheduled_notifications
                 WHERE item_type = ?1 AND item_id = ?2
                 ORDER BY scheduled_time_ms, id"
            ),
            params![item_type.as_str(), item_id],
        )
    }

    pub fn get_record(&self, id: &str) -> Result<Option<ScheduledNotification>> {
        Ok(self
            .query_records(
                &format!("SELECT {RECORD_COLUMNS} FROM scheduled_notifications WHERE id = ?1"),
                [id],
            )?
            .into_iter()
            .next())
    }

    /// Earliest fire time among unprocessed records.
    pub fn next_pending_ms(&self) -> Result<Option<i64>> {
        self.conn()?
            .query_row(
                "SELECT MIN(scheduled_time_ms) FROM scheduled_notifications WHERE processed = 0",
                [],
                |row| row.get(0),
            )
            .map_err(store_err("Next pending"))
    }

    /// Flip `processed` on an existing record. Returns false when the record
    /// is gone (cancelled) or already processed.
    pub fn mark_processed(&self, id: &str, at_ms: i64) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scheduled_notifications SET processed = 1, processed_at_ms = ?1
                 WHERE id = ?2 AND processed = 0",
                params![at_ms, id],
            )
            .map_err(store_err("Mark processed"))?;
        Ok(changed > 0)
    }

    /// Move an existing record to a new fire time and clear `processed`.
    /// Update-only: a record deleted by a cancel stays deleted.
    pub fn rearm_record(&self, id: &str, next_ms: i64) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scheduled_notifications
                 SET scheduled_time_ms = ?1, processed = 0, processed_at_ms = NULL
                 WHERE id = ?2",
                params![next_ms, id],
            )
            .map_err(store_err("Rearm record"))?;
        Ok(changed > 0)
    }

    /// Delete processed records marked before `cutoff_ms`.
    pub fn purge_processed_before(&self, cutoff_ms: i64) -> Result<usize> {
        self.conn()?
            .execute(
                "DELETE FROM scheduled_notifications
                 WHERE processed = 1 AND COALESCE(processed_at_ms, scheduled_time_ms) < ?1",
                [cutoff_ms],
            )
            .map_err(store_err("Purge processed"))
    }

    // ─── Delivery log ──────────────────────────────────────

    pub fn log_delivery(
        &self,
        record_id: Option<&str>,
        title: &str,
        body: &str,
        error: Option<&str>,
    ) -> Result<i64> {
        let status = if error.is_some() { "failed" } else { "sent" };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notification_log (record_id, title, body, status, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![record_id, title, body, status, error, Utc::now().to_rfc3339()],
        )
        .map_err(store_err("Log delivery"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn recent_deliveries(&self, limit: usize) -> Result<Vec<DeliveryLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, record_id, title, body, status, error, created_at
                 FROM notification_log ORDER BY id DESC LIMIT ?1",
            )
            .map_err(store_err("Recent deliveries"))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(DeliveryLogEntry {
                    id: row.get(0)?,
                    record_id: row.get(1)?,
                    title: row.get(2)?,
                    body: row.get(3)?,
                    status: row.get(4)?,
                    error: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .map_err(store_err("Recent deliveries"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err("Recent deliveries"))
    }

    // ─── Settings ──────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(store_err("Read setting"))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(store_err("Write setting"))?;
        Ok(())
    }

    /// Stored notification permission. Unknown values read as undetermined.
    pub fn permission(&self) -> Result<Permission> {
        Ok(self
            .get_setting(PERMISSION_KEY)?
            .and_then(|v| v.parse().ok())
            .unwrap_or_default())
    }

    pub fn set_permission(&self, permission: Permission) -> Result<()> {
        self.set_setting(PERMISSION_KEY, permission.as_str())
    }
}
