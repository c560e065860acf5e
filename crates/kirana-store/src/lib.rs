//! SQLite persistence for the campaign engine.
//!
//! One `Store` owns the connection and is the single source of truth:
//! campaigns, their recipients, the storefront entities the reminder
//! engine reads (customers, orders, carts), and the append-only reminder
//! log used for cooldown checks.
//!
//! Structured fields (label lists, audience filters, message specs,
//! button sets) live in JSON TEXT columns and are (de)serialized here
//! only; business logic never sees a JSON string. Timestamps are RFC3339
//! TEXT in a fixed millisecond format so SQL range comparisons work
//! lexicographically.

mod campaigns;
mod shop;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use kirana_core::error::{KiranaError, Result};
use rusqlite::Connection;

/// Campaign-engine database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| KiranaError::Store(format!("open {}: {e}", path.display())))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KiranaError::Store(format!("open :memory:: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                message_kind TEXT NOT NULL,
                message_json TEXT NOT NULL,
                target_kind TEXT NOT NULL,
                target_json TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                target_count INTEGER NOT NULL DEFAULT 0,
                sent_count INTEGER NOT NULL DEFAULT 0,
                delivered_count INTEGER NOT NULL DEFAULT 0,
                read_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                rate_per_minute INTEGER NOT NULL DEFAULT 30,
                created_at TEXT NOT NULL,
                scheduled_at TEXT,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS campaign_recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id TEXT NOT NULL,
                phone TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                wa_message_id TEXT,
                error TEXT,
                claimed_at TEXT,
                sent_at TEXT,
                delivered_at TEXT,
                read_at TEXT,
                failed_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (campaign_id, phone)
            );
            CREATE INDEX IF NOT EXISTS idx_recipients_campaign_status
                ON campaign_recipients (campaign_id, status);
            CREATE INDEX IF NOT EXISTS idx_recipients_wa_message
                ON campaign_recipients (wa_message_id);

            CREATE TABLE IF NOT EXISTS customers (
                phone TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                opted_in INTEGER NOT NULL DEFAULT 1,
                labels_json TEXT NOT NULL DEFAULT '[]',
                segment TEXT NOT NULL DEFAULT '',
                tier TEXT NOT NULL DEFAULT '',
                order_count INTEGER NOT NULL DEFAULT 0,
                total_spent REAL NOT NULL DEFAULT 0,
                last_order_at TEXT,
                last_seen_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                customer_phone TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                payment_method TEXT NOT NULL DEFAULT 'cod',
                paid INTEGER NOT NULL DEFAULT 0,
                payment_link TEXT NOT NULL DEFAULT '',
                payment_link_created_at TEXT,
                payment_link_expires_at TEXT,
                shipped_at TEXT,
                delivered_at TEXT,
                delivery_confirm_sent INTEGER NOT NULL DEFAULT 0,
                review_request_sent INTEGER NOT NULL DEFAULT 0,
                total REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS carts (
                id TEXT PRIMARY KEY,
                customer_phone TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                total REAL NOT NULL DEFAULT 0,
                reminder_count INTEGER NOT NULL DEFAULT 0,
                last_reminder_at TEXT,
                updated_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Append-only dedupe log for reminders without a subject flag.
            CREATE TABLE IF NOT EXISTS reminder_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                sent_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reminder_log_subject
                ON reminder_log (event_type, subject_id, sent_at);
            ",
        )
        .map_err(|e| KiranaError::Store(format!("migration: {e}")))?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KiranaError::Store(format!("lock: {e}")))
    }
}

// ─── Timestamp helpers ─────────────────────────────────────

/// Fixed-width RFC3339 (millisecond precision, Z suffix) so stored
/// timestamps compare correctly as strings in SQL.
pub(crate) fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn fmt_opt_ts(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(fmt_ts)
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}
