//! SQLite-based local store for accounts, syncable records, and automation
//! history.
//!
//! The database lives at `~/.hubos/hubos.db`. All writes are upserts keyed
//! by stable id, never whole-collection overwrites, so the UI can read
//! concurrently while a sync pass is writing. Enrichment columns use
//! `COALESCE(excluded.x, x)` in the ON CONFLICT clause so a NULL coming from
//! a fresh remote fetch can never clobber a locally-computed value, even if
//! a caller bypasses the merge engine.

use std::path::PathBuf;

use rusqlite::Connection;
use thiserror::Error;

mod accounts;
mod automations;
mod emails;
mod events;
mod feeds;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Could not determine home directory")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub struct HubDb {
    conn: Connection,
}

impl HubDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `~/.hubos/hubos.db` and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(SCHEMA)?;

        Ok(Self { conn })
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Self) -> Result<T, String>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| format!("Failed to begin transaction: {e}"))?;
        match f(self) {
            Ok(val) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| format!("Failed to commit transaction: {e}"))?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Resolve the default database path: `~/.hubos/hubos.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".hubos").join("hubos.db"))
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id            TEXT PRIMARY KEY,
    platform      TEXT NOT NULL,
    name          TEXT NOT NULL,
    email         TEXT,
    credentials   TEXT,
    is_connected  INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL DEFAULT 'disconnected',
    last_sync     TEXT,
    ignored       INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT,
    updated_at    TEXT
);

CREATE TABLE IF NOT EXISTS emails (
    email_id           TEXT PRIMARY KEY,
    account_id         TEXT NOT NULL,
    sender             TEXT NOT NULL,
    subject            TEXT NOT NULL,
    snippet            TEXT,
    received_at        TEXT NOT NULL,
    is_unread          INTEGER NOT NULL DEFAULT 0,
    ai_summary         TEXT,
    ai_category        TEXT,
    ai_priority        INTEGER,
    ai_suggested_reply TEXT,
    tags               TEXT,
    created_at         TEXT,
    updated_at         TEXT
);
CREATE INDEX IF NOT EXISTS idx_emails_account ON emails(account_id);

CREATE TABLE IF NOT EXISTS events (
    event_id        TEXT PRIMARY KEY,
    account_id      TEXT NOT NULL,
    title           TEXT NOT NULL,
    start_time      TEXT NOT NULL,
    end_time        TEXT,
    location        TEXT,
    ai_briefing     TEXT,
    ai_action_items TEXT,
    created_at      TEXT,
    updated_at      TEXT
);
CREATE INDEX IF NOT EXISTS idx_events_account ON events(account_id);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id TEXT PRIMARY KEY,
    account_id      TEXT NOT NULL,
    source          TEXT NOT NULL,
    title           TEXT NOT NULL,
    body            TEXT,
    timestamp       TEXT NOT NULL,
    ai_insight      TEXT,
    created_at      TEXT,
    updated_at      TEXT
);
CREATE INDEX IF NOT EXISTS idx_notifications_account ON notifications(account_id);

CREATE TABLE IF NOT EXISTS github_items (
    item_id           TEXT PRIMARY KEY,
    account_id        TEXT NOT NULL,
    kind              TEXT NOT NULL,
    title             TEXT NOT NULL,
    repo              TEXT NOT NULL,
    url               TEXT,
    updated_at_remote TEXT NOT NULL,
    ai_insight        TEXT,
    created_at        TEXT,
    updated_at        TEXT
);
CREATE INDEX IF NOT EXISTS idx_github_items_account ON github_items(account_id);

CREATE TABLE IF NOT EXISTS automations (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    task           TEXT NOT NULL,
    schedule       TEXT,
    run_on_startup INTEGER NOT NULL DEFAULT 0,
    command        TEXT,
    provider       TEXT,
    created_at     TEXT,
    updated_at     TEXT
);

CREATE TABLE IF NOT EXISTS automation_runs (
    id            TEXT PRIMARY KEY,
    automation_id TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    finished_at   TEXT,
    outcome       TEXT,
    output        TEXT,
    error         TEXT,
    analysis      TEXT
);
CREATE INDEX IF NOT EXISTS idx_runs_automation ON automation_runs(automation_id);
";

/// Serialize a string list for a TEXT column. Empty lists are stored as NULL
/// so `COALESCE(excluded.tags, tags)` preserves existing values, mirroring
/// the merge engine's treatment of unset enrichment.
pub(crate) fn list_to_json(list: &[String]) -> Option<String> {
    if list.is_empty() {
        None
    } else {
        serde_json::to_string(list).ok()
    }
}

pub(crate) fn json_to_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, HubDb) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = HubDb::open_at(dir.path().join("test.db")).expect("open");
    (dir, db)
}
