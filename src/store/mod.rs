//! Storage layer for Scoutr.
//!
//! A single SQLite database holds the run records, daily usage counters, the
//! reservation ledger, candidates and the audit trail. Uniqueness constraints
//! in the schema are the only mutual-exclusion mechanism; no in-process lock
//! is held across an await.
//!
//! # Example
//!
//! ```ignore
//! use scoutr::store::Store;
//! use scoutr::domain::ActionType;
//!
//! let store = Store::open(Path::new("/var/lib/scoutr/scoutr.db"))?;
//! if store.reserve(ActionType::DmSend, "x:123", None)? {
//!     // perform the DM, then
//!     store.mark_done(ActionType::DmSend, "x:123")?;
//! }
//! ```

mod actions;
mod candidates;
mod ledger;
mod runs;
mod settings;
mod usage;

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{Result, ScoutrError};

pub use candidates::FunnelCounts;
pub use ledger::MAX_ERROR_MESSAGE_CHARS;
pub use runs::{RunFinish, RunRecord};
pub use usage::UsageDay;

/// Store manages all persistent worker state in one SQLite database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database. Used by tests and `--dry-run` smoke checks.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Initialize the SQLite schema.
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at INTEGER NOT NULL,
                finished_at INTEGER,
                status TEXT NOT NULL,
                dry_run INTEGER NOT NULL,
                reads_consumed INTEGER NOT NULL DEFAULT 0,
                lookups_consumed INTEGER NOT NULL DEFAULT 0,
                stats TEXT,
                error_message TEXT
            );

            CREATE TABLE IF NOT EXISTS usage_days (
                day TEXT PRIMARY KEY,
                reads INTEGER NOT NULL DEFAULT 0,
                lookups INTEGER NOT NULL DEFAULT 0,
                estimated_cost_usd REAL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS usage_tokens (
                day TEXT NOT NULL,
                model TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (day, model)
            );

            CREATE TABLE IF NOT EXISTS handled_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action_type TEXT NOT NULL,
                external_id TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (action_type, external_id)
            );

            CREATE TABLE IF NOT EXISTS candidates (
                id TEXT PRIMARY KEY,
                platform TEXT NOT NULL,
                external_id TEXT NOT NULL,
                handle TEXT NOT NULL,
                display_name TEXT NOT NULL,
                bio TEXT NOT NULL,
                followers INTEGER NOT NULL DEFAULT 0,
                category TEXT,
                first_query TEXT,
                first_query_at INTEGER,
                discovered_at INTEGER NOT NULL,
                refreshed_at INTEGER,
                replied_at INTEGER,
                approved INTEGER NOT NULL DEFAULT 0,
                refresh_attempted_at INTEGER,
                sample_attempted_at INTEGER,
                score_attempted_at INTEGER,
                scoring_dirty INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_candidates_first_query ON candidates(first_query, first_query_at);
            CREATE INDEX IF NOT EXISTS idx_candidates_refreshed ON candidates(refreshed_at);

            CREATE TABLE IF NOT EXISTS candidate_samples (
                candidate_id TEXT NOT NULL REFERENCES candidates(id),
                post_id TEXT NOT NULL,
                text TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (candidate_id, post_id)
            );

            CREATE TABLE IF NOT EXISTS candidate_scores (
                candidate_id TEXT PRIMARY KEY REFERENCES candidates(id),
                performance INTEGER NOT NULL,
                acceptance INTEGER NOT NULL,
                overall INTEGER NOT NULL,
                tier TEXT NOT NULL,
                rationale TEXT NOT NULL,
                features TEXT NOT NULL,
                input_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                scored_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS score_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                candidate_id TEXT NOT NULL REFERENCES candidates(id),
                performance INTEGER NOT NULL,
                acceptance INTEGER NOT NULL,
                overall INTEGER NOT NULL,
                tier TEXT NOT NULL,
                rationale TEXT NOT NULL,
                features TEXT NOT NULL,
                input_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                scored_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS queue_entries (
                candidate_id TEXT PRIMARY KEY REFERENCES candidates(id),
                queued_day TEXT NOT NULL,
                reason TEXT NOT NULL,
                position INTEGER NOT NULL,
                run_id INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_queue_day ON queue_entries(queued_day);

            CREATE TABLE IF NOT EXISTS drafts (
                candidate_id TEXT PRIMARY KEY REFERENCES candidates(id),
                dm_text TEXT NOT NULL,
                email_subject TEXT NOT NULL,
                email_body TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                target TEXT NOT NULL,
                meta TEXT NOT NULL,
                day TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_actions_day ON actions(day, kind, status);

            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Lock the connection. Never hold the guard across an await.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScoutrError::Storage("connection mutex poisoned".to_string()))
    }
}
