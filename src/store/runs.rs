//! Run records: created at start, finalized exactly once.

use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use crate::domain::{RunStats, RunStatus};
use crate::error::{Result, ScoutrError};

/// One row per orchestrator invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: RunStatus,
    pub dry_run: bool,
    pub reads_consumed: u32,
    pub lookups_consumed: u32,
    pub stats: Option<RunStats>,
    pub error_message: Option<String>,
}

/// Terminal update applied to a started run.
#[derive(Debug, Clone)]
pub struct RunFinish {
    pub status: RunStatus,
    pub reads_consumed: u32,
    pub lookups_consumed: u32,
    pub stats: Option<RunStats>,
    pub error_message: Option<String>,
    pub finished_at: i64,
}

impl RunFinish {
    /// A terminal status with no consumption, e.g. a skipped run.
    pub fn bare(status: RunStatus, finished_at: i64) -> Self {
        Self {
            status,
            reads_consumed: 0,
            lookups_consumed: 0,
            stats: None,
            error_message: None,
            finished_at,
        }
    }
}

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, status, dry_run, reads_consumed, lookups_consumed, stats, error_message";

impl Store {
    /// Insert a `started` run row and return it.
    pub fn start_run(&self, dry_run: bool, now: i64) -> Result<RunRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runs (started_at, status, dry_run) VALUES (?1, ?2, ?3)",
            params![now, RunStatus::Started.as_str(), dry_run],
        )?;
        Ok(RunRecord {
            id: conn.last_insert_rowid(),
            started_at: now,
            finished_at: None,
            status: RunStatus::Started,
            dry_run,
            reads_consumed: 0,
            lookups_consumed: 0,
            stats: None,
            error_message: None,
        })
    }

    /// Move a started run to its terminal status. Fails if the run was
    /// already finished, so `finished_at` is written exactly once.
    pub fn finish_run(&self, run_id: i64, finish: &RunFinish) -> Result<()> {
        if !finish.status.is_terminal() {
            return Err(ScoutrError::InvalidState(format!(
                "run {} cannot finish as {}",
                run_id, finish.status
            )));
        }
        let stats = finish.stats.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE runs
            SET finished_at = ?2, status = ?3, reads_consumed = ?4, lookups_consumed = ?5,
                stats = ?6, error_message = ?7
            WHERE id = ?1 AND finished_at IS NULL
            "#,
            params![
                run_id,
                finish.finished_at,
                finish.status.as_str(),
                finish.reads_consumed,
                finish.lookups_consumed,
                stats,
                finish.error_message,
            ],
        )?;
        if updated == 0 {
            return Err(ScoutrError::InvalidState(format!(
                "run {} is missing or already finished",
                run_id
            )));
        }
        Ok(())
    }

    /// Get a run by id.
    pub fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        let raw = conn.query_row(&sql, [run_id], RawRun::from_row).optional()?;
        raw.map(RawRun::into_record).transpose()
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT ?1", RUN_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([limit], RawRun::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

struct RawRun {
    id: i64,
    started_at: i64,
    finished_at: Option<i64>,
    status: String,
    dry_run: bool,
    reads_consumed: u32,
    lookups_consumed: u32,
    stats: Option<String>,
    error_message: Option<String>,
}

impl RawRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            status: row.get(3)?,
            dry_run: row.get(4)?,
            reads_consumed: row.get(5)?,
            lookups_consumed: row.get(6)?,
            stats: row.get(7)?,
            error_message: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<RunRecord> {
        Ok(RunRecord {
            id: self.id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: RunStatus::parse(&self.status)?,
            dry_run: self.dry_run,
            reads_consumed: self.reads_consumed,
            lookups_consumed: self.lookups_consumed,
            stats: self.stats.as_deref().map(serde_json::from_str).transpose()?,
            error_message: self.error_message,
        })
    }
}
