//! Append-only audit trail of actions and phase failures.

use rusqlite::params;

use super::Store;
use crate::domain::{ActionRecord, ActionStatus, NewAction};
use crate::error::Result;
use crate::id::day_key;

impl Store {
    /// Append an audit entry stamped at `now`.
    pub fn record_action(&self, action: &NewAction, now: i64) -> Result<i64> {
        let meta = serde_json::to_string(&action.meta)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO actions (run_id, kind, status, target, meta, day, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                action.run_id,
                action.meta.kind(),
                action.status.as_str(),
                action.target,
                meta,
                day_key(now),
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Count entries of `kind` with `status` on `day`.
    pub fn count_actions(&self, day: &str, kind: &str, status: ActionStatus) -> Result<u32> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM actions WHERE day = ?1 AND kind = ?2 AND status = ?3",
            params![day, kind, status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All entries written by a run, oldest first.
    pub fn actions_for_run(&self, run_id: i64) -> Result<Vec<ActionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, kind, status, target, meta, day, created_at FROM actions WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([run_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, run_id, kind, status, target, meta, day, created_at) = row?;
            records.push(ActionRecord {
                id,
                run_id,
                kind,
                status,
                target,
                meta: serde_json::from_str(&meta)?,
                day,
                created_at,
            });
        }
        Ok(records)
    }
}
