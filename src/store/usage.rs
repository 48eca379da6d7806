//! Daily usage counters, keyed by UTC day.
//!
//! All writes are additive upserts, so counters only ever grow within a day
//! and a new day starts from zero by virtue of a new key.

use std::collections::BTreeMap;

use rusqlite::{OptionalExtension, params};

use super::Store;
use crate::error::Result;

/// Token totals for one model on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Usage counters for one UTC day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageDay {
    pub day: String,
    pub reads: u32,
    pub lookups: u32,
    pub estimated_cost_usd: Option<f64>,
    pub tokens: BTreeMap<String, TokenTotals>,
}

impl Store {
    /// Usage for `day`; zeroed if nothing was recorded yet.
    pub fn usage_for_day(&self, day: &str) -> Result<UsageDay> {
        let conn = self.conn()?;
        let counters = conn
            .query_row(
                "SELECT reads, lookups, estimated_cost_usd FROM usage_days WHERE day = ?1",
                [day],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?, row.get::<_, Option<f64>>(2)?)),
            )
            .optional()?;

        let mut stmt =
            conn.prepare("SELECT model, input_tokens, output_tokens FROM usage_tokens WHERE day = ?1")?;
        let rows = stmt.query_map([day], |row| {
            Ok((
                row.get::<_, String>(0)?,
                TokenTotals {
                    input_tokens: row.get::<_, i64>(1)? as u64,
                    output_tokens: row.get::<_, i64>(2)? as u64,
                },
            ))
        })?;
        let mut tokens = BTreeMap::new();
        for row in rows {
            let (model, totals) = row?;
            tokens.insert(model, totals);
        }

        let (reads, lookups, estimated_cost_usd) = counters.unwrap_or((0, 0, None));
        Ok(UsageDay {
            day: day.to_string(),
            reads,
            lookups,
            estimated_cost_usd,
            tokens,
        })
    }

    /// Add read and lookup consumption to `day`.
    pub fn add_usage(&self, day: &str, reads: u32, lookups: u32, now: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO usage_days (day, reads, lookups, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(day) DO UPDATE SET
                reads = reads + excluded.reads,
                lookups = lookups + excluded.lookups,
                updated_at = excluded.updated_at
            "#,
            params![day, reads, lookups, now],
        )?;
        Ok(())
    }

    /// Add model token usage (and its estimated cost) to `day`.
    pub fn add_tokens(
        &self,
        day: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO usage_tokens (day, model, input_tokens, output_tokens)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(day, model) DO UPDATE SET
                input_tokens = input_tokens + excluded.input_tokens,
                output_tokens = output_tokens + excluded.output_tokens
            "#,
            params![day, model, input_tokens as i64, output_tokens as i64],
        )?;
        conn.execute(
            r#"
            INSERT INTO usage_days (day, estimated_cost_usd, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(day) DO UPDATE SET
                estimated_cost_usd = COALESCE(estimated_cost_usd, 0) + excluded.estimated_cost_usd,
                updated_at = excluded.updated_at
            "#,
            params![day, cost_usd, now],
        )?;
        Ok(())
    }
}
