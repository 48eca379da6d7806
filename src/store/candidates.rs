//! Candidates and everything hanging off them: samples, scores, queue
//! entries and drafts.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use crate::domain::{
    Attribution, Candidate, CandidateScore, Draft, FeatureMap, Platform, Profile, QueueEntry, QueueReason,
    Sample, ScoredCandidate, Tier,
};
use crate::error::Result;

/// Per-query funnel counts over a lookback window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelCounts {
    pub query_id: String,
    pub discovered: u64,
    pub advanced: u64,
    pub converted: u64,
}

const CANDIDATE_COLUMNS: &str = "id, platform, external_id, handle, display_name, bio, followers, category, \
     first_query, first_query_at, discovered_at, refreshed_at, replied_at, approved";

impl FromSql for Platform {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Platform::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<Candidate> {
    let first_query: Option<String> = row.get(8)?;
    let first_query_at: Option<i64> = row.get(9)?;
    let first_query = match (first_query, first_query_at) {
        (Some(query_id), Some(at)) => Attribution::Set { query_id, at },
        _ => Attribution::Unset,
    };
    Ok(Candidate {
        id: row.get(0)?,
        platform: row.get(1)?,
        profile: Profile {
            external_id: row.get(2)?,
            handle: row.get(3)?,
            display_name: row.get(4)?,
            bio: row.get(5)?,
            followers: row.get::<_, i64>(6)? as u64,
        },
        category: row.get(7)?,
        first_query,
        discovered_at: row.get(10)?,
        refreshed_at: row.get(11)?,
        replied_at: row.get(12)?,
        approved: row.get(13)?,
    })
}

impl Store {
    /// Get a candidate by id.
    pub fn candidate(&self, id: &str) -> Result<Option<Candidate>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM candidates WHERE id = ?1", CANDIDATE_COLUMNS);
        let candidate = conn.query_row(&sql, [id], candidate_from_row).optional()?;
        Ok(candidate)
    }

    fn list_candidates(&self, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Candidate>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM candidates {}", CANDIDATE_COLUMNS, where_clause);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args, candidate_from_row)?;

        let mut candidates = Vec::new();
        for row in rows {
            candidates.push(row?);
        }
        Ok(candidates)
    }

    /// Record a discovery hit for `profile` by `query_id`.
    ///
    /// New candidates are inserted with the attribution set. Known candidates
    /// get their profile updated; attribution is only written when it was
    /// still unset. Returns true if the candidate is new.
    pub fn record_discovery(&self, platform: Platform, profile: &Profile, query_id: &str, now: i64) -> Result<bool> {
        let id = platform.candidate_id(&profile.external_id);
        match self.candidate(&id)? {
            None => {
                let mut candidate = Candidate::new(platform, profile.clone(), now);
                candidate.first_query.set_once(query_id, now);
                self.insert_candidate(&candidate)?;
                Ok(true)
            }
            Some(mut existing) => {
                self.update_profile(&id, profile)?;
                if existing.first_query.set_once(query_id, now) {
                    self.write_attribution(&id, &existing.first_query)?;
                }
                Ok(false)
            }
        }
    }

    /// Ensure a candidate row exists for an inbound contact, without attribution.
    pub fn ensure_candidate(&self, platform: Platform, profile: &Profile, now: i64) -> Result<Candidate> {
        let id = platform.candidate_id(&profile.external_id);
        if let Some(existing) = self.candidate(&id)? {
            return Ok(existing);
        }
        let candidate = Candidate::new(platform, profile.clone(), now);
        self.insert_candidate(&candidate)?;
        Ok(candidate)
    }

    fn insert_candidate(&self, candidate: &Candidate) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO candidates
            (id, platform, external_id, handle, display_name, bio, followers, category,
             first_query, first_query_at, discovered_at, refreshed_at, replied_at, approved)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                candidate.id,
                candidate.platform.as_str(),
                candidate.profile.external_id,
                candidate.profile.handle,
                candidate.profile.display_name,
                candidate.profile.bio,
                candidate.profile.followers as i64,
                candidate.category,
                candidate.first_query.query_id(),
                candidate.first_query.at(),
                candidate.discovered_at,
                candidate.refreshed_at,
                candidate.replied_at,
                candidate.approved,
            ],
        )?;
        Ok(())
    }

    fn update_profile(&self, id: &str, profile: &Profile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE candidates SET handle = ?2, display_name = ?3, bio = ?4, followers = ?5, scoring_dirty = 1 \
             WHERE id = ?1",
            params![id, profile.handle, profile.display_name, profile.bio, profile.followers as i64],
        )?;
        Ok(())
    }

    fn write_attribution(&self, id: &str, attribution: &Attribution) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE candidates SET first_query = ?2, first_query_at = ?3 WHERE id = ?1",
            params![id, attribution.query_id(), attribution.at()],
        )?;
        Ok(())
    }

    /// Store a refreshed profile and stamp `refreshed_at`.
    pub fn mark_refreshed(&self, id: &str, profile: &Profile, now: i64) -> Result<()> {
        self.update_profile(id, profile)?;
        let conn = self.conn()?;
        conn.execute("UPDATE candidates SET refreshed_at = ?2 WHERE id = ?1", params![id, now])?;
        Ok(())
    }

    /// Note a failed refresh so the candidate waits a full window before the next try.
    pub fn mark_refresh_attempted(&self, id: &str, now: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE candidates SET refresh_attempted_at = ?2 WHERE id = ?1", params![id, now])?;
        Ok(())
    }

    /// Candidates whose profile was never refreshed or is older than `before`,
    /// leaving out those with a failed attempt since `before`.
    pub fn candidates_needing_refresh(
        &self,
        before: i64,
        include_forum: bool,
        limit: u32,
    ) -> Result<Vec<Candidate>> {
        self.list_candidates(
            "WHERE COALESCE(refreshed_at, discovered_at) < ?1 AND (refresh_attempted_at IS NULL OR refresh_attempted_at < ?1) \
             AND (?2 OR platform <> 'forum') \
             ORDER BY COALESCE(refreshed_at, discovered_at), id LIMIT ?3",
            &[&before, &include_forum, &limit],
        )
    }

    /// Record that a candidate replied. First write wins; returns true if this call set it.
    pub fn mark_replied(&self, id: &str, now: i64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE candidates SET replied_at = ?2 WHERE id = ?1 AND replied_at IS NULL",
            params![id, now],
        )?;
        Ok(updated == 1)
    }

    /// Operator approval gate for outbound DMs.
    pub fn set_approved(&self, id: &str, approved: bool) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE candidates SET approved = ?2 WHERE id = ?1", params![id, approved])?;
        Ok(())
    }

    pub fn set_category(&self, id: &str, category: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE candidates SET category = ?2 WHERE id = ?1", params![id, category])?;
        Ok(())
    }

    /// Replace the sample posts for a candidate.
    pub fn save_samples(&self, id: &str, samples: &[Sample]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM candidate_samples WHERE candidate_id = ?1", [id])?;
        tx.execute("UPDATE candidates SET scoring_dirty = 1 WHERE id = ?1", [id])?;
        for (position, sample) in samples.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO candidate_samples (candidate_id, post_id, text, position) VALUES (?1, ?2, ?3, ?4)",
                params![id, sample.post_id, sample.text, position as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn samples(&self, id: &str) -> Result<Vec<Sample>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT post_id, text FROM candidate_samples WHERE candidate_id = ?1 ORDER BY position")?;
        let rows = stmt.query_map([id], |row| {
            Ok(Sample {
                post_id: row.get(0)?,
                text: row.get(1)?,
            })
        })?;
        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    /// Note a sampling attempt that produced nothing (error or empty timeline).
    pub fn mark_sample_attempted(&self, id: &str, now: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE candidates SET sample_attempted_at = ?2 WHERE id = ?1", params![id, now])?;
        Ok(())
    }

    /// Candidates that have no sample posts yet, oldest first. Candidates
    /// with an empty attempt after `retry_before` are left out.
    pub fn candidates_without_samples(
        &self,
        retry_before: i64,
        include_forum: bool,
        limit: u32,
    ) -> Result<Vec<Candidate>> {
        self.list_candidates(
            "WHERE id NOT IN (SELECT candidate_id FROM candidate_samples) \
             AND (sample_attempted_at IS NULL OR sample_attempted_at < ?1) AND (?2 OR platform <> 'forum') \
             ORDER BY discovered_at, id LIMIT ?3",
            &[&retry_before, &include_forum, &limit],
        )
    }

    /// Never-queued candidates with samples whose profile or samples changed
    /// since they were last scored. Failed attempts go to the back.
    pub fn candidates_for_scoring(&self, limit: u32) -> Result<Vec<Candidate>> {
        self.list_candidates(
            "WHERE scoring_dirty = 1 AND id IN (SELECT candidate_id FROM candidate_samples) \
             AND id NOT IN (SELECT candidate_id FROM queue_entries) \
             ORDER BY COALESCE(score_attempted_at, 0), discovered_at, id LIMIT ?1",
            &[&limit],
        )
    }

    /// The latest score still matches the scoring input.
    pub fn mark_score_current(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE candidates SET scoring_dirty = 0 WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn mark_score_attempted(&self, id: &str, now: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE candidates SET score_attempted_at = ?2 WHERE id = ?1", params![id, now])?;
        Ok(())
    }

    /// Append to the score history and replace the latest score.
    pub fn save_score(&self, score: &CandidateScore) -> Result<()> {
        let rationale = serde_json::to_string(&score.rationale)?;
        let features = serde_json::to_string(&score.features)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (verb, table) in [("INSERT", "score_history"), ("INSERT OR REPLACE", "candidate_scores")] {
            let sql = format!(
                "{} INTO {} (candidate_id, performance, acceptance, overall, tier, rationale, features, \
                 input_hash, model, scored_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                verb, table
            );
            tx.execute(
                &sql,
                params![
                    score.candidate_id,
                    score.performance,
                    score.acceptance,
                    score.overall,
                    score.tier.as_str(),
                    rationale,
                    features,
                    score.input_hash,
                    score.model,
                    score.scored_at,
                ],
            )?;
        }
        tx.execute(
            "UPDATE candidates SET scoring_dirty = 0 WHERE id = ?1",
            [&score.candidate_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn latest_score(&self, id: &str) -> Result<Option<CandidateScore>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                r#"
                SELECT candidate_id, performance, acceptance, overall, tier, rationale, features,
                       input_hash, model, scored_at
                FROM candidate_scores WHERE candidate_id = ?1
                "#,
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u8>(1)?,
                        row.get::<_, u8>(2)?,
                        row.get::<_, u8>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, i64>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((candidate_id, performance, acceptance, overall, tier, rationale, features, input_hash, model, scored_at)) =
            raw
        else {
            return Ok(None);
        };
        let features: FeatureMap = serde_json::from_str(&features)?;
        Ok(Some(CandidateScore {
            candidate_id,
            performance,
            acceptance,
            overall,
            tier: Tier::parse(&tier)?,
            rationale: serde_json::from_str(&rationale)?,
            features,
            input_hash,
            model,
            scored_at,
        }))
    }

    pub fn score_history_len(&self, id: &str) -> Result<u32> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM score_history WHERE candidate_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Scored candidates that have never been queued: the queue builder's input.
    pub fn queueable_candidates(&self) -> Result<Vec<ScoredCandidate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.category, s.performance, s.acceptance, s.overall
            FROM candidates c
            JOIN candidate_scores s ON s.candidate_id = c.id
            LEFT JOIN queue_entries q ON q.candidate_id = c.id
            WHERE q.candidate_id IS NULL
            ORDER BY c.id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ScoredCandidate {
                candidate_id: row.get(0)?,
                category: row.get(1)?,
                performance: row.get(2)?,
                acceptance: row.get(3)?,
                overall: row.get(4)?,
            })
        })?;
        let mut candidates = Vec::new();
        for row in rows {
            candidates.push(row?);
        }
        Ok(candidates)
    }

    /// Persist queue entries. A candidate already queued keeps its original
    /// day; returns how many entries were newly stored.
    pub fn enqueue(&self, entries: &[QueueEntry], run_id: Option<i64>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut stored = 0;
        for entry in entries {
            stored += tx.execute(
                r#"
                INSERT INTO queue_entries (candidate_id, queued_day, reason, position, run_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(candidate_id) DO NOTHING
                "#,
                params![
                    entry.candidate_id,
                    entry.queued_day,
                    entry.reason.as_str(),
                    entry.position,
                    run_id
                ],
            )?;
        }
        tx.commit()?;
        Ok(stored)
    }

    pub fn queue_entry(&self, id: &str) -> Result<Option<QueueEntry>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT candidate_id, queued_day, reason, position FROM queue_entries WHERE candidate_id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                },
            )
            .optional()?;
        raw.map(|(candidate_id, queued_day, reason, position)| {
            Ok(QueueEntry {
                candidate_id,
                queued_day,
                reason: QueueReason::parse(&reason)?,
                position,
            })
        })
        .transpose()
    }

    /// Entries queued on `day`, in selection order.
    pub fn queue_for_day(&self, day: &str) -> Result<Vec<QueueEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT candidate_id, queued_day, reason, position FROM queue_entries WHERE queued_day = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([day], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (candidate_id, queued_day, reason, position) = row?;
            entries.push(QueueEntry {
                candidate_id,
                queued_day,
                reason: QueueReason::parse(&reason)?,
                position,
            });
        }
        Ok(entries)
    }

    pub fn save_draft(&self, draft: &Draft) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO drafts (candidate_id, dm_text, email_subject, email_body, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                draft.candidate_id,
                draft.dm_text,
                draft.email_subject,
                draft.email_body,
                draft.created_at
            ],
        )?;
        Ok(())
    }

    pub fn draft(&self, id: &str) -> Result<Option<Draft>> {
        let conn = self.conn()?;
        let draft = conn
            .query_row(
                "SELECT candidate_id, dm_text, email_subject, email_body, created_at FROM drafts WHERE candidate_id = ?1",
                [id],
                |row| {
                    Ok(Draft {
                        candidate_id: row.get(0)?,
                        dm_text: row.get(1)?,
                        email_subject: row.get(2)?,
                        email_body: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(draft)
    }

    /// Funnel counts per first-discovering query since `since`.
    ///
    /// Advanced means the candidate was ever queued; converted means it replied.
    pub fn funnel_counts(&self, since: i64) -> Result<Vec<FunnelCounts>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.first_query,
                   COUNT(*),
                   SUM(CASE WHEN q.candidate_id IS NOT NULL THEN 1 ELSE 0 END),
                   SUM(CASE WHEN c.replied_at IS NOT NULL THEN 1 ELSE 0 END)
            FROM candidates c
            LEFT JOIN queue_entries q ON q.candidate_id = c.id
            WHERE c.first_query IS NOT NULL AND c.first_query_at >= ?1
            GROUP BY c.first_query
            ORDER BY c.first_query
            "#,
        )?;
        let rows = stmt.query_map([since], |row| {
            Ok(FunnelCounts {
                query_id: row.get(0)?,
                discovered: row.get::<_, i64>(1)? as u64,
                advanced: row.get::<_, i64>(2)? as u64,
                converted: row.get::<_, i64>(3)? as u64,
            })
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}
