//! Reservation ledger: the at-most-once gate for side-effecting actions.
//!
//! A row is keyed by `(action_type, external_id)`. `reserve` either inserts a
//! fresh `reserved` row or reads the existing one:
//!
//! - `done` is final; every later `reserve` returns false.
//! - `error` may be re-armed once its age reaches the caller's retry window.
//! - `reserved` is never re-armed. A crash between reserve and mark leaves
//!   the row stuck until an operator clears it; the outcome of that attempt
//!   is unknown, so it is not safe to repeat.

use std::time::Duration;

use rusqlite::{OptionalExtension, params};

use super::Store;
use crate::domain::{ActionType, HandledItem, HandledStatus};
use crate::error::{Result, ScoutrError, truncate};
use crate::id::now_ms;

/// Error messages are truncated to this many characters before storage.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

impl Store {
    /// Try to take ownership of `(action, external_id)`.
    ///
    /// Returns true iff the caller may now perform the action.
    pub fn reserve(
        &self,
        action: ActionType,
        external_id: &str,
        retry_errored_after: Option<Duration>,
    ) -> Result<bool> {
        self.reserve_at(action, external_id, retry_errored_after, now_ms())
    }

    /// `reserve` with an explicit clock.
    pub fn reserve_at(
        &self,
        action: ActionType,
        external_id: &str,
        retry_errored_after: Option<Duration>,
        now: i64,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO handled_items (action_type, external_id, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(action_type, external_id) DO NOTHING
            "#,
            params![action.as_str(), external_id, HandledStatus::Reserved.as_str(), now],
        )?;
        if inserted == 1 {
            return Ok(true);
        }

        let (status, updated_at): (String, i64) = conn.query_row(
            "SELECT status, updated_at FROM handled_items WHERE action_type = ?1 AND external_id = ?2",
            params![action.as_str(), external_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match HandledStatus::parse(&status)? {
            HandledStatus::Done | HandledStatus::Reserved => Ok(false),
            HandledStatus::Error => {
                let Some(window) = retry_errored_after else {
                    return Ok(false);
                };
                let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
                if now.saturating_sub(updated_at) < window_ms {
                    return Ok(false);
                }
                // Compare-and-swap on status so only one caller re-arms the row.
                let rearmed = conn.execute(
                    r#"
                    UPDATE handled_items
                    SET status = ?3, error_message = NULL, updated_at = ?4
                    WHERE action_type = ?1 AND external_id = ?2 AND status = ?5
                    "#,
                    params![
                        action.as_str(),
                        external_id,
                        HandledStatus::Reserved.as_str(),
                        now,
                        HandledStatus::Error.as_str(),
                    ],
                )?;
                Ok(rearmed == 1)
            }
        }
    }

    /// Transition a reserved row to `done`.
    pub fn mark_done(&self, action: ActionType, external_id: &str) -> Result<()> {
        self.transition(action, external_id, HandledStatus::Done, None, now_ms())
    }

    /// Transition a reserved row to `error`, storing a truncated message.
    pub fn mark_error(&self, action: ActionType, external_id: &str, message: &str) -> Result<()> {
        self.mark_error_at(action, external_id, message, now_ms())
    }

    /// `mark_error` with an explicit clock.
    pub fn mark_error_at(&self, action: ActionType, external_id: &str, message: &str, now: i64) -> Result<()> {
        let message = truncate(message, MAX_ERROR_MESSAGE_CHARS);
        self.transition(action, external_id, HandledStatus::Error, Some(&message), now)
    }

    fn transition(
        &self,
        action: ActionType,
        external_id: &str,
        to: HandledStatus,
        message: Option<&str>,
        now: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE handled_items
            SET status = ?3, error_message = ?4, updated_at = ?5
            WHERE action_type = ?1 AND external_id = ?2 AND status = ?6
            "#,
            params![
                action.as_str(),
                external_id,
                to.as_str(),
                message,
                now,
                HandledStatus::Reserved.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(ScoutrError::InvalidState(format!(
                "{}/{} is not reserved, cannot mark {}",
                action,
                external_id,
                to.as_str()
            )));
        }
        Ok(())
    }

    /// Read a ledger row.
    pub fn handled_item(&self, action: ActionType, external_id: &str) -> Result<Option<HandledItem>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT action_type, external_id, status, error_message, created_at, updated_at
                FROM handled_items WHERE action_type = ?1 AND external_id = ?2
                "#,
                params![action.as_str(), external_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(action_type, external_id, status, error_message, created_at, updated_at)| {
            Ok(HandledItem {
                action_type,
                external_id,
                status: HandledStatus::parse(&status)?,
                error_message,
                created_at,
                updated_at,
            })
        })
        .transpose()
    }
}
