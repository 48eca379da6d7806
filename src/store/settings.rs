//! The single-row operator settings table.
//!
//! The dashboard writes this row; a run reads it once, at start.

use rusqlite::{OptionalExtension, params};

use super::Store;
use crate::error::Result;
use crate::settings::SettingsRow;

impl Store {
    /// Load the settings row and its last-write timestamp, if one was ever saved.
    pub fn load_settings_row(&self) -> Result<Option<(SettingsRow, i64)>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row("SELECT data, updated_at FROM settings WHERE id = 1", [], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()?;
        raw.map(|(data, updated_at)| Ok((serde_json::from_str(&data)?, updated_at)))
            .transpose()
    }

    pub fn save_settings_row(&self, row: &SettingsRow, now: i64) -> Result<()> {
        let data = serde_json::to_string(row)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO settings (id, data, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
            params![data, now],
        )?;
        Ok(())
    }
}
