//! Per-run settings snapshot.
//!
//! A run reads the config file defaults and the operator settings row once,
//! at start, and carries the merged result around immutably. Phases never
//! re-read settings mid-run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::WorkerConfig;
use crate::error::{Result, ScoutrError};
use crate::queue::QueuePolicy;
use crate::store::Store;

/// Operator overrides persisted in the settings table. Unset fields fall
/// back to the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SettingsRow {
    pub enabled: Option<bool>,
    pub daily_read_cap: Option<u32>,
    pub per_run_read_cap: Option<u32>,
    pub outbound_daily_cap: Option<u32>,
    pub epsilon: Option<f64>,
    pub lookback_days: Option<u32>,
    pub retry_errored_after_mins: Option<u64>,
    pub ack_text: Option<String>,
    pub offer: Option<String>,
    pub disclaimer: Option<String>,
    pub queue: Option<QueuePolicy>,
}

/// Everything a run needs to know about limits and behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub enabled: bool,
    pub dry_run: bool,
    pub daily_read_cap: u32,
    pub per_run_read_cap: u32,
    pub outbound_daily_cap: u32,
    pub epsilon: f64,
    pub lookback_days: u32,
    pub retry_errored_after: Option<Duration>,
    pub refresh_after_days: u32,
    pub refresh_batch: u32,
    pub sampling_batch: u32,
    pub scoring_batch: u32,
    pub drafting_batch: u32,
    pub search_page_size: u32,
    pub ack_text: Option<String>,
    pub offer: String,
    pub disclaimer: Option<String>,
    pub queue: QueuePolicy,
    /// When the settings row was last written, if ever
    pub settings_updated_at: Option<i64>,
}

impl RunSettings {
    /// Settings from the config file alone.
    pub fn from_config(worker: &WorkerConfig, queue: &QueuePolicy, dry_run: bool) -> Self {
        Self {
            enabled: worker.enabled,
            dry_run,
            daily_read_cap: worker.daily_read_cap,
            per_run_read_cap: worker.per_run_read_cap,
            outbound_daily_cap: worker.outbound_daily_cap,
            epsilon: worker.epsilon,
            lookback_days: worker.lookback_days,
            retry_errored_after: worker.retry_errored_after(),
            refresh_after_days: worker.refresh_after_days,
            refresh_batch: worker.refresh_batch,
            sampling_batch: worker.sampling_batch,
            scoring_batch: worker.scoring_batch,
            drafting_batch: worker.drafting_batch,
            search_page_size: worker.search_page_size,
            ack_text: worker.ack_text.clone(),
            offer: worker.offer.clone(),
            disclaimer: worker.disclaimer.clone(),
            queue: queue.clone(),
            settings_updated_at: None,
        }
    }

    /// Overlay an operator settings row.
    pub fn overlay(mut self, row: &SettingsRow, updated_at: i64) -> Result<Self> {
        if let Some(enabled) = row.enabled {
            self.enabled = enabled;
        }
        if let Some(cap) = row.daily_read_cap {
            self.daily_read_cap = cap;
        }
        if let Some(cap) = row.per_run_read_cap {
            self.per_run_read_cap = cap;
        }
        if let Some(cap) = row.outbound_daily_cap {
            self.outbound_daily_cap = cap;
        }
        if let Some(epsilon) = row.epsilon {
            if !(0.0..=1.0).contains(&epsilon) {
                return Err(ScoutrError::Config(format!("settings epsilon out of range: {}", epsilon)));
            }
            self.epsilon = epsilon;
        }
        if let Some(days) = row.lookback_days {
            if days == 0 {
                return Err(ScoutrError::Config("settings lookback_days must be > 0".into()));
            }
            self.lookback_days = days;
        }
        if let Some(mins) = row.retry_errored_after_mins {
            self.retry_errored_after = Some(Duration::from_secs(mins * 60));
        }
        if let Some(text) = &row.ack_text {
            self.ack_text = Some(text.clone()).filter(|t| !t.trim().is_empty());
        }
        if let Some(offer) = &row.offer {
            self.offer = offer.clone();
        }
        if let Some(disclaimer) = &row.disclaimer {
            self.disclaimer = Some(disclaimer.clone()).filter(|d| !d.trim().is_empty());
        }
        if let Some(queue) = &row.queue {
            self.queue = queue.clone();
        }
        self.settings_updated_at = Some(updated_at);
        Ok(self)
    }

    /// Build the snapshot for one run.
    pub fn load(store: &Store, worker: &WorkerConfig, queue: &QueuePolicy, dry_run: bool) -> Result<Self> {
        let base = Self::from_config(worker, queue, dry_run);
        match store.load_settings_row()? {
            Some((row, updated_at)) => {
                log::debug!("Applying settings row updated at {}", updated_at);
                base.overlay(&row, updated_at)
            }
            None => Ok(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_without_row_uses_config() {
        let store = Store::open_in_memory().unwrap();
        let settings = RunSettings::load(&store, &WorkerConfig::default(), &QueuePolicy::default(), true).unwrap();
        assert!(settings.enabled);
        assert!(settings.dry_run);
        assert_eq!(settings.daily_read_cap, 900);
        assert!(settings.settings_updated_at.is_none());
    }

    #[test]
    fn test_row_overrides_only_what_it_sets() {
        let store = Store::open_in_memory().unwrap();
        let row = SettingsRow {
            enabled: Some(false),
            per_run_read_cap: Some(25),
            queue: Some(QueuePolicy {
                max_per_category: 1,
                ..Default::default()
            }),
            ..Default::default()
        };
        store.save_settings_row(&row, 1_000).unwrap();

        let settings = RunSettings::load(&store, &WorkerConfig::default(), &QueuePolicy::default(), false).unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.per_run_read_cap, 25);
        assert_eq!(settings.daily_read_cap, 900);
        assert_eq!(settings.queue.max_per_category, 1);
        assert_eq!(settings.settings_updated_at, Some(1_000));
    }

    #[test]
    fn test_row_with_bad_epsilon_is_rejected() {
        let row = SettingsRow {
            epsilon: Some(2.0),
            ..Default::default()
        };
        let base = RunSettings::from_config(&WorkerConfig::default(), &QueuePolicy::default(), false);
        assert!(matches!(base.overlay(&row, 0), Err(ScoutrError::Config(_))));
    }

    #[test]
    fn test_blank_ack_text_clears_it() {
        let worker = WorkerConfig {
            ack_text: Some("thanks!".into()),
            ..Default::default()
        };
        let row = SettingsRow {
            ack_text: Some("  ".into()),
            ..Default::default()
        };
        let settings = RunSettings::from_config(&worker, &QueuePolicy::default(), false)
            .overlay(&row, 5)
            .unwrap();
        assert!(settings.ack_text.is_none());
    }
}
