//! Per-query yield over a lookback window.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::days_before;
use crate::store::{FunnelCounts, Store};

/// Weight of the advance rate in the yield score.
pub const ADVANCE_WEIGHT: f64 = 0.85;
/// Weight of the conversion rate in the yield score.
pub const CONVERT_WEIGHT: f64 = 0.15;

/// Funnel counts for one query and the derived score in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryYield {
    pub discovered: u64,
    pub advanced: u64,
    pub converted: u64,
    pub score: f64,
}

impl QueryYield {
    pub fn from_counts(discovered: u64, advanced: u64, converted: u64) -> Self {
        let score = if discovered == 0 {
            0.0
        } else {
            let d = discovered as f64;
            ADVANCE_WEIGHT * (advanced as f64 / d) + CONVERT_WEIGHT * (converted as f64 / d)
        };
        Self {
            discovered,
            advanced,
            converted,
            score,
        }
    }
}

impl From<&FunnelCounts> for QueryYield {
    fn from(counts: &FunnelCounts) -> Self {
        Self::from_counts(counts.discovered, counts.advanced, counts.converted)
    }
}

/// Yield per query id for candidates discovered in the last `lookback_days`.
pub fn compute_yield(store: &Store, lookback_days: u32, now: i64) -> Result<HashMap<String, QueryYield>> {
    let since = days_before(now, lookback_days);
    let counts = store.funnel_counts(since)?;
    Ok(counts
        .iter()
        .map(|c| (c.query_id.clone(), QueryYield::from(c)))
        .collect())
}
