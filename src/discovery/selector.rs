//! Explore/exploit query selection.
//!
//! Cold start (no yield data) is a round-robin keyed only by the run index.
//! Once yields exist, each pool independently explores uniformly with
//! probability `epsilon` or exploits by weighted sampling. Every query keeps
//! a nonzero weight, so low scorers are never starved.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::catalog::{DiscoveryQuery, QueryCatalog, QueryPool};
use super::yield_tracker::QueryYield;
use crate::id::hour_bucket;

/// Additive prior on every query's score.
pub const SCORE_PRIOR: f64 = 0.05;
/// Scored queries kept per pool in the debug snapshot.
pub const DEBUG_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    RoundRobin,
    Explore,
    Exploit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredQuery {
    pub id: String,
    pub score: f64,
    pub discovered: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDebug {
    pub picked: String,
    pub mode: SelectionMode,
    pub top: Vec<ScoredQuery>,
}

/// What the selector did, persisted with the run stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDebug {
    pub run_index: i64,
    /// None on cold start
    pub seed: Option<u64>,
    pub lookback_days: u32,
    pub general: PoolDebug,
    pub niche: PoolDebug,
}

/// One general and one niche query.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub picked: [DiscoveryQuery; 2],
    pub debug: SelectionDebug,
}

impl Selection {
    pub fn general(&self) -> &DiscoveryQuery {
        &self.picked[0]
    }

    pub fn niche(&self) -> &DiscoveryQuery {
        &self.picked[1]
    }
}

/// Combine run index and hour bucket into one seed (splitmix64 finalizer).
pub fn mix(run_index: i64, hour: i64) -> u64 {
    let mut z = (run_index as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(hour as u64);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn score_of(yields: &HashMap<String, QueryYield>, id: &str) -> f64 {
    yields.get(id).map(|y| y.score).unwrap_or(0.0)
}

/// Sampling weight. The smoothed score is squared to sharpen the
/// preference for proven queries while keeping every weight above zero.
pub fn weight(score: f64) -> f64 {
    let smoothed = SCORE_PRIOR + score.max(0.0);
    smoothed * smoothed
}

fn top_scored(pool: &[DiscoveryQuery], yields: &HashMap<String, QueryYield>) -> Vec<ScoredQuery> {
    let mut scored: Vec<ScoredQuery> = pool
        .iter()
        .filter_map(|q| {
            yields.get(&q.id).map(|y| ScoredQuery {
                id: q.id.clone(),
                score: y.score,
                discovered: y.discovered,
            })
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(DEBUG_TOP_K);
    scored
}

fn weighted_pick(rng: &mut StdRng, pool: &[DiscoveryQuery], yields: &HashMap<String, QueryYield>) -> usize {
    let weights: Vec<f64> = pool.iter().map(|q| weight(score_of(yields, &q.id))).collect();
    let total: f64 = weights.iter().sum();
    let mut target = rng.random::<f64>() * total;
    for (index, w) in weights.iter().enumerate() {
        if target < *w {
            return index;
        }
        target -= w;
    }
    pool.len() - 1
}

fn pick_from(
    rng: &mut StdRng,
    pool: &[DiscoveryQuery],
    yields: &HashMap<String, QueryYield>,
    epsilon: f64,
) -> (usize, SelectionMode) {
    if rng.random::<f64>() < epsilon {
        (rng.random_range(0..pool.len()), SelectionMode::Explore)
    } else {
        (weighted_pick(rng, pool, yields), SelectionMode::Exploit)
    }
}

/// Pick one query per pool for this run.
///
/// # Panics
///
/// Panics if a pool is empty; `QueryCatalog::new` rules that out.
pub fn select(
    run_index: i64,
    catalog: &QueryCatalog,
    yields: &HashMap<String, QueryYield>,
    lookback_days: u32,
    epsilon: f64,
    now: i64,
) -> Selection {
    let general = catalog.pool(QueryPool::General);
    let niche = catalog.pool(QueryPool::Niche);
    assert!(!general.is_empty() && !niche.is_empty(), "query pools must not be empty");

    let (seed, (gi, gmode), (ni, nmode)) = if yields.is_empty() {
        let index = run_index.unsigned_abs() as usize;
        (
            None,
            (index % general.len(), SelectionMode::RoundRobin),
            (index % niche.len(), SelectionMode::RoundRobin),
        )
    } else {
        let seed = mix(run_index, hour_bucket(now));
        let mut rng = StdRng::seed_from_u64(seed);
        let g = pick_from(&mut rng, general, yields, epsilon);
        let n = pick_from(&mut rng, niche, yields, epsilon);
        (Some(seed), g, n)
    };

    let picked = [general[gi].clone(), niche[ni].clone()];
    log::debug!(
        "Selected queries {} ({:?}) and {} ({:?}) for run {}",
        picked[0].id,
        gmode,
        picked[1].id,
        nmode,
        run_index
    );

    let debug = SelectionDebug {
        run_index,
        seed,
        lookback_days,
        general: PoolDebug {
            picked: picked[0].id.clone(),
            mode: gmode,
            top: top_scored(general, yields),
        },
        niche: PoolDebug {
            picked: picked[1].id.clone(),
            mode: nmode,
            top: top_scored(niche, yields),
        },
    };
    Selection { picked, debug }
}
