//! Daily queue selection.
//!
//! Three passes in fixed order (value, acceptance, exploration) share one
//! gate that tracks what is already selected and how many picks each
//! category has. The exploration pass ranks by a seeded hash, so the same
//! seed always yields the same queue.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{QueueReason, ScoredCandidate};

/// Category used for candidates the scorer could not place.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Queue quotas and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueuePolicy {
    pub value_count: u32,
    pub acceptance_count: u32,
    pub exploration_count: u32,
    /// Minimum acceptance score to be picked for value
    pub acceptance_min_for_value: u8,
    /// Minimum performance score to be picked for acceptance
    pub performance_min_for_acceptance: u8,
    /// Minimum performance score to be picked for exploration
    pub performance_min_for_exploration: u8,
    pub max_per_category: u32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            value_count: 5,
            acceptance_count: 3,
            exploration_count: 2,
            acceptance_min_for_value: 40,
            performance_min_for_acceptance: 40,
            performance_min_for_exploration: 25,
            max_per_category: 3,
        }
    }
}

impl QueuePolicy {
    pub fn total(&self) -> u32 {
        self.value_count + self.acceptance_count + self.exploration_count
    }
}

/// One selected candidate and why it was picked.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub candidate: ScoredCandidate,
    pub reason: QueueReason,
}

struct Gate {
    max_per_category: u32,
    selected: HashSet<String>,
    per_category: HashMap<String, u32>,
    picks: Vec<Pick>,
}

impl Gate {
    fn new(max_per_category: u32) -> Self {
        Self {
            max_per_category,
            selected: HashSet::new(),
            per_category: HashMap::new(),
            picks: Vec::new(),
        }
    }

    fn can_take(&self, candidate: &ScoredCandidate) -> bool {
        !self.selected.contains(&candidate.candidate_id)
            && self.per_category.get(category(candidate)).copied().unwrap_or(0) < self.max_per_category
    }

    fn take(&mut self, candidate: &ScoredCandidate, reason: QueueReason) {
        self.selected.insert(candidate.candidate_id.clone());
        *self.per_category.entry(category(candidate).to_string()).or_insert(0) += 1;
        self.picks.push(Pick {
            candidate: candidate.clone(),
            reason,
        });
    }

    fn total(&self) -> u32 {
        self.picks.len() as u32
    }

    /// Take from `ordered` until `pass_limit` picks for this pass or `global_cap` in total.
    fn fill<'a>(
        &mut self,
        ordered: impl Iterator<Item = &'a ScoredCandidate>,
        reason: QueueReason,
        pass_limit: u32,
        global_cap: u32,
    ) {
        let mut taken = 0;
        for candidate in ordered {
            if taken >= pass_limit || self.total() >= global_cap {
                break;
            }
            if self.can_take(candidate) {
                self.take(candidate, reason);
                taken += 1;
            }
        }
    }
}

fn category(candidate: &ScoredCandidate) -> &str {
    candidate.category.as_deref().unwrap_or(UNCATEGORIZED)
}

/// Deterministic pseudo-shuffle key for the exploration pass.
pub fn exploration_rank(candidate: &ScoredCandidate, seed: u64) -> u64 {
    let digest = Sha256::digest(format!("{}:{}:{}", candidate.overall, seed, candidate.candidate_id).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Build a day's queue. Output is in selection order.
pub fn build(candidates: &[ScoredCandidate], policy: &QueuePolicy, seed: u64) -> Vec<Pick> {
    let mut gate = Gate::new(policy.max_per_category);

    let mut value: Vec<&ScoredCandidate> = candidates
        .iter()
        .filter(|c| c.acceptance >= policy.acceptance_min_for_value)
        .collect();
    value.sort_by(|a, b| b.overall.cmp(&a.overall).then_with(|| a.candidate_id.cmp(&b.candidate_id)));
    gate.fill(value.into_iter(), QueueReason::Value, policy.value_count, policy.value_count);

    let mut acceptance: Vec<&ScoredCandidate> = candidates
        .iter()
        .filter(|c| c.performance >= policy.performance_min_for_acceptance)
        .collect();
    acceptance.sort_by(|a, b| b.acceptance.cmp(&a.acceptance).then_with(|| a.candidate_id.cmp(&b.candidate_id)));
    gate.fill(
        acceptance.into_iter(),
        QueueReason::Acceptance,
        policy.acceptance_count,
        policy.value_count + policy.acceptance_count,
    );

    let mut exploration: Vec<(u64, &ScoredCandidate)> = candidates
        .iter()
        .filter(|c| c.performance >= policy.performance_min_for_exploration)
        .map(|c| (exploration_rank(c, seed), c))
        .collect();
    exploration.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.candidate_id.cmp(&b.1.candidate_id)));
    gate.fill(
        exploration.into_iter().map(|(_, c)| c),
        QueueReason::Exploration,
        policy.exploration_count,
        policy.total(),
    );

    gate.picks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, category: Option<&str>, performance: u8, acceptance: u8) -> ScoredCandidate {
        ScoredCandidate {
            candidate_id: id.to_string(),
            category: category.map(String::from),
            performance,
            acceptance,
            overall: crate::domain::overall_score(performance, acceptance),
        }
    }

    fn ids(picks: &[Pick]) -> Vec<&str> {
        picks.iter().map(|p| p.candidate.candidate_id.as_str()).collect()
    }

    fn pool(n: usize) -> Vec<ScoredCandidate> {
        let sports = ["soccer", "tennis", "golf", "swim"];
        (0..n)
            .map(|i| {
                candidate(
                    &format!("x:{}", i),
                    Some(sports[i % sports.len()]),
                    (30 + (i * 7) % 70) as u8,
                    (20 + (i * 13) % 80) as u8,
                )
            })
            .collect()
    }

    #[test]
    fn test_value_pass_orders_by_overall() {
        let candidates = vec![
            candidate("x:low", Some("a"), 50, 50),
            candidate("x:high", Some("b"), 90, 90),
            candidate("x:mid", Some("c"), 70, 70),
        ];
        let policy = QueuePolicy {
            value_count: 2,
            acceptance_count: 0,
            exploration_count: 0,
            ..Default::default()
        };
        let picks = build(&candidates, &policy, 1);
        assert_eq!(ids(&picks), vec!["x:high", "x:mid"]);
        assert!(picks.iter().all(|p| p.reason == QueueReason::Value));
    }

    #[test]
    fn test_value_pass_requires_acceptance_threshold() {
        let candidates = vec![candidate("x:1", Some("a"), 99, 10), candidate("x:2", Some("a"), 60, 60)];
        let policy = QueuePolicy {
            value_count: 2,
            acceptance_count: 0,
            exploration_count: 0,
            ..Default::default()
        };
        assert_eq!(ids(&build(&candidates, &policy, 1)), vec!["x:2"]);
    }

    #[test]
    fn test_acceptance_pass_skips_already_selected() {
        let candidates = vec![
            candidate("x:1", Some("a"), 90, 95),
            candidate("x:2", Some("b"), 45, 90),
            candidate("x:3", Some("c"), 45, 80),
        ];
        let policy = QueuePolicy {
            value_count: 1,
            acceptance_count: 2,
            exploration_count: 0,
            ..Default::default()
        };
        let picks = build(&candidates, &policy, 1);
        assert_eq!(ids(&picks), vec!["x:1", "x:2", "x:3"]);
        assert_eq!(picks[0].reason, QueueReason::Value);
        assert_eq!(picks[1].reason, QueueReason::Acceptance);
        assert_eq!(picks[2].reason, QueueReason::Acceptance);
    }

    #[test]
    fn test_category_cap_is_shared_across_passes() {
        let candidates = vec![
            candidate("x:1", Some("soccer"), 90, 90),
            candidate("x:2", Some("soccer"), 85, 85),
            candidate("x:3", Some("soccer"), 80, 80),
            candidate("x:4", Some("tennis"), 50, 50),
        ];
        let policy = QueuePolicy {
            value_count: 2,
            acceptance_count: 2,
            exploration_count: 2,
            max_per_category: 2,
            ..Default::default()
        };
        let picks = build(&candidates, &policy, 7);
        assert_eq!(ids(&picks), vec!["x:1", "x:2", "x:4"]);
    }

    #[test]
    fn test_uncategorized_candidates_share_a_bucket() {
        let candidates = vec![candidate("x:1", None, 90, 90), candidate("x:2", None, 85, 85)];
        let policy = QueuePolicy {
            max_per_category: 1,
            ..Default::default()
        };
        assert_eq!(build(&candidates, &policy, 1).len(), 1);
    }

    #[test]
    fn test_caps_hold_on_larger_pools() {
        let candidates = pool(200);
        let policy = QueuePolicy {
            value_count: 6,
            acceptance_count: 4,
            exploration_count: 5,
            max_per_category: 4,
            ..Default::default()
        };
        for seed in 0..50 {
            let picks = build(&candidates, &policy, seed);
            assert!(picks.len() as u32 <= policy.total());

            let mut per_category: HashMap<&str, u32> = HashMap::new();
            for pick in &picks {
                *per_category.entry(category(&pick.candidate)).or_default() += 1;
            }
            assert!(per_category.values().all(|n| *n <= policy.max_per_category));

            let unique: HashSet<_> = ids(&picks).into_iter().collect();
            assert_eq!(unique.len(), picks.len());
        }
    }

    #[test]
    fn test_exploration_is_reproducible_per_seed() {
        let candidates = pool(60);
        let policy = QueuePolicy {
            value_count: 0,
            acceptance_count: 0,
            exploration_count: 5,
            max_per_category: 10,
            ..Default::default()
        };
        let first = build(&candidates, &policy, 42);
        let second = build(&candidates, &policy, 42);
        assert_eq!(first, second);
        assert!(first.iter().all(|p| p.reason == QueueReason::Exploration));

        let other_seeds_differ = (43..53).any(|seed| ids(&build(&candidates, &policy, seed)) != ids(&first));
        assert!(other_seeds_differ);
    }

    #[test]
    fn test_exploration_threshold() {
        let candidates = vec![candidate("x:1", Some("a"), 10, 10), candidate("x:2", Some("b"), 30, 10)];
        let policy = QueuePolicy {
            value_count: 0,
            acceptance_count: 0,
            exploration_count: 5,
            ..Default::default()
        };
        assert_eq!(ids(&build(&candidates, &policy, 1)), vec!["x:2"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(build(&[], &QueuePolicy::default(), 1).is_empty());
    }
}
