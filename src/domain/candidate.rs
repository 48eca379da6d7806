//! Candidate, scoring, queue and draft types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutrError};

/// Platform a candidate was found on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Social,
    Forum,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Social => "x",
            Platform::Forum => "forum",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "x" => Ok(Platform::Social),
            "forum" => Ok(Platform::Forum),
            other => Err(ScoutrError::Storage(format!("unknown platform: {}", other))),
        }
    }

    /// Candidate id for an account on this platform, e.g. `x:12345`.
    pub fn candidate_id(&self, external_id: &str) -> String {
        format!("{}:{}", self.as_str(), external_id)
    }
}

/// Which discovery query first found a candidate.
///
/// Set at most once; re-discovery by another query never overwrites it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Attribution {
    #[default]
    Unset,
    Set { query_id: String, at: i64 },
}

impl Attribution {
    /// Record the first query. Returns `true` only if this call set it.
    pub fn set_once(&mut self, query_id: &str, at: i64) -> bool {
        match self {
            Attribution::Unset => {
                *self = Attribution::Set {
                    query_id: query_id.to_string(),
                    at,
                };
                true
            }
            Attribution::Set { .. } => false,
        }
    }

    pub fn query_id(&self) -> Option<&str> {
        match self {
            Attribution::Unset => None,
            Attribution::Set { query_id, .. } => Some(query_id),
        }
    }

    pub fn at(&self) -> Option<i64> {
        match self {
            Attribution::Unset => None,
            Attribution::Set { at, .. } => Some(*at),
        }
    }
}

/// Public profile of an external account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub external_id: String,
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub followers: u64,
}

/// A discovered external account.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub platform: Platform,
    pub profile: Profile,
    /// Sport or niche; filled from the scorer's dominant sport weight
    pub category: Option<String>,
    pub first_query: Attribution,
    pub discovered_at: i64,
    pub refreshed_at: Option<i64>,
    pub replied_at: Option<i64>,
    /// Set by an operator before outbound DMs may be sent
    pub approved: bool,
}

impl Candidate {
    pub fn new(platform: Platform, profile: Profile, now: i64) -> Self {
        Self {
            id: platform.candidate_id(&profile.external_id),
            platform,
            profile,
            category: None,
            first_query: Attribution::Unset,
            discovered_at: now,
            refreshed_at: None,
            replied_at: None,
            approved: false,
        }
    }
}

/// A recent post used as scoring input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    pub post_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tier {
    A,
    B,
    C,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Tier::A),
            "B" => Ok(Tier::B),
            "C" => Ok(Tier::C),
            other => Err(ScoutrError::Contract(format!("tier must be A, B or C, got {:?}", other))),
        }
    }
}

/// Normalized features returned by the scorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureMap {
    /// Sport -> weight, weights sum to 1 when non-empty
    pub sport_weights: BTreeMap<String, f64>,
    /// Named 0-1 scores
    pub scores: BTreeMap<String, f64>,
}

impl FeatureMap {
    /// Sport with the largest weight, ties broken by name.
    pub fn dominant_sport(&self) -> Option<&str> {
        self.sport_weights
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(sport, _)| sport.as_str())
    }
}

/// Latest (or historical) scoring result for a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub candidate_id: String,
    pub performance: u8,
    pub acceptance: u8,
    pub overall: u8,
    pub tier: Tier,
    pub rationale: Vec<String>,
    pub features: FeatureMap,
    /// Hex SHA-256 of the scoring input
    pub input_hash: String,
    pub model: String,
    pub scored_at: i64,
}

/// Combined score: geometric mean of the two likelihoods, so a candidate
/// must be reasonable on both axes to rank highly.
pub fn overall_score(performance: u8, acceptance: u8) -> u8 {
    let product = f64::from(performance) * f64::from(acceptance);
    product.sqrt().round().clamp(0.0, 100.0) as u8
}

/// Queue builder input.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate_id: String,
    pub category: Option<String>,
    pub performance: u8,
    pub acceptance: u8,
    pub overall: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueueReason {
    Value,
    Acceptance,
    Exploration,
}

impl QueueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueReason::Value => "value",
            QueueReason::Acceptance => "acceptance",
            QueueReason::Exploration => "exploration",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "value" => Ok(QueueReason::Value),
            "acceptance" => Ok(QueueReason::Acceptance),
            "exploration" => Ok(QueueReason::Exploration),
            other => Err(ScoutrError::Storage(format!("unknown queue reason: {}", other))),
        }
    }
}

/// A candidate chosen for a day's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub candidate_id: String,
    /// UTC day the candidate was first queued; never rewritten
    pub queued_day: String,
    pub reason: QueueReason,
    pub position: u32,
}

/// Outreach copy for a queued candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub candidate_id: String,
    pub dm_text: String,
    pub email_subject: String,
    pub email_body: String,
    pub created_at: i64,
}
