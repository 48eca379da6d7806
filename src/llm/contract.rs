//! Output contract for the scoring and drafting services.
//!
//! Services answer in loose JSON. Everything is validated here before it
//! reaches the store: out-of-range numbers are clamped, and structurally
//! wrong answers become `ScoutrError::Contract`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{DraftOutput, ScoringInput, ScoringOutput};
use crate::domain::{FeatureMap, Tier};
use crate::error::{Result, ScoutrError};

pub const MIN_RATIONALE: usize = 3;
pub const MAX_RATIONALE: usize = 6;

/// Scoring answer as the service returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScoring {
    pub performance: f64,
    pub acceptance: f64,
    pub tier: String,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub sport_weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDraft {
    #[serde(default)]
    pub dm: String,
    #[serde(default)]
    pub email_subject: String,
    #[serde(default)]
    pub email_body: String,
}

fn finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScoutrError::Contract(format!("{} is not a finite number", name)))
    }
}

fn clamp_score(name: &str, value: f64) -> Result<u8> {
    Ok(finite(name, value)?.round().clamp(0.0, 100.0) as u8)
}

fn normalize_weights(weights: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>> {
    let mut cleaned = BTreeMap::new();
    for (sport, weight) in weights {
        let sport = sport.trim().to_lowercase();
        if sport.is_empty() {
            continue;
        }
        let weight = finite("sport weight", *weight)?.max(0.0);
        *cleaned.entry(sport).or_insert(0.0) += weight;
    }
    let total: f64 = cleaned.values().sum();
    if total <= 0.0 {
        return Ok(BTreeMap::new());
    }
    Ok(cleaned
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(sport, w)| (sport, w / total))
        .collect())
}

pub fn validate_scoring(raw: RawScoring) -> Result<ScoringOutput> {
    let performance = clamp_score("performance", raw.performance)?;
    let acceptance = clamp_score("acceptance", raw.acceptance)?;
    let tier = Tier::parse(&raw.tier)?;

    let mut rationale: Vec<String> = raw
        .rationale
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if rationale.len() < MIN_RATIONALE {
        return Err(ScoutrError::Contract(format!(
            "rationale needs at least {} entries, got {}",
            MIN_RATIONALE,
            rationale.len()
        )));
    }
    rationale.truncate(MAX_RATIONALE);

    let mut scores = BTreeMap::new();
    for (name, value) in raw.features {
        scores.insert(name, finite("feature", value)?.clamp(0.0, 1.0));
    }

    Ok(ScoringOutput {
        performance,
        acceptance,
        tier,
        rationale,
        features: FeatureMap {
            sport_weights: normalize_weights(&raw.sport_weights)?,
            scores,
        },
    })
}

pub fn validate_draft(raw: RawDraft) -> Result<DraftOutput> {
    let draft = DraftOutput {
        dm_text: raw.dm.trim().to_string(),
        email_subject: raw.email_subject.trim().to_string(),
        email_body: raw.email_body.trim().to_string(),
    };
    for (field, value) in [
        ("dm", &draft.dm_text),
        ("email_subject", &draft.email_subject),
        ("email_body", &draft.email_body),
    ] {
        if value.is_empty() {
            return Err(ScoutrError::Contract(format!("draft field {} is empty", field)));
        }
    }
    Ok(draft)
}

/// Hex SHA-256 of the canonical JSON form of a scoring input.
pub fn scoring_input_hash(input: &ScoringInput) -> Result<String> {
    let canonical = serde_json::to_string(input)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Pull the JSON object out of a model reply, tolerating prose or code fences around it.
pub fn extract_json(text: &str) -> Result<Value> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(serde_json::from_str(&text[start..=end])
            .map_err(|e| ScoutrError::Contract(format!("reply is not valid JSON: {}", e)))?),
        _ => Err(ScoutrError::Contract("reply contains no JSON object".into())),
    }
}
