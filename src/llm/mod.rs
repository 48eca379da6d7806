//! Scoring and drafting services.
//!
//! This module provides:
//! - `Scorer` and `Drafter` traits the orchestrator depends on
//! - Contract validation for service answers
//! - `AnthropicService`, the messages-API implementation of both
//! - Mocks for tests

pub mod anthropic;
pub mod contract;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{FeatureMap, Profile, Sample, Tier};
use crate::error::Result;

pub use anthropic::{AnthropicConfig, AnthropicService};
pub use contract::{scoring_input_hash, validate_draft, validate_scoring};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockDrafter, MockScorer};

/// Everything the scorer sees about a candidate. Its JSON form is hashed
/// to detect unchanged input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringInput {
    pub candidate_id: String,
    pub profile: Profile,
    pub samples: Vec<Sample>,
}

/// Validated scoring answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOutput {
    pub performance: u8,
    pub acceptance: u8,
    pub tier: Tier,
    pub rationale: Vec<String>,
    pub features: FeatureMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftingInput {
    pub candidate_id: String,
    pub profile: Profile,
    pub category: Option<String>,
    pub tier: Tier,
    pub rationale: Vec<String>,
    pub offer: String,
    pub disclaimer: Option<String>,
}

/// Validated draft.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftOutput {
    pub dm_text: String,
    pub email_subject: String,
    pub email_body: String,
}

/// Token accounting for one service call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenUsage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: Option<f64>,
}

/// A service answer plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    pub value: T,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, input: &ScoringInput) -> Result<Completion<ScoringOutput>>;

    /// Model name recorded with each score.
    fn model(&self) -> &str;
}

#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft(&self, input: &DraftingInput) -> Result<Completion<DraftOutput>>;
}
