//! Deterministic scorer and drafter for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::contract::{RawDraft, RawScoring, validate_draft, validate_scoring};
use super::{Completion, DraftOutput, Drafter, DraftingInput, Scorer, ScoringInput, ScoringOutput, TokenUsage};
use crate::error::{Result, ScoutrError};

const MOCK_MODEL: &str = "mock-model";

fn usage() -> TokenUsage {
    TokenUsage {
        model: MOCK_MODEL.to_string(),
        input_tokens: 100,
        output_tokens: 20,
        estimated_cost_usd: None,
    }
}

/// Scores every candidate the same unless an answer is scripted for its id.
pub struct MockScorer {
    default: RawScoring,
    scripted: Vec<(String, RawScoring)>,
    fail_ids: Vec<String>,
    calls: AtomicU32,
}

impl Default for MockScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScorer {
    pub fn new() -> Self {
        Self {
            default: RawScoring {
                performance: 70.0,
                acceptance: 60.0,
                tier: "B".into(),
                rationale: vec!["steady results".into(), "engaged audience".into(), "open to brands".into()],
                sport_weights: [("running".to_string(), 1.0)].into_iter().collect(),
                features: Default::default(),
            },
            scripted: Vec::new(),
            fail_ids: Vec::new(),
            calls: AtomicU32::new(0),
        }
    }

    /// Script an answer for one candidate.
    pub fn with_answer(mut self, candidate_id: &str, performance: f64, acceptance: f64, sport: &str) -> Self {
        let mut raw = self.default.clone();
        raw.performance = performance;
        raw.acceptance = acceptance;
        raw.sport_weights = [(sport.to_string(), 1.0)].into_iter().collect();
        self.scripted.push((candidate_id.to_string(), raw));
        self
    }

    /// Fail scoring for one candidate.
    pub fn failing_for(mut self, candidate_id: &str) -> Self {
        self.fail_ids.push(candidate_id.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for MockScorer {
    async fn score(&self, input: &ScoringInput) -> Result<Completion<ScoringOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ids.contains(&input.candidate_id) {
            return Err(ScoutrError::Http {
                status: 500,
                body: "scoring unavailable".into(),
            });
        }
        let raw = self
            .scripted
            .iter()
            .find(|(id, _)| id == &input.candidate_id)
            .map(|(_, raw)| raw.clone())
            .unwrap_or_else(|| self.default.clone());
        Ok(Completion {
            value: validate_scoring(raw)?,
            usage: usage(),
        })
    }

    fn model(&self) -> &str {
        MOCK_MODEL
    }
}

/// Drafts a short templated message per candidate.
#[derive(Default)]
pub struct MockDrafter {
    calls: AtomicU32,
    empty: bool,
}

impl MockDrafter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return drafts with an empty body, which fail validation.
    pub fn returning_empty() -> Self {
        Self {
            calls: AtomicU32::new(0),
            empty: true,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Drafter for MockDrafter {
    async fn draft(&self, input: &DraftingInput) -> Result<Completion<DraftOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let raw = RawDraft {
            dm: format!("Hi {}, we'd love to talk about a partnership.", input.profile.handle),
            email_subject: format!("{} for {}", input.offer, input.profile.handle),
            email_body: if self.empty {
                String::new()
            } else {
                format!("Hello {},\n\n{}", input.profile.display_name, input.offer)
            },
        };
        Ok(Completion {
            value: validate_draft(raw)?,
            usage: usage(),
        })
    }
}
