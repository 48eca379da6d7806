//! Anthropic messages API implementation of `Scorer` and `Drafter`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::contract::{RawDraft, RawScoring, extract_json, validate_draft, validate_scoring};
use super::{Completion, DraftOutput, Drafter, DraftingInput, Scorer, ScoringInput, ScoringOutput, TokenUsage};
use crate::config::{LlmConfig, secret};
use crate::error::{Result, ScoutrError, truncate};
use crate::http::MAX_ERROR_BODY_CHARS;

/// Anthropic API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

const SCORING_SYSTEM: &str = "You evaluate athletes as potential sponsorship partners. \
Reply with a single JSON object and nothing else, with keys: \
performance (0-100, how strong the athlete's sporting results and audience are), \
acceptance (0-100, how likely they are to accept a paid partnership), \
tier (\"A\", \"B\" or \"C\"), rationale (3 to 6 short strings), \
sport_weights (object mapping sport name to weight), \
features (object mapping feature name to a number between 0 and 1).";

const DRAFTING_SYSTEM: &str = "You write first-contact outreach for sponsorship partnerships. \
Reply with a single JSON object and nothing else, with keys: dm (at most 600 characters), \
email_subject, email_body. Be specific to the athlete and honest about the offer.";

/// Configuration for the service
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub scoring_model: String,
    pub drafting_model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub input_cost_per_mtok: f64,
    pub output_cost_per_mtok: f64,
}

impl From<&LlmConfig> for AnthropicConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            scoring_model: config.scoring_model.clone(),
            drafting_model: config.drafting_model.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_millis(config.timeout_ms),
            input_cost_per_mtok: config.input_cost_per_mtok,
            output_cost_per_mtok: config.output_cost_per_mtok,
        }
    }
}

pub struct AnthropicService {
    client: Client,
    api_key: String,
    config: AnthropicConfig,
}

impl AnthropicService {
    /// Create a service, reading the API key from the configured env var
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = secret(&config.api_key_env)?;
        Self::with_api_key(api_key, AnthropicConfig::from(config))
    }

    /// Create a service with an explicit API key
    pub fn with_api_key(api_key: String, config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.config.input_cost_per_mtok + output_tokens as f64 * self.config.output_cost_per_mtok)
            / 1_000_000.0
    }

    /// Send one single-turn request; returns the joined text blocks and usage.
    async fn complete(&self, model: &str, system: &str, user: String) -> Result<(String, TokenUsage)> {
        let body = json!({
            "model": model,
            "max_tokens": self.config.max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}]
        });

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ScoutrError::Http {
                status: status.as_u16(),
                body: truncate(&error_body, MAX_ERROR_BODY_CHARS),
            });
        }
        let body: Value = response.json().await?;
        Ok(self.parse_response(model, &body))
    }

    fn parse_response(&self, model: &str, body: &Value) -> (String, TokenUsage) {
        let input_tokens = body["usage"]["input_tokens"].as_u64().unwrap_or(0);
        let output_tokens = body["usage"]["output_tokens"].as_u64().unwrap_or(0);

        let mut content = String::new();
        if let Some(blocks) = body["content"].as_array() {
            for block in blocks {
                if block["type"].as_str() == Some("text")
                    && let Some(text) = block["text"].as_str()
                {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(text);
                }
            }
        }

        let usage = TokenUsage {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            estimated_cost_usd: Some(self.cost(input_tokens, output_tokens)),
        };
        (content, usage)
    }
}

#[async_trait]
impl Scorer for AnthropicService {
    async fn score(&self, input: &ScoringInput) -> Result<Completion<ScoringOutput>> {
        let prompt = format!("Candidate:\n{}", serde_json::to_string_pretty(input)?);
        let (text, usage) = self.complete(&self.config.scoring_model, SCORING_SYSTEM, prompt).await?;
        let raw: RawScoring = serde_json::from_value(extract_json(&text)?)
            .map_err(|e| ScoutrError::Contract(format!("scoring reply has wrong shape: {}", e)))?;
        Ok(Completion {
            value: validate_scoring(raw)?,
            usage,
        })
    }

    fn model(&self) -> &str {
        &self.config.scoring_model
    }
}

#[async_trait]
impl Drafter for AnthropicService {
    async fn draft(&self, input: &DraftingInput) -> Result<Completion<DraftOutput>> {
        let prompt = format!("Outreach brief:\n{}", serde_json::to_string_pretty(input)?);
        let (text, usage) = self.complete(&self.config.drafting_model, DRAFTING_SYSTEM, prompt).await?;
        let raw: RawDraft = serde_json::from_value(extract_json(&text)?)
            .map_err(|e| ScoutrError::Contract(format!("draft reply has wrong shape: {}", e)))?;
        Ok(Completion {
            value: validate_draft(raw)?,
            usage,
        })
    }
}

impl std::fmt::Debug for AnthropicService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicService")
            .field("scoring_model", &self.config.scoring_model)
            .field("drafting_model", &self.config.drafting_model)
            .field("max_tokens", &self.config.max_tokens)
            .finish()
    }
}
