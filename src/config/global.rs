//! Global configuration.
//!
//! Loaded from an explicit path, `.scoutr.yml` or ~/.config/scoutr/scoutr.yml.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryQuery;
use crate::error::{Result, ScoutrError};
use crate::queue::QueuePolicy;

/// Global configuration for Scoutr.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Storage settings.
    pub storage: StorageConfig,

    /// Budgets, caps and per-phase batch sizes.
    pub worker: WorkerConfig,

    /// Daily queue policy.
    pub queue: QueuePolicy,

    /// Social search/posting API.
    pub social: SocialConfig,

    /// Forum API.
    pub forum: ForumConfig,

    /// Scoring and drafting service.
    pub llm: LlmConfig,

    /// Replacement query catalog; built-in catalog when absent.
    pub queries: Option<QueriesConfig>,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .scoutr.yml in current directory
    /// 3. ~/.config/scoutr/scoutr.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_config = PathBuf::from(".scoutr.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .scoutr.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .scoutr.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("scoutr").join("scoutr.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| ScoutrError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.worker.daily_read_cap == 0 {
            return Err(ScoutrError::Config("worker.daily-read-cap must be > 0".into()));
        }
        if self.worker.per_run_read_cap == 0 {
            return Err(ScoutrError::Config("worker.per-run-read-cap must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.worker.epsilon) {
            return Err(ScoutrError::Config("worker.epsilon must be within 0..=1".into()));
        }
        if self.worker.lookback_days == 0 {
            return Err(ScoutrError::Config("worker.lookback-days must be > 0".into()));
        }
        if let Some(queries) = &self.queries
            && (queries.general.is_empty() || queries.niche.is_empty())
        {
            return Err(ScoutrError::Config("queries.general and queries.niche must both be non-empty".into()));
        }
        Ok(())
    }
}

/// Storage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scoutr")
                .join("scoutr.db"),
        }
    }
}

/// Budgets and batch sizes. Overridable per run through the settings row.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// Global enable flag.
    pub enabled: bool,
    /// Reads allowed per UTC day across all runs.
    pub daily_read_cap: u32,
    /// Reads allowed in a single run.
    pub per_run_read_cap: u32,
    /// Outbound DMs allowed per UTC day.
    pub outbound_daily_cap: u32,
    /// Exploration probability for query selection.
    pub epsilon: f64,
    /// Yield lookback window.
    pub lookback_days: u32,
    /// Re-attempt errored actions after this many minutes; never when unset.
    pub retry_errored_after_mins: Option<u64>,
    pub refresh_after_days: u32,
    pub refresh_batch: u32,
    pub sampling_batch: u32,
    pub scoring_batch: u32,
    pub drafting_batch: u32,
    /// Max results requested per search call.
    pub search_page_size: u32,
    /// Inbound acknowledgement text; inbound items are only recorded when unset.
    pub ack_text: Option<String>,
    /// Offer terms passed to the drafting service.
    pub offer: String,
    pub disclaimer: Option<String>,
}

impl WorkerConfig {
    pub fn retry_errored_after(&self) -> Option<Duration> {
        self.retry_errored_after_mins.map(|m| Duration::from_secs(m * 60))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_read_cap: 900,
            per_run_read_cap: 300,
            outbound_daily_cap: 5,
            epsilon: 0.15,
            lookback_days: 14,
            retry_errored_after_mins: None,
            refresh_after_days: 7,
            refresh_batch: 10,
            sampling_batch: 10,
            scoring_batch: 10,
            drafting_batch: 10,
            search_page_size: 50,
            ack_text: None,
            offer: "Paid product partnership".to_string(),
            disclaimer: None,
        }
    }
}

/// Social search/posting API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SocialConfig {
    pub base_url: String,
    /// Minimum delay between the end of one request and the start of the next.
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub timeout_ms: u64,
    /// Environment variable holding a static bearer token.
    pub token_env: String,
    /// Refresh-token grant, used instead of `token_env` when present.
    pub oauth: Option<OAuthConfig>,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.x.com/2".to_string(),
            min_interval_ms: 1_200,
            max_retries: 3,
            timeout_ms: 30_000,
            token_env: "SCOUTR_SOCIAL_TOKEN".to_string(),
            oauth: None,
        }
    }
}

/// Forum API. Disabled unless configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ForumConfig {
    pub enabled: bool,
    pub base_url: String,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub timeout_ms: u64,
    /// The forum API rejects requests without a descriptive user agent.
    pub user_agent: String,
    pub token_env: String,
    pub oauth: Option<OAuthConfig>,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://oauth.reddit.com".to_string(),
            min_interval_ms: 1_600,
            max_retries: 3,
            timeout_ms: 30_000,
            user_agent: format!("scoutr/{}", env!("CARGO_PKG_VERSION")),
            token_env: "SCOUTR_FORUM_TOKEN".to_string(),
            oauth: None,
        }
    }
}

/// OAuth refresh-token grant settings. Secrets are read from the named env vars.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id_env: String,
    pub client_secret_env: String,
    pub refresh_token_env: String,
}

/// Scoring/drafting service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub scoring_model: String,
    pub drafting_model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    /// USD per million input tokens.
    pub input_cost_per_mtok: f64,
    /// USD per million output tokens.
    pub output_cost_per_mtok: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            scoring_model: "claude-sonnet-4-20250514".to_string(),
            drafting_model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 2_048,
            timeout_ms: 120_000,
            input_cost_per_mtok: 3.0,
            output_cost_per_mtok: 15.0,
        }
    }
}

/// Query catalog override.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueriesConfig {
    pub general: Vec<DiscoveryQuery>,
    pub niche: Vec<DiscoveryQuery>,
}

/// Read a secret from the environment.
pub fn secret(env_name: &str) -> Result<String> {
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ScoutrError::Config(format!("{} not set", env_name))),
    }
}
