use clap::Parser;
use colored::*;
use eyre::{Context, Result, WrapErr, eyre};
use log::info;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod cli;

use cli::Cli;
use scoutr::config::{ForumConfig, GlobalConfig, OAuthConfig, SocialConfig, secret};
use scoutr::discovery::QueryCatalog;
use scoutr::domain::RunStatus;
use scoutr::http::{ClientConfig, RateLimitedClient, RefreshTokenSource, ResetStyle, StaticToken, TokenSource};
use scoutr::id::now_ms;
use scoutr::llm::AnthropicService;
use scoutr::orchestrator::{Orchestrator, RunSummary, Services, TestPostOutcome};
use scoutr::platforms::{ForumClient, ForumPlatform, SocialClient};
use scoutr::store::Store;

/// Log sink that writes every record to the log file and, in verbose mode, to stderr too.
struct Tee {
    file: fs::File,
    mirror: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mirror {
            io::stderr().write_all(buf)?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scoutr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("scoutr.log");

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .context("Failed to open log file")?;
    let target = Box::new(Tee { file, mirror: verbose });

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn bearer(token_env: &str, oauth: Option<&OAuthConfig>, user_agent: Option<&str>) -> Result<Arc<dyn TokenSource>> {
    match oauth {
        Some(oauth) => {
            let mut source = RefreshTokenSource::new(
                &oauth.token_url,
                secret(&oauth.client_id_env)?,
                secret(&oauth.client_secret_env)?,
                secret(&oauth.refresh_token_env)?,
            )?;
            if let Some(user_agent) = user_agent {
                source = source.with_user_agent(user_agent);
            }
            Ok(Arc::new(source))
        }
        None => Ok(Arc::new(StaticToken::new(secret(token_env)?))),
    }
}

fn social_client(config: &SocialConfig) -> Result<SocialClient> {
    let mut client_config = ClientConfig::new(&config.base_url, ResetStyle::Epoch);
    client_config.min_interval = Duration::from_millis(config.min_interval_ms);
    client_config.max_retries = config.max_retries;
    client_config.timeout = Duration::from_millis(config.timeout_ms);

    let token = bearer(&config.token_env, config.oauth.as_ref(), None).context("Social credentials")?;
    let client = RateLimitedClient::new(client_config)?.with_bearer(token);
    Ok(SocialClient::new(client))
}

fn forum_client(config: &ForumConfig) -> Result<Option<Arc<dyn ForumPlatform>>> {
    if !config.enabled {
        return Ok(None);
    }
    let mut client_config = ClientConfig::new(&config.base_url, ResetStyle::Delta);
    client_config.min_interval = Duration::from_millis(config.min_interval_ms);
    client_config.max_retries = config.max_retries;
    client_config.timeout = Duration::from_millis(config.timeout_ms);
    client_config.user_agent = Some(config.user_agent.clone());

    let token = bearer(&config.token_env, config.oauth.as_ref(), Some(&config.user_agent))
        .context("Forum credentials")?;
    let client = RateLimitedClient::new(client_config)?.with_bearer(token);
    Ok(Some(Arc::new(ForumClient::new(client))))
}

fn build_orchestrator(config: &GlobalConfig) -> Result<Orchestrator> {
    if let Some(parent) = config.storage.db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create data directory")?;
    }
    let store = Store::open(&config.storage.db_path)
        .wrap_err_with(|| format!("Failed to open database {}", config.storage.db_path.display()))?;

    let llm = Arc::new(AnthropicService::from_config(&config.llm).context("Scoring service")?);
    let services = Services {
        social: Arc::new(social_client(&config.social)?),
        forum: forum_client(&config.forum)?,
        scorer: llm.clone(),
        drafter: llm,
        catalog: QueryCatalog::from_config(config.queries.as_ref())?,
    };

    Ok(Orchestrator::new(
        Arc::new(store),
        services,
        config.worker.clone(),
        config.queue.clone(),
    ))
}

fn print_summary(summary: &RunSummary) {
    let status = match summary.status {
        RunStatus::Success => summary.status.to_string().green(),
        RunStatus::SkippedDisabled | RunStatus::SkippedBudget => summary.status.to_string().yellow(),
        RunStatus::Started | RunStatus::Error => summary.status.to_string().red(),
    };
    match &summary.stats {
        Some(stats) => {
            let failed: Vec<&str> = stats.failed_phases().map(|p| p.phase.as_str()).collect();
            let failed = if failed.is_empty() {
                String::new()
            } else {
                format!(" failed: {}", failed.join(",")).red().to_string()
            };
            println!(
                "run {} {} reads {}/{} lookups {}{}",
                summary.run_id,
                status,
                stats.reads_consumed,
                stats.initial_budget,
                stats.lookups_consumed,
                failed
            );
        }
        None => println!("run {} {}", summary.run_id, status),
    }
}

async fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<bool> {
    info!("Starting application");

    let orchestrator = build_orchestrator(config)?;

    if let Some(text) = &cli.test_post {
        let outcome = orchestrator
            .test_post(text, cli.dry_run, now_ms())
            .await
            .context("Test post failed")?;
        match outcome {
            TestPostOutcome::Posted { post_id } => {
                println!("{} {}", "posted".green(), post_id.unwrap_or_default())
            }
            TestPostOutcome::AlreadyPosted => println!("{}", "already posted".yellow()),
            TestPostOutcome::DryRun => println!("{}", "dry run: nothing posted".yellow()),
        }
        return Ok(true);
    }

    let summary = orchestrator.run(cli.dry_run).await.context("Run failed")?;
    print_summary(&summary);
    Ok(summary.status.is_clean_exit())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging first
    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    // Load configuration
    let config = GlobalConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    if !run_application(&cli, &config).await.context("Application failed")? {
        return Err(eyre!("run did not finish cleanly"));
    }

    Ok(())
}
