//! Run orchestrator.
//!
//! One `run` is one pass of the worker: it snapshots settings, checks the
//! daily read budget, then services the phases in `PhaseKind::ORDER`, each
//! with a meter for whatever budget the earlier phases left.

pub mod budget;
mod phases;
mod test_post;

use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::discovery::QueryCatalog;
use crate::domain::{ActionMeta, ActionStatus, ActionType, NewAction, PhaseKind, PhaseReport, RunStats, RunStatus};
use crate::error::Result;
use crate::id::{day_key, now_ms};
use crate::llm::{Drafter, Scorer, TokenUsage};
use crate::platforms::{ForumPlatform, SocialPlatform};
use crate::queue::QueuePolicy;
use crate::settings::RunSettings;
use crate::store::{RunFinish, Store};

pub use budget::BudgetMeter;
pub use test_post::{TestPostOutcome, test_post_key};

/// External collaborators a run talks to.
pub struct Services {
    pub social: Arc<dyn SocialPlatform>,
    /// Forum search and inbox are skipped when unset
    pub forum: Option<Arc<dyn ForumPlatform>>,
    pub scorer: Arc<dyn Scorer>,
    pub drafter: Arc<dyn Drafter>,
    pub catalog: QueryCatalog,
}

/// Read-only view handed to every phase.
pub struct RunContext<'a> {
    pub store: &'a Store,
    pub settings: &'a RunSettings,
    pub services: &'a Services,
    pub run_id: i64,
    pub now: i64,
    pub day: String,
}

impl RunContext<'_> {
    /// Write an audit entry for this run.
    pub fn record(&self, status: ActionStatus, target: &str, meta: ActionMeta) -> Result<i64> {
        self.store
            .record_action(&NewAction::new(Some(self.run_id), status, target, meta), self.now)
    }

    /// Mark a reserved item errored and log the failure. Write failures here
    /// are logged and swallowed so the caller keeps going.
    pub fn record_failure(&self, action: ActionType, target: &str, error: &str, meta: ActionMeta) {
        if let Err(e) = self.store.mark_error_at(action, target, error, self.now) {
            log::warn!("Could not mark {} {} as errored: {}", action, target, e);
        }
        if let Err(e) = self.record(ActionStatus::Error, target, meta) {
            log::warn!("Could not record failed {} {}: {}", action, target, e);
        }
    }

    /// Add a service call's token usage to today's ledger.
    pub fn record_tokens(&self, usage: &TokenUsage) -> Result<()> {
        self.store.add_tokens(
            &self.day,
            &usage.model,
            usage.input_tokens,
            usage.output_tokens,
            usage.estimated_cost_usd.unwrap_or(0.0),
            self.now,
        )
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    /// Absent for skipped runs
    pub stats: Option<RunStats>,
}

pub struct Orchestrator {
    store: Arc<Store>,
    services: Services,
    worker: WorkerConfig,
    queue: QueuePolicy,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>, services: Services, worker: WorkerConfig, queue: QueuePolicy) -> Self {
        Self {
            store,
            services,
            worker,
            queue,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run once against the wall clock.
    pub async fn run(&self, dry_run: bool) -> Result<RunSummary> {
        self.run_at(dry_run, now_ms()).await
    }

    /// Run once at an explicit time.
    ///
    /// Orchestrator-level failures finalize the run as `error` and are
    /// returned; phase failures are recorded and the run carries on.
    pub async fn run_at(&self, dry_run: bool, now: i64) -> Result<RunSummary> {
        let run = self.store.start_run(dry_run, now)?;
        log::info!("Run {} started (dry_run={})", run.id, dry_run);

        match self.execute(run.id, dry_run, now).await {
            Ok(summary) => {
                log::info!("Run {} finished: {}", run.id, summary.status);
                Ok(summary)
            }
            Err(e) => {
                log::error!("Run {} failed: {}", run.id, e);
                let mut finish = RunFinish::bare(RunStatus::Error, now);
                finish.error_message = Some(e.to_string());
                if let Err(finish_err) = self.store.finish_run(run.id, &finish) {
                    log::error!("Could not finalize run {}: {}", run.id, finish_err);
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, run_id: i64, dry_run: bool, now: i64) -> Result<RunSummary> {
        let settings = RunSettings::load(&self.store, &self.worker, &self.queue, dry_run)?;
        if !settings.enabled {
            log::info!("Worker disabled, skipping run {}", run_id);
            return self.skip(run_id, RunStatus::SkippedDisabled, now);
        }

        let day = day_key(now);
        let usage = self.store.usage_for_day(&day)?;
        if usage.reads >= settings.daily_read_cap {
            log::info!(
                "Daily read cap reached ({} of {}), skipping run {}",
                usage.reads,
                settings.daily_read_cap,
                run_id
            );
            return self.skip(run_id, RunStatus::SkippedBudget, now);
        }
        let initial = settings.per_run_read_cap.min(settings.daily_read_cap - usage.reads);
        if initial == 0 {
            log::info!("No read budget for run {}", run_id);
            return self.skip(run_id, RunStatus::SkippedBudget, now);
        }

        let ctx = RunContext {
            store: &self.store,
            settings: &settings,
            services: &self.services,
            run_id,
            now,
            day,
        };

        let mut stats = RunStats {
            initial_budget: initial,
            ..Default::default()
        };
        let mut remaining = initial;
        for phase in PhaseKind::ORDER {
            let report = run_phase(&ctx, phase, remaining).await;
            remaining -= report.consumed;
            stats.reads_consumed += report.consumed;
            stats.lookups_consumed += report.lookups;
            stats.phases.push(report);
        }
        stats.remaining_budget = remaining;

        self.store
            .add_usage(&ctx.day, stats.reads_consumed, stats.lookups_consumed, now)?;
        self.store.finish_run(
            run_id,
            &RunFinish {
                status: RunStatus::Success,
                reads_consumed: stats.reads_consumed,
                lookups_consumed: stats.lookups_consumed,
                stats: Some(stats.clone()),
                error_message: None,
                finished_at: now,
            },
        )?;

        Ok(RunSummary {
            run_id,
            status: RunStatus::Success,
            stats: Some(stats),
        })
    }

    fn skip(&self, run_id: i64, status: RunStatus, now: i64) -> Result<RunSummary> {
        self.store.finish_run(run_id, &RunFinish::bare(status, now))?;
        Ok(RunSummary {
            run_id,
            status,
            stats: None,
        })
    }

    /// Publish an operator test post, at most once per distinct text.
    pub async fn test_post(&self, text: &str, dry_run: bool, now: i64) -> Result<TestPostOutcome> {
        let settings = RunSettings::load(&self.store, &self.worker, &self.queue, dry_run)?;
        test_post::publish(
            &self.store,
            self.services.social.as_ref(),
            text,
            dry_run,
            settings.retry_errored_after,
            now,
        )
        .await
    }
}

async fn run_phase(ctx: &RunContext<'_>, phase: PhaseKind, allotted: u32) -> PhaseReport {
    let mut meter = BudgetMeter::new(allotted);
    log::debug!("Phase {} starting with {} reads", phase, allotted);

    let (outcome, error) = match phases::run(phase, ctx, &mut meter).await {
        Ok(outcome) => (Some(outcome), None),
        Err(e) => {
            log::warn!("Phase {} failed after {} reads: {}", phase, meter.consumed(), e);
            let message = e.to_string();
            let meta = ActionMeta::PhaseFailed {
                phase,
                error: message.clone(),
            };
            if let Err(record_err) = ctx.record(ActionStatus::Error, phase.as_str(), meta) {
                log::warn!("Could not record failure of phase {}: {}", phase, record_err);
            }
            (None, Some(message))
        }
    };

    PhaseReport {
        phase,
        allotted,
        consumed: meter.consumed(),
        lookups: meter.lookups(),
        outcome,
        error,
        touched: meter.into_touched(),
    }
}
