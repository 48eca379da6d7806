//! Outbound: DM today's approved, drafted queue entries up to the daily cap.

use crate::domain::{ActionMeta, ActionStatus, ActionType, PhaseOutcome, Platform};
use crate::error::Result;
use crate::orchestrator::{BudgetMeter, RunContext};

const OUTBOUND_KIND: &str = "outbound_dm";

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let sent_today = ctx.store.count_actions(&ctx.day, OUTBOUND_KIND, ActionStatus::Done)?;
    let cap = ctx.settings.outbound_daily_cap.saturating_sub(sent_today);

    let (mut eligible, mut sent, mut skipped, mut failed) = (0u32, 0u32, 0u32, 0u32);
    let mut attempts = 0u32;

    for entry in ctx.store.queue_for_day(&ctx.day)? {
        if attempts >= cap {
            break;
        }
        let Some(candidate) = ctx.store.candidate(&entry.candidate_id)? else {
            continue;
        };
        if !candidate.approved || candidate.replied_at.is_some() || candidate.platform != Platform::Social {
            continue;
        }
        let Some(draft) = ctx.store.draft(&candidate.id)? else {
            continue;
        };
        eligible += 1;
        attempts += 1;

        if ctx.settings.dry_run {
            log::info!("Dry run: would DM {}", candidate.id);
            let meta = ActionMeta::OutboundDm {
                candidate_id: candidate.id.clone(),
                message_id: None,
                chars: draft.dm_text.chars().count(),
            };
            ctx.record(ActionStatus::DryRun, &candidate.id, meta)?;
            skipped += 1;
            continue;
        }

        if !ctx
            .store
            .reserve_at(ActionType::DmSend, &candidate.id, ctx.settings.retry_errored_after, ctx.now)?
        {
            log::debug!("DM to {} already handled", candidate.id);
            skipped += 1;
            continue;
        }

        match ctx
            .services
            .social
            .send_dm(&candidate.profile.external_id, &draft.dm_text)
            .await
        {
            Ok(receipt) => {
                ctx.store.mark_done(ActionType::DmSend, &candidate.id)?;
                let meta = ActionMeta::OutboundDm {
                    candidate_id: candidate.id.clone(),
                    message_id: receipt.id,
                    chars: draft.dm_text.chars().count(),
                };
                ctx.record(ActionStatus::Done, &candidate.id, meta)?;
                meter.touch(candidate.id.clone());
                sent += 1;
            }
            Err(e) => {
                log::warn!("DM to {} failed: {}", candidate.id, e);
                let meta = ActionMeta::OutboundDm {
                    candidate_id: candidate.id.clone(),
                    message_id: None,
                    chars: draft.dm_text.chars().count(),
                };
                ctx.record_failure(ActionType::DmSend, &candidate.id, &e.to_string(), meta);
                failed += 1;
            }
        }
    }

    Ok(PhaseOutcome::Outbound {
        eligible,
        sent,
        skipped,
        failed,
    })
}
