//! Drafting: write outreach copy for today's queued candidates.

use crate::domain::{Draft, PhaseOutcome};
use crate::error::Result;
use crate::llm::DraftingInput;
use crate::orchestrator::{BudgetMeter, RunContext};

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let (mut drafted, mut failed) = (0u32, 0u32);

    for entry in ctx.store.queue_for_day(&ctx.day)? {
        if drafted + failed >= ctx.settings.drafting_batch {
            break;
        }
        if ctx.store.draft(&entry.candidate_id)?.is_some() {
            continue;
        }
        let (Some(candidate), Some(score)) = (
            ctx.store.candidate(&entry.candidate_id)?,
            ctx.store.latest_score(&entry.candidate_id)?,
        ) else {
            continue;
        };

        let input = DraftingInput {
            candidate_id: candidate.id.clone(),
            profile: candidate.profile,
            category: candidate.category,
            tier: score.tier,
            rationale: score.rationale,
            offer: ctx.settings.offer.clone(),
            disclaimer: ctx.settings.disclaimer.clone(),
        };
        match ctx.services.drafter.draft(&input).await {
            Ok(completion) => {
                ctx.record_tokens(&completion.usage)?;
                let output = completion.value;
                ctx.store.save_draft(&Draft {
                    candidate_id: candidate.id.clone(),
                    dm_text: output.dm_text,
                    email_subject: output.email_subject,
                    email_body: output.email_body,
                    created_at: ctx.now,
                })?;
                meter.touch(candidate.id);
                drafted += 1;
            }
            Err(e) => {
                log::warn!("Drafting for {} failed: {}", candidate.id, e);
                failed += 1;
            }
        }
    }

    Ok(PhaseOutcome::Drafting { drafted, failed })
}
