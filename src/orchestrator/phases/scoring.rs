//! Scoring: ask the scorer about candidates whose input changed.

use crate::domain::{CandidateScore, PhaseOutcome, overall_score};
use crate::error::Result;
use crate::llm::{ScoringInput, scoring_input_hash};
use crate::orchestrator::{BudgetMeter, RunContext};

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let scorer = &ctx.services.scorer;
    let (mut scored, mut unchanged, mut failed) = (0u32, 0u32, 0u32);

    for candidate in ctx.store.candidates_for_scoring(ctx.settings.scoring_batch)? {
        let input = ScoringInput {
            candidate_id: candidate.id.clone(),
            profile: candidate.profile.clone(),
            samples: ctx.store.samples(&candidate.id)?,
        };
        let input_hash = scoring_input_hash(&input)?;
        if let Some(latest) = ctx.store.latest_score(&candidate.id)?
            && latest.input_hash == input_hash
        {
            ctx.store.mark_score_current(&candidate.id)?;
            unchanged += 1;
            continue;
        }

        let completion = match scorer.score(&input).await {
            Ok(completion) => completion,
            Err(e) => {
                log::warn!("Scoring {} failed: {}", candidate.id, e);
                ctx.store.mark_score_attempted(&candidate.id, ctx.now)?;
                failed += 1;
                continue;
            }
        };
        ctx.record_tokens(&completion.usage)?;

        let output = completion.value;
        let score = CandidateScore {
            candidate_id: candidate.id.clone(),
            performance: output.performance,
            acceptance: output.acceptance,
            overall: overall_score(output.performance, output.acceptance),
            tier: output.tier,
            rationale: output.rationale,
            features: output.features,
            input_hash,
            model: scorer.model().to_string(),
            scored_at: ctx.now,
        };
        ctx.store.save_score(&score)?;
        if let Some(sport) = score.features.dominant_sport() {
            ctx.store.set_category(&candidate.id, sport)?;
        }
        log::debug!(
            "Scored {}: performance {} acceptance {} overall {}",
            candidate.id,
            score.performance,
            score.acceptance,
            score.overall
        );
        meter.touch(candidate.id.clone());
        scored += 1;
    }

    Ok(PhaseOutcome::Scoring {
        scored,
        unchanged,
        failed,
    })
}
