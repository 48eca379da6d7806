//! Queueing: build today's queue once, from scored never-queued candidates.

use crate::domain::{PhaseOutcome, QueueEntry, QueueReason};
use crate::error::Result;
use crate::id::day_seed;
use crate::orchestrator::{BudgetMeter, RunContext};
use crate::queue;

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let empty = PhaseOutcome::Queueing {
        selected: 0,
        value: 0,
        acceptance: 0,
        exploration: 0,
    };
    if !ctx.store.queue_for_day(&ctx.day)?.is_empty() {
        log::debug!("Queue for {} already built", ctx.day);
        return Ok(empty);
    }

    let pool = ctx.store.queueable_candidates()?;
    if pool.is_empty() {
        return Ok(empty);
    }
    let picks = queue::build(&pool, &ctx.settings.queue, day_seed(&ctx.day));

    let entries: Vec<QueueEntry> = picks
        .iter()
        .enumerate()
        .map(|(position, pick)| QueueEntry {
            candidate_id: pick.candidate.candidate_id.clone(),
            queued_day: ctx.day.clone(),
            reason: pick.reason,
            position: position as u32,
        })
        .collect();
    let stored = ctx.store.enqueue(&entries, Some(ctx.run_id))?;
    log::info!("Queued {} of {} candidates for {}", stored, pool.len(), ctx.day);

    let count = |reason: QueueReason| picks.iter().filter(|p| p.reason == reason).count() as u32;
    for entry in &entries {
        meter.touch(entry.candidate_id.clone());
    }

    Ok(PhaseOutcome::Queueing {
        selected: entries.len() as u32,
        value: count(QueueReason::Value),
        acceptance: count(QueueReason::Acceptance),
        exploration: count(QueueReason::Exploration),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateScore, FeatureMap, Platform, Profile, Tier, overall_score};
    use crate::orchestrator::phases::testing::{NOW, context, services, settings};
    use crate::platforms::MockSocial;
    use crate::store::Store;

    fn scored(store: &Store, id: &str, performance: u8, acceptance: u8) {
        let profile = Profile {
            external_id: id.into(),
            handle: id.into(),
            ..Default::default()
        };
        store.record_discovery(Platform::Social, &profile, "q", NOW).unwrap();
        store
            .save_score(&CandidateScore {
                candidate_id: Platform::Social.candidate_id(id),
                performance,
                acceptance,
                overall: overall_score(performance, acceptance),
                tier: Tier::B,
                rationale: vec!["a".into(), "b".into(), "c".into()],
                features: FeatureMap::default(),
                input_hash: "h".into(),
                model: "m".into(),
                scored_at: NOW,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_queue_is_built_once_per_day() {
        let store = Store::open_in_memory().unwrap();
        scored(&store, "1", 80, 70);
        scored(&store, "2", 60, 50);
        let settings = settings();
        let services = services(MockSocial::new());
        let ctx = context(&store, &settings, &services);

        let first = run(&ctx, &mut BudgetMeter::new(0)).await.unwrap();
        assert_eq!(
            first,
            PhaseOutcome::Queueing {
                selected: 2,
                value: 2,
                acceptance: 0,
                exploration: 0
            }
        );
        let queue = store.queue_for_day(&ctx.day).unwrap();
        assert_eq!(queue[0].candidate_id, "x:1");
        assert_eq!(queue[1].position, 1);

        scored(&store, "3", 90, 90);
        let second = run(&ctx, &mut BudgetMeter::new(0)).await.unwrap();
        assert!(matches!(second, PhaseOutcome::Queueing { selected: 0, .. }));
    }

    #[tokio::test]
    async fn test_nothing_scored_builds_nothing() {
        let store = Store::open_in_memory().unwrap();
        let settings = settings();
        let services = services(MockSocial::new());
        let ctx = context(&store, &settings, &services);

        let outcome = run(&ctx, &mut BudgetMeter::new(0)).await.unwrap();
        assert!(matches!(outcome, PhaseOutcome::Queueing { selected: 0, .. }));
        assert!(store.queue_for_day(&ctx.day).unwrap().is_empty());
    }
}
