//! Refresh: re-lookup stale candidate profiles.

use crate::domain::{Candidate, PhaseOutcome, Platform, Profile};
use crate::error::Result;
use crate::id::days_before;
use crate::orchestrator::{BudgetMeter, RunContext};

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let before = days_before(ctx.now, ctx.settings.refresh_after_days);
    let stale = ctx.store.candidates_needing_refresh(
        before,
        ctx.services.forum.is_some(),
        ctx.settings.refresh_batch,
    )?;

    let (mut refreshed, mut failed) = (0u32, 0u32);
    for candidate in stale {
        if !meter.try_charge(1) {
            break;
        }
        meter.record_lookup();

        match lookup(ctx, &candidate).await {
            Ok(profile) => {
                ctx.store.mark_refreshed(&candidate.id, &profile, ctx.now)?;
                meter.touch(candidate.id.clone());
                refreshed += 1;
            }
            Err(e) => {
                log::warn!("Refreshing {} failed: {}", candidate.id, e);
                ctx.store.mark_refresh_attempted(&candidate.id, ctx.now)?;
                failed += 1;
            }
        }
    }

    Ok(PhaseOutcome::Refresh { refreshed, failed })
}

async fn lookup(ctx: &RunContext<'_>, candidate: &Candidate) -> Result<Profile> {
    let external_id = &candidate.profile.external_id;
    match (candidate.platform, &ctx.services.forum) {
        (Platform::Social, _) => ctx.services.social.lookup_user(external_id).await,
        (Platform::Forum, Some(forum)) => forum.lookup_user(external_id).await,
        (Platform::Forum, None) => Ok(candidate.profile.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::phases::testing::{NOW, context, services, settings};
    use crate::platforms::MockSocial;
    use crate::store::Store;

    fn profile(id: &str, followers: u64) -> Profile {
        Profile {
            external_id: id.into(),
            handle: format!("h{}", id),
            followers,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_profiles_are_refreshed() {
        let store = Store::open_in_memory().unwrap();
        let old = days_before(NOW, 30);
        store.record_discovery(Platform::Social, &profile("1", 10), "q", old).unwrap();
        store.record_discovery(Platform::Social, &profile("2", 10), "q", NOW).unwrap();

        let settings = settings();
        let services = services(MockSocial::new().with_user(profile("1", 5000)));
        let ctx = context(&store, &settings, &services);
        let mut meter = BudgetMeter::new(10);

        let outcome = run(&ctx, &mut meter).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Refresh { refreshed: 1, failed: 0 });
        assert_eq!((meter.consumed(), meter.lookups()), (1, 1));

        let candidate = store.candidate("x:1").unwrap().unwrap();
        assert_eq!(candidate.profile.followers, 5000);
        assert_eq!(candidate.refreshed_at, Some(NOW));
    }

    #[tokio::test]
    async fn test_refresh_stops_when_budget_runs_out() {
        let store = Store::open_in_memory().unwrap();
        let old = days_before(NOW, 30);
        for id in ["1", "2", "3"] {
            store.record_discovery(Platform::Social, &profile(id, 1), "q", old).unwrap();
        }
        let settings = settings();
        let services = services(
            MockSocial::new()
                .with_user(profile("1", 2))
                .with_user(profile("2", 2))
                .with_user(profile("3", 2)),
        );
        let ctx = context(&store, &settings, &services);
        let mut meter = BudgetMeter::new(2);

        let outcome = run(&ctx, &mut meter).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Refresh { refreshed: 2, failed: 0 });
        assert!(meter.is_exhausted());
    }

    #[tokio::test]
    async fn test_failed_lookup_still_costs_a_read() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_discovery(Platform::Social, &profile("gone", 1), "q", days_before(NOW, 30))
            .unwrap();
        let settings = settings();
        let services = services(MockSocial::new());
        let ctx = context(&store, &settings, &services);
        let mut meter = BudgetMeter::new(5);

        let outcome = run(&ctx, &mut meter).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Refresh { refreshed: 0, failed: 1 });
        assert_eq!(meter.consumed(), 1);
    }

    #[tokio::test]
    async fn test_failing_lookup_does_not_block_healthy_candidates() {
        let store = Store::open_in_memory().unwrap();
        store
            .record_discovery(Platform::Social, &profile("gone", 1), "q", days_before(NOW, 40))
            .unwrap();
        store
            .record_discovery(Platform::Social, &profile("live", 1), "q", days_before(NOW, 30))
            .unwrap();
        let mut settings = settings();
        settings.refresh_batch = 1;
        let services = services(MockSocial::new().with_user(profile("live", 900)));

        let mut outcomes = Vec::new();
        for run_no in 0..3 {
            let mut ctx = context(&store, &settings, &services);
            ctx.now = NOW + run_no * 60_000;
            outcomes.push(run(&ctx, &mut BudgetMeter::new(5)).await.unwrap());
        }

        assert_eq!(outcomes[0], PhaseOutcome::Refresh { refreshed: 0, failed: 1 });
        assert_eq!(outcomes[1], PhaseOutcome::Refresh { refreshed: 1, failed: 0 });
        assert_eq!(outcomes[2], PhaseOutcome::Refresh { refreshed: 0, failed: 0 });
        let live = store.candidate("x:live").unwrap().unwrap();
        assert_eq!(live.refreshed_at, Some(NOW + 60_000));
        assert_eq!(live.profile.followers, 900);
    }
}
