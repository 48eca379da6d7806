//! Sampling: fetch a few recent posts per candidate as scoring input.

use super::SAMPLE_POSTS;
use crate::domain::{PhaseOutcome, Platform};
use crate::error::Result;
use crate::id::days_before;
use crate::orchestrator::{BudgetMeter, RunContext};

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let retry_before = days_before(ctx.now, ctx.settings.refresh_after_days);
    let pending = ctx.store.candidates_without_samples(
        retry_before,
        ctx.services.forum.is_some(),
        ctx.settings.sampling_batch,
    )?;

    let (mut candidates, mut posts) = (0u32, 0u32);
    for candidate in pending {
        if meter.is_exhausted() {
            break;
        }
        let max = SAMPLE_POSTS.min(meter.remaining());
        let external_id = &candidate.profile.external_id;
        let fetched = match (candidate.platform, &ctx.services.forum) {
            (Platform::Social, _) => ctx.services.social.recent_posts(external_id, max).await,
            (Platform::Forum, Some(forum)) => forum.recent_posts(external_id, max).await,
            (Platform::Forum, None) => continue,
        };
        let mut samples = match fetched {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("Sampling {} failed: {}", candidate.id, e);
                ctx.store.mark_sample_attempted(&candidate.id, ctx.now)?;
                continue;
            }
        };
        if samples.is_empty() {
            log::debug!("No recent posts for {}", candidate.id);
            ctx.store.mark_sample_attempted(&candidate.id, ctx.now)?;
            continue;
        }
        samples.truncate(meter.charge(samples.len() as u32) as usize);
        if samples.is_empty() {
            break;
        }

        ctx.store.save_samples(&candidate.id, &samples)?;
        posts += samples.len() as u32;
        candidates += 1;
        meter.touch(candidate.id.clone());
    }

    Ok(PhaseOutcome::Sampling { candidates, posts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Profile, Sample};
    use crate::orchestrator::phases::testing::{NOW, context, services, settings};
    use crate::platforms::MockSocial;
    use crate::store::Store;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                post_id: format!("s{}", i),
                text: format!("training log {}", i),
            })
            .collect()
    }

    fn discover(store: &Store, id: &str) {
        let profile = Profile {
            external_id: id.into(),
            handle: id.into(),
            ..Default::default()
        };
        store.record_discovery(Platform::Social, &profile, "q", NOW).unwrap();
    }

    #[tokio::test]
    async fn test_samples_are_capped_at_five() {
        let store = Store::open_in_memory().unwrap();
        discover(&store, "1");
        let settings = settings();
        let services = services(MockSocial::new().with_timeline("1", samples(8)));
        let ctx = context(&store, &settings, &services);
        let mut meter = BudgetMeter::new(20);

        let outcome = run(&ctx, &mut meter).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Sampling { candidates: 1, posts: 5 });
        assert_eq!(store.samples("x:1").unwrap().len(), 5);
        assert_eq!(meter.consumed(), 5);
    }

    #[tokio::test]
    async fn test_reads_are_charged_per_post_returned() {
        let store = Store::open_in_memory().unwrap();
        discover(&store, "1");
        discover(&store, "2");
        let settings = settings();
        let services = services(
            MockSocial::new()
                .with_timeline("1", samples(2))
                .with_timeline("2", samples(5)),
        );
        let ctx = context(&store, &settings, &services);
        let mut meter = BudgetMeter::new(4);

        let outcome = run(&ctx, &mut meter).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Sampling { candidates: 2, posts: 4 });
        assert!(meter.is_exhausted());
    }

    #[tokio::test]
    async fn test_empty_timeline_stores_nothing() {
        let store = Store::open_in_memory().unwrap();
        discover(&store, "quiet");
        let settings = settings();
        let services = services(MockSocial::new());
        let ctx = context(&store, &settings, &services);

        let outcome = run(&ctx, &mut BudgetMeter::new(10)).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Sampling { candidates: 0, posts: 0 });
        assert!(store.samples("x:quiet").unwrap().is_empty());
        assert!(store.candidates_without_samples(NOW, true, 10).unwrap().is_empty());
        assert_eq!(store.candidates_without_samples(NOW + 1, true, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_timelines_do_not_block_later_candidates() {
        let store = Store::open_in_memory().unwrap();
        discover(&store, "quiet");
        discover(&store, "active");
        let mut settings = settings();
        settings.sampling_batch = 1;
        let services = services(MockSocial::new().with_timeline("active", samples(3)));

        let mut posts = 0;
        for run_no in 0..3 {
            let mut ctx = context(&store, &settings, &services);
            ctx.now = NOW + run_no * 60_000;
            if let PhaseOutcome::Sampling { posts: n, .. } = run(&ctx, &mut BudgetMeter::new(10)).await.unwrap() {
                posts += n;
            }
        }

        assert_eq!(posts, 3);
        assert_eq!(store.samples("x:active").unwrap().len(), 3);
    }
}
