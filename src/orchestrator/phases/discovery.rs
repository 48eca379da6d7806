//! Discovery: pick one general and one niche query, search, upsert authors.

use std::collections::HashSet;

use crate::discovery::{DiscoveryQuery, compute_yield, select};
use crate::domain::{PhaseOutcome, Platform};
use crate::error::Result;
use crate::orchestrator::{BudgetMeter, RunContext};
use crate::platforms::Post;

#[derive(Default)]
struct Tally {
    posts_read: u32,
    candidates_new: u32,
    candidates_seen: u32,
    seen: HashSet<String>,
}

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let settings = ctx.settings;
    let yields = compute_yield(ctx.store, settings.lookback_days, ctx.now)?;
    let selection = select(
        ctx.run_id,
        &ctx.services.catalog,
        &yields,
        settings.lookback_days,
        settings.epsilon,
        ctx.now,
    );
    log::info!(
        "Discovery picked {} ({:?}) and {} ({:?})",
        selection.general().id,
        selection.debug.general.mode,
        selection.niche().id,
        selection.debug.niche.mode
    );

    let mut tally = Tally::default();

    // First query gets the larger half of an odd budget.
    let general_share = meter.remaining().div_ceil(2);
    let max = general_share.min(settings.search_page_size);
    if max > 0 {
        let posts = ctx.services.social.search_posts(&selection.general().query, max).await?;
        take(ctx, meter, Platform::Social, selection.general(), posts, &mut tally)?;
    }

    let max = meter.remaining().min(settings.search_page_size);
    if max > 0 {
        let posts = ctx.services.social.search_posts(&selection.niche().query, max).await?;
        take(ctx, meter, Platform::Social, selection.niche(), posts, &mut tally)?;
    }

    if let Some(forum) = &ctx.services.forum {
        let max = meter.remaining().min(settings.search_page_size);
        if max > 0 {
            let posts = forum.search_posts(&selection.niche().query, max).await?;
            take(ctx, meter, Platform::Forum, selection.niche(), posts, &mut tally)?;
        }
    }

    Ok(PhaseOutcome::Discovery {
        queries: selection.picked.iter().map(|q| q.id.clone()).collect(),
        posts_read: tally.posts_read,
        candidates_new: tally.candidates_new,
        candidates_seen: tally.candidates_seen,
        selection: selection.debug,
    })
}

fn take(
    ctx: &RunContext<'_>,
    meter: &mut BudgetMeter,
    platform: Platform,
    query: &DiscoveryQuery,
    mut posts: Vec<Post>,
    tally: &mut Tally,
) -> Result<()> {
    posts.truncate(meter.charge(posts.len() as u32) as usize);
    tally.posts_read += posts.len() as u32;

    for post in posts {
        if post.author.external_id.is_empty() {
            continue;
        }
        let candidate_id = platform.candidate_id(&post.author.external_id);
        if !tally.seen.insert(candidate_id.clone()) {
            continue;
        }
        if ctx.store.record_discovery(platform, &post.author, &query.id, ctx.now)? {
            tally.candidates_new += 1;
            meter.touch(candidate_id);
        } else {
            tally.candidates_seen += 1;
        }
    }
    Ok(())
}
