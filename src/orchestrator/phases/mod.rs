//! Phase implementations, one module per `PhaseKind`.

mod discovery;
mod drafting;
mod inbound;
mod outbound;
mod queueing;
mod refresh;
mod sampling;
mod scoring;

use super::{BudgetMeter, RunContext};
use crate::domain::{PhaseKind, PhaseOutcome};
use crate::error::Result;

/// Recent posts fetched per candidate as scoring input.
pub const SAMPLE_POSTS: u32 = 5;

pub async fn run(phase: PhaseKind, ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    match phase {
        PhaseKind::Inbound => inbound::run(ctx, meter).await,
        PhaseKind::Outbound => outbound::run(ctx, meter).await,
        PhaseKind::Discovery => discovery::run(ctx, meter).await,
        PhaseKind::Refresh => refresh::run(ctx, meter).await,
        PhaseKind::Sampling => sampling::run(ctx, meter).await,
        PhaseKind::Scoring => scoring::run(ctx, meter).await,
        PhaseKind::Queueing => queueing::run(ctx, meter).await,
        PhaseKind::Drafting => drafting::run(ctx, meter).await,
    }
}
