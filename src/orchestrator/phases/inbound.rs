//! Inbound: read DMs and forum messages, note who replied, acknowledge.
//!
//! Every inbound item passes through the reservation ledger, so a message is
//! handled (and acknowledged) at most once no matter how many runs see it.

use crate::domain::{ActionMeta, ActionStatus, ActionType, PhaseOutcome, Platform};
use crate::error::{Result, ScoutrError};
use crate::orchestrator::{BudgetMeter, RunContext};
use crate::platforms::InboundMessage;

#[derive(Default)]
struct Counts {
    fetched: u32,
    handled: u32,
    skipped: u32,
    acknowledged: u32,
}

pub async fn run(ctx: &RunContext<'_>, meter: &mut BudgetMeter) -> Result<PhaseOutcome> {
    let mut counts = Counts::default();

    let mut events = ctx.services.social.list_dm_events(meter.remaining()).await?;
    events.truncate(meter.charge(events.len() as u32) as usize);
    counts.fetched += events.len() as u32;
    for event in &events {
        handle(ctx, meter, Channel::Social, event, &mut counts).await?;
    }

    if let Some(forum) = &ctx.services.forum
        && !meter.is_exhausted()
    {
        let mut messages = forum.list_inbox(meter.remaining()).await?;
        messages.truncate(meter.charge(messages.len() as u32) as usize);
        counts.fetched += messages.len() as u32;
        for message in &messages {
            handle(ctx, meter, Channel::Forum, message, &mut counts).await?;
        }
    }

    Ok(PhaseOutcome::Inbound {
        fetched: counts.fetched,
        handled: counts.handled,
        skipped: counts.skipped,
        acknowledged: counts.acknowledged,
    })
}

#[derive(Clone, Copy)]
enum Channel {
    Social,
    Forum,
}

impl Channel {
    fn action(self) -> ActionType {
        match self {
            Channel::Social => ActionType::DmEvent,
            Channel::Forum => ActionType::ForumMessage,
        }
    }

    fn platform(self) -> Platform {
        match self {
            Channel::Social => Platform::Social,
            Channel::Forum => Platform::Forum,
        }
    }

    fn meta(self, message: &InboundMessage, acknowledged: bool) -> ActionMeta {
        match self {
            Channel::Social => ActionMeta::InboundDm {
                event_id: message.id.clone(),
                sender_id: message.sender_id.clone(),
                acknowledged,
            },
            Channel::Forum => ActionMeta::InboundForum {
                message_id: message.id.clone(),
                author: message.sender_id.clone(),
                acknowledged,
            },
        }
    }
}

async fn handle(
    ctx: &RunContext<'_>,
    meter: &mut BudgetMeter,
    channel: Channel,
    message: &InboundMessage,
    counts: &mut Counts,
) -> Result<()> {
    let action = channel.action();
    if !ctx
        .store
        .reserve_at(action, &message.id, ctx.settings.retry_errored_after, ctx.now)?
    {
        log::debug!("{} {} already handled", action, message.id);
        counts.skipped += 1;
        return Ok(());
    }

    let candidate_id = channel.platform().candidate_id(&message.sender_id);
    if ctx.store.mark_replied(&candidate_id, ctx.now)? {
        log::info!("Candidate {} replied", candidate_id);
    }

    let mut acknowledged = false;
    if let Some(ack) = &ctx.settings.ack_text
        && !ctx.settings.dry_run
    {
        let sent = match channel {
            Channel::Social => ctx.services.social.send_dm(&message.sender_id, ack).await,
            Channel::Forum => {
                let forum = ctx
                    .services
                    .forum
                    .as_ref()
                    .ok_or_else(|| ScoutrError::InvalidState("forum message without a forum client".into()))?;
                forum.reply(&message.id, ack).await
            }
        };
        if let Err(e) = sent {
            log::warn!("Acknowledging {} {} failed: {}", action, message.id, e);
            ctx.record_failure(action, &message.id, &e.to_string(), channel.meta(message, false));
            return Ok(());
        }
        acknowledged = true;
        counts.acknowledged += 1;
    }

    ctx.store.mark_done(action, &message.id)?;
    let status = if ctx.settings.dry_run {
        ActionStatus::DryRun
    } else {
        ActionStatus::Done
    };
    ctx.record(status, &message.id, channel.meta(message, acknowledged))?;
    meter.touch(message.id.clone());
    counts.handled += 1;
    Ok(())
}
