//! Operator-triggered test post.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::domain::{ActionMeta, ActionStatus, ActionType, NewAction};
use crate::error::Result;
use crate::platforms::SocialPlatform;
use crate::store::Store;

/// What happened to a test post request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestPostOutcome {
    Posted { post_id: Option<String> },
    /// The same text was already posted (or is in flight)
    AlreadyPosted,
    DryRun,
}

/// Ledger key for a test post: hex SHA-256 of its text.
pub fn test_post_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub(super) async fn publish(
    store: &Store,
    social: &dyn SocialPlatform,
    text: &str,
    dry_run: bool,
    retry_errored_after: Option<Duration>,
    now: i64,
) -> Result<TestPostOutcome> {
    let key = test_post_key(text);
    let meta = |post_id: Option<String>| ActionMeta::TestPost {
        post_id,
        text_len: text.chars().count(),
    };

    if dry_run {
        log::info!("Dry run: would publish test post {}", &key[..12]);
        store.record_action(&NewAction::new(None, ActionStatus::DryRun, &key, meta(None)), now)?;
        return Ok(TestPostOutcome::DryRun);
    }

    if !store.reserve_at(ActionType::TestPost, &key, retry_errored_after, now)? {
        log::info!("Test post {} already handled", &key[..12]);
        return Ok(TestPostOutcome::AlreadyPosted);
    }

    match social.create_post(text).await {
        Ok(sent) => {
            store.mark_done(ActionType::TestPost, &key)?;
            store.record_action(
                &NewAction::new(None, ActionStatus::Done, &key, meta(sent.id.clone())),
                now,
            )?;
            log::info!("Published test post {:?}", sent.id);
            Ok(TestPostOutcome::Posted { post_id: sent.id })
        }
        Err(e) => {
            log::warn!("Test post {} failed: {}", &key[..12], e);
            if let Err(mark_err) = store.mark_error_at(ActionType::TestPost, &key, &e.to_string(), now) {
                log::warn!("Could not mark test post {} as errored: {}", &key[..12], mark_err);
            }
            let action = NewAction::new(None, ActionStatus::Error, &key, meta(None));
            if let Err(record_err) = store.record_action(&action, now) {
                log::warn!("Could not record failed test post {}: {}", &key[..12], record_err);
            }
            Err(e)
        }
    }
}
