//! Side-effecting action types and the audit trail.

use serde::{Deserialize, Serialize};

use crate::domain::PhaseKind;
use crate::error::{Result, ScoutrError};

/// Kind of external action guarded by the reservation ledger.
///
/// Platforms that share an id space get their own action type so keys
/// never collide across platforms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Handling an inbound social DM event
    DmEvent,
    /// Handling an inbound forum message
    ForumMessage,
    /// Outbound DM to a queued candidate
    DmSend,
    /// Operator-triggered test post
    TestPost,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::DmEvent => "dm_event",
            ActionType::ForumMessage => "forum_message",
            ActionType::DmSend => "dm_send",
            ActionType::TestPost => "x_test_post",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reservation ledger row status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HandledStatus {
    Reserved,
    Done,
    Error,
}

impl HandledStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandledStatus::Reserved => "reserved",
            HandledStatus::Done => "done",
            HandledStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "reserved" => Ok(HandledStatus::Reserved),
            "done" => Ok(HandledStatus::Done),
            "error" => Ok(HandledStatus::Error),
            other => Err(ScoutrError::Storage(format!("unknown handled status: {}", other))),
        }
    }
}

/// Reservation ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledItem {
    pub action_type: String,
    pub external_id: String,
    pub status: HandledStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Outcome recorded in the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Done,
    Error,
    Skipped,
    DryRun,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Done => "done",
            ActionStatus::Error => "error",
            ActionStatus::Skipped => "skipped",
            ActionStatus::DryRun => "dry_run",
        }
    }
}

/// Typed metadata per audit entry kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionMeta {
    InboundDm {
        event_id: String,
        sender_id: String,
        acknowledged: bool,
    },
    InboundForum {
        message_id: String,
        author: String,
        acknowledged: bool,
    },
    OutboundDm {
        candidate_id: String,
        message_id: Option<String>,
        chars: usize,
    },
    TestPost {
        post_id: Option<String>,
        text_len: usize,
    },
    PhaseFailed {
        phase: PhaseKind,
        error: String,
    },
    /// Raw platform payload echoed back for debugging
    Echo { payload: serde_json::Value },
}

impl ActionMeta {
    /// Stable kind label stored alongside the record.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionMeta::InboundDm { .. } => "inbound_dm",
            ActionMeta::InboundForum { .. } => "inbound_forum",
            ActionMeta::OutboundDm { .. } => "outbound_dm",
            ActionMeta::TestPost { .. } => "test_post",
            ActionMeta::PhaseFailed { .. } => "phase_failed",
            ActionMeta::Echo { .. } => "echo",
        }
    }
}

/// An audit entry to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub run_id: Option<i64>,
    pub status: ActionStatus,
    pub target: String,
    pub meta: ActionMeta,
}

impl NewAction {
    pub fn new(run_id: Option<i64>, status: ActionStatus, target: impl Into<String>, meta: ActionMeta) -> Self {
        Self {
            run_id,
            status,
            target: target.into(),
            meta,
        }
    }
}

/// A stored audit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub id: i64,
    pub run_id: Option<i64>,
    pub kind: String,
    pub status: String,
    pub target: String,
    pub meta: ActionMeta,
    pub day: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_keys() {
        assert_eq!(ActionType::DmEvent.as_str(), "dm_event");
        assert_eq!(ActionType::DmSend.as_str(), "dm_send");
        assert_eq!(ActionType::ForumMessage.as_str(), "forum_message");
        assert_eq!(ActionType::TestPost.to_string(), "x_test_post");
    }

    #[test]
    fn test_handled_status_parse() {
        assert_eq!(HandledStatus::parse("reserved").unwrap(), HandledStatus::Reserved);
        assert_eq!(HandledStatus::parse("done").unwrap(), HandledStatus::Done);
        assert_eq!(HandledStatus::parse("error").unwrap(), HandledStatus::Error);
        assert!(HandledStatus::parse("pending").is_err());
    }

    #[test]
    fn test_action_meta_serializes_with_tag() {
        let meta = ActionMeta::PhaseFailed {
            phase: PhaseKind::Scoring,
            error: "timeout".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "phase_failed");
        assert_eq!(json["phase"], "scoring");
        assert_eq!(meta.kind(), "phase_failed");

        let back: ActionMeta = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
