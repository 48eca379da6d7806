//! Domain types for Scoutr
//!
//! This module contains all core domain types:
//! - Run: run status, phase kinds and the per-phase statistics union
//! - Action: reservation ledger keys and the typed audit trail
//! - Candidate: discovered accounts, scores, queue entries and drafts

pub mod action;
pub mod candidate;
pub mod run;

pub use action::{ActionMeta, ActionRecord, ActionStatus, ActionType, HandledItem, HandledStatus, NewAction};
pub use candidate::{
    Attribution, Candidate, CandidateScore, Draft, FeatureMap, Platform, Profile, QueueEntry, QueueReason,
    Sample, ScoredCandidate, Tier, overall_score,
};
pub use run::{PhaseKind, PhaseOutcome, PhaseReport, RunStats, RunStatus};
