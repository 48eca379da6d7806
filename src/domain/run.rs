//! Run and phase types.
//!
//! A run moves from `Started` to exactly one terminal status. Phase statistics
//! are a tagged union so the persisted stats blob stays type-checked.

use serde::{Deserialize, Serialize};

use crate::discovery::SelectionDebug;
use crate::error::{Result, ScoutrError};

/// Run status state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Success,
    Error,
    SkippedDisabled,
    SkippedBudget,
}

impl RunStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::SkippedDisabled => "skipped_disabled",
            RunStatus::SkippedBudget => "skipped_budget",
        }
    }

    /// Parse the stored string representation.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "started" => Ok(RunStatus::Started),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            "skipped_disabled" => Ok(RunStatus::SkippedDisabled),
            "skipped_budget" => Ok(RunStatus::SkippedBudget),
            other => Err(ScoutrError::Storage(format!("unknown run status: {}", other))),
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Started)
    }

    /// Whether the process should exit zero for this status.
    pub fn is_clean_exit(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::SkippedDisabled | RunStatus::SkippedBudget
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The phases of a run, in the order they are serviced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Inbound,
    Outbound,
    Discovery,
    Refresh,
    Sampling,
    Scoring,
    Queueing,
    Drafting,
}

impl PhaseKind {
    /// Fixed priority order. Inbound and outbound come first because the
    /// best-effort phases after them are the first to starve.
    pub const ORDER: [PhaseKind; 8] = [
        PhaseKind::Inbound,
        PhaseKind::Outbound,
        PhaseKind::Discovery,
        PhaseKind::Refresh,
        PhaseKind::Sampling,
        PhaseKind::Scoring,
        PhaseKind::Queueing,
        PhaseKind::Drafting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Inbound => "inbound",
            PhaseKind::Outbound => "outbound",
            PhaseKind::Discovery => "discovery",
            PhaseKind::Refresh => "refresh",
            PhaseKind::Sampling => "sampling",
            PhaseKind::Scoring => "scoring",
            PhaseKind::Queueing => "queueing",
            PhaseKind::Drafting => "drafting",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-phase counters, one variant per phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Inbound {
        fetched: u32,
        handled: u32,
        skipped: u32,
        acknowledged: u32,
    },
    Outbound {
        eligible: u32,
        sent: u32,
        skipped: u32,
        failed: u32,
    },
    Discovery {
        queries: Vec<String>,
        posts_read: u32,
        candidates_new: u32,
        candidates_seen: u32,
        selection: SelectionDebug,
    },
    Refresh {
        refreshed: u32,
        failed: u32,
    },
    Sampling {
        candidates: u32,
        posts: u32,
    },
    Scoring {
        scored: u32,
        unchanged: u32,
        failed: u32,
    },
    Queueing {
        selected: u32,
        value: u32,
        acceptance: u32,
        exploration: u32,
    },
    Drafting {
        drafted: u32,
        failed: u32,
    },
}

/// What the orchestrator recorded for one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    /// Reads available when the phase started
    pub allotted: u32,
    /// Reads the phase actually consumed
    pub consumed: u32,
    pub lookups: u32,
    pub outcome: Option<PhaseOutcome>,
    pub error: Option<String>,
    /// External ids / candidate ids the phase acted on
    pub touched: Vec<String>,
}

/// Aggregate statistics persisted on the run record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunStats {
    pub initial_budget: u32,
    pub remaining_budget: u32,
    pub reads_consumed: u32,
    pub lookups_consumed: u32,
    pub phases: Vec<PhaseReport>,
}

impl RunStats {
    /// Phases that raised an error.
    pub fn failed_phases(&self) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(|p| p.error.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trips_through_str() {
        for status in [
            RunStatus::Started,
            RunStatus::Success,
            RunStatus::Error,
            RunStatus::SkippedDisabled,
            RunStatus::SkippedBudget,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(RunStatus::parse("bogus").is_err());
    }

    #[test]
    fn test_run_status_terminal_and_exit() {
        assert!(!RunStatus::Started.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::SkippedBudget.is_clean_exit());
        assert!(RunStatus::SkippedDisabled.is_clean_exit());
        assert!(!RunStatus::Error.is_clean_exit());
    }

    #[test]
    fn test_phase_order_starts_with_inbound_and_ends_with_drafting() {
        assert_eq!(PhaseKind::ORDER[0], PhaseKind::Inbound);
        assert_eq!(PhaseKind::ORDER[1], PhaseKind::Outbound);
        assert_eq!(PhaseKind::ORDER[7], PhaseKind::Drafting);
    }

    #[test]
    fn test_phase_outcome_is_tagged() {
        let outcome = PhaseOutcome::Refresh {
            refreshed: 3,
            failed: 1,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["phase"], "refresh");
        assert_eq!(json["refreshed"], 3);
    }

    #[test]
    fn test_failed_phases() {
        let stats = RunStats {
            phases: vec![
                PhaseReport {
                    phase: PhaseKind::Inbound,
                    allotted: 10,
                    consumed: 2,
                    lookups: 0,
                    outcome: None,
                    error: Some("HTTP 503: unavailable".into()),
                    touched: vec![],
                },
                PhaseReport {
                    phase: PhaseKind::Outbound,
                    allotted: 8,
                    consumed: 0,
                    lookups: 0,
                    outcome: None,
                    error: None,
                    touched: vec![],
                },
            ],
            ..Default::default()
        };
        let failed: Vec<_> = stats.failed_phases().map(|p| p.phase).collect();
        assert_eq!(failed, vec![PhaseKind::Inbound]);
    }
}
