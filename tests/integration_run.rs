//! End-to-end run tests
//!
//! Drives the orchestrator against mock platforms, scorer and drafter.

use std::sync::Arc;

use scoutr::config::WorkerConfig;
use scoutr::discovery::QueryCatalog;
use scoutr::domain::{ActionStatus, ActionType, HandledStatus, PhaseKind, Profile, RunStatus, Sample};
use scoutr::id::day_key;
use scoutr::llm::{MockDrafter, MockScorer};
use scoutr::orchestrator::{Orchestrator, Services, TestPostOutcome};
use scoutr::platforms::{MockSocial, Post};
use scoutr::queue::QueuePolicy;
use scoutr::settings::SettingsRow;
use scoutr::store::Store;
use tempfile::TempDir;

const NOW: i64 = 1_760_400_000_000;

fn author(id: &str) -> Profile {
    Profile {
        external_id: id.into(),
        handle: format!("{}_runs", id),
        display_name: format!("Athlete {}", id),
        bio: "marathoner".into(),
        followers: 1_200,
    }
}

/// Mock social where every builtin query finds the same four athletes,
/// each with a short timeline.
fn busy_social() -> MockSocial {
    let catalog = QueryCatalog::builtin();
    let posts: Vec<Post> = ["a1", "a2", "a3", "a4"]
        .iter()
        .map(|id| Post {
            id: format!("p-{}", id),
            text: "long run done".into(),
            author: author(id),
        })
        .collect();

    let mut social = MockSocial::new();
    for query in catalog.general().iter().chain(catalog.niche()) {
        social = social.with_search_results(&query.query, posts.clone());
    }
    for id in ["a1", "a2", "a3", "a4"] {
        let samples = (0..3)
            .map(|i| Sample {
                post_id: format!("{}-s{}", id, i),
                text: format!("session {}", i),
            })
            .collect();
        social = social.with_timeline(id, samples);
    }
    social
}

fn orchestrator(store: Arc<Store>, social: Arc<MockSocial>, worker: WorkerConfig) -> Orchestrator {
    let services = Services {
        social,
        forum: None,
        scorer: Arc::new(MockScorer::new()),
        drafter: Arc::new(MockDrafter::new()),
        catalog: QueryCatalog::builtin(),
    };
    Orchestrator::new(store, services, worker, QueuePolicy::default())
}

#[tokio::test]
async fn test_exhausted_daily_cap_skips_run() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    store.add_usage(&day_key(NOW), 10, 0, NOW - 1).unwrap();
    let social = Arc::new(busy_social());
    let worker = WorkerConfig {
        daily_read_cap: 10,
        ..Default::default()
    };

    let summary = orchestrator(store.clone(), social.clone(), worker)
        .run_at(false, NOW)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::SkippedBudget);
    assert!(summary.stats.is_none());
    assert_eq!(social.calls(), 0);
    let record = store.get_run(summary.run_id).unwrap().unwrap();
    assert_eq!(record.status, RunStatus::SkippedBudget);
    assert_eq!(record.reads_consumed, 0);
}

#[tokio::test]
async fn test_disabled_settings_row_skips_run() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let row = SettingsRow {
        enabled: Some(false),
        ..Default::default()
    };
    store.save_settings_row(&row, NOW - 1).unwrap();
    let social = Arc::new(busy_social());

    let summary = orchestrator(store.clone(), social.clone(), WorkerConfig::default())
        .run_at(false, NOW)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::SkippedDisabled);
    assert!(summary.status.is_clean_exit());
    assert_eq!(social.calls(), 0);
}

#[tokio::test]
async fn test_cold_start_run_fills_queue_and_drafts() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let social = Arc::new(busy_social());
    let summary = orchestrator(store.clone(), social.clone(), WorkerConfig::default())
        .run_at(false, NOW)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    let stats = summary.stats.unwrap();
    assert_eq!(stats.failed_phases().count(), 0);
    assert_eq!(stats.phases.len(), PhaseKind::ORDER.len());

    let day = day_key(NOW);
    let queue = store.queue_for_day(&day).unwrap();
    // All four share one sport, so the per-category cap holds the queue at three.
    assert_eq!(queue.len(), 3);
    for entry in &queue {
        assert!(store.draft(&entry.candidate_id).unwrap().is_some());
    }
    assert!(social.sent_dms().is_empty());
}

#[tokio::test]
async fn test_budget_flows_down_the_phases() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let social = Arc::new(busy_social().with_dm_event("e1", "a1", "hello"));
    let worker = WorkerConfig {
        per_run_read_cap: 9,
        ..Default::default()
    };

    let summary = orchestrator(store.clone(), social, worker)
        .run_at(false, NOW)
        .await
        .unwrap();
    let stats = summary.stats.unwrap();

    assert_eq!(stats.initial_budget, 9);
    let mut expected = stats.initial_budget;
    for report in &stats.phases {
        assert_eq!(report.allotted, expected, "phase {}", report.phase);
        assert!(report.consumed <= report.allotted);
        expected -= report.consumed;
    }
    let total: u32 = stats.phases.iter().map(|p| p.consumed).sum();
    assert!(total <= stats.initial_budget);
    assert_eq!(stats.remaining_budget, stats.initial_budget - total);
    assert_eq!(stats.reads_consumed, total);

    let usage = store.usage_for_day(&day_key(NOW)).unwrap();
    assert_eq!(usage.reads, total);
}

#[tokio::test]
async fn test_failing_phase_does_not_abort_run() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let social = Arc::new(busy_social().failing("list_dm_events"));

    let summary = orchestrator(store.clone(), social, WorkerConfig::default())
        .run_at(false, NOW)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    let stats = summary.stats.unwrap();
    let failed: Vec<PhaseKind> = stats.failed_phases().map(|p| p.phase).collect();
    assert_eq!(failed, vec![PhaseKind::Inbound]);
    let discovery = stats.phases.iter().find(|p| p.phase == PhaseKind::Discovery).unwrap();
    assert!(discovery.outcome.is_some());

    let actions = store.actions_for_run(summary.run_id).unwrap();
    assert!(actions.iter().any(|a| a.kind == "phase_failed" && a.status == "error"));
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let social = Arc::new(busy_social().with_dm_event("e1", "a1", "hello"));
    let worker = WorkerConfig {
        ack_text: Some("Thanks for getting back to us".into()),
        ..Default::default()
    };
    let orchestrator = orchestrator(store.clone(), social.clone(), worker);

    // First run builds and drafts the queue; approve everything before the second.
    orchestrator.run_at(true, NOW).await.unwrap();
    for id in ["x:a1", "x:a2", "x:a3", "x:a4"] {
        store.set_approved(id, true).unwrap();
    }
    let summary = orchestrator.run_at(true, NOW + 60_000).await.unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert!(social.sent_dms().is_empty());
    assert!(store.handled_item(ActionType::DmSend, "x:a2").unwrap().is_none());
    let day = day_key(NOW);
    assert!(store.count_actions(&day, "outbound_dm", ActionStatus::DryRun).unwrap() > 0);
    assert!(store.get_run(summary.run_id).unwrap().unwrap().dry_run);
}

#[tokio::test]
async fn test_approved_queue_is_messaged_once() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let social = Arc::new(busy_social());
    let orchestrator = orchestrator(store.clone(), social.clone(), WorkerConfig::default());

    orchestrator.run_at(false, NOW).await.unwrap();
    for id in ["x:a1", "x:a2", "x:a3", "x:a4"] {
        store.set_approved(id, true).unwrap();
    }
    orchestrator.run_at(false, NOW + 60_000).await.unwrap();
    orchestrator.run_at(false, NOW + 120_000).await.unwrap();

    let sent = social.sent_dms();
    assert_eq!(sent.len(), 3);
    let item = store.handled_item(ActionType::DmSend, "x:a1").unwrap().unwrap();
    assert_eq!(item.status, HandledStatus::Done);
}

#[tokio::test]
async fn test_inbound_reply_is_acknowledged_once_across_runs() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let social = Arc::new(MockSocial::new().with_dm_event("abc123", "fan1", "interested!"));
    let worker = WorkerConfig {
        ack_text: Some("Thanks, we'll reply soon".into()),
        ..Default::default()
    };
    let orchestrator = orchestrator(store.clone(), social.clone(), worker);

    for offset in 0..3 {
        let summary = orchestrator.run_at(false, NOW + offset * 60_000).await.unwrap();
        assert_eq!(summary.status, RunStatus::Success);
    }

    assert_eq!(
        social.sent_dms(),
        vec![("fan1".to_string(), "Thanks, we'll reply soon".to_string())]
    );
    let item = store.handled_item(ActionType::DmEvent, "abc123").unwrap().unwrap();
    assert_eq!(item.status, HandledStatus::Done);
}

#[tokio::test]
async fn test_invalid_settings_row_finalizes_error() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let row = SettingsRow {
        epsilon: Some(3.0),
        ..Default::default()
    };
    store.save_settings_row(&row, NOW - 1).unwrap();
    let social = Arc::new(MockSocial::new());

    let result = orchestrator(store.clone(), social, WorkerConfig::default())
        .run_at(false, NOW)
        .await;

    assert!(result.is_err());
    let run = &store.recent_runs(1).unwrap()[0];
    assert_eq!(run.status, RunStatus::Error);
    assert!(run.error_message.as_deref().unwrap_or_default().contains("epsilon"));
}

#[tokio::test]
async fn test_test_post_is_idempotent_across_restarts() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("scoutr.db");
    let social = Arc::new(MockSocial::new());

    {
        let store = Arc::new(Store::open(&db_path).unwrap());
        let outcome = orchestrator(store, social.clone(), WorkerConfig::default())
            .test_post("hello from scoutr", false, NOW)
            .await
            .unwrap();
        assert!(matches!(outcome, TestPostOutcome::Posted { .. }));
    }

    {
        let store = Arc::new(Store::open(&db_path).unwrap());
        let outcome = orchestrator(store, social.clone(), WorkerConfig::default())
            .test_post("hello from scoutr", false, NOW + 1_000)
            .await
            .unwrap();
        assert_eq!(outcome, TestPostOutcome::AlreadyPosted);
    }

    assert_eq!(social.created_posts(), vec!["hello from scoutr".to_string()]);
}
