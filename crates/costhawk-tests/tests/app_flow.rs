//! Analyze → advise → persist, through the same wiring the CLI uses.

use chrono::{Duration, Utc};
use costhawk_tests::{ScriptedLlm, credentials, instance, memory_app, scripted_advisor, snapshot, volume};
use hawk_advisor::{AdviceSource, MODEL_PRIORITY};
use hawk_cloud::{FixtureData, RegionInventory};
use hawk_proto::{Ec2State, VolumeState};
use hawkctl::{App, CtlError, HawkConfig, cloud_provider};
use std::sync::Arc;

fn make_fixture_data() -> FixtureData {
    let mut data = FixtureData::default();
    data.inventories.insert(
        "us-east-1".to_string(),
        RegionInventory {
            instances: vec![instance("i-parked", "t3.small", Ec2State::Stopped)],
            volumes: vec![volume("vol-free", "gp3", 100, VolumeState::Available)],
            snapshots: vec![snapshot("snap-old", 50, Utc::now() - Duration::days(120))],
            ..Default::default()
        },
    );
    data
}

// ─── Test 1: State survives a restart ─────────────────────────────────────────

#[tokio::test]
async fn test_history_and_credentials_persist_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("account.json");
    std::fs::write(&fixture, serde_json::to_string_pretty(&make_fixture_data()).unwrap()).unwrap();

    let config = HawkConfig {
        state_path: dir.path().join("state"),
        ..HawkConfig::default()
    };

    let first = App::open(config.clone(), cloud_provider(Some(&fixture)).unwrap()).unwrap();
    let out = first.analyze("alice", Some(credentials())).await.unwrap();
    assert_eq!(out.report.total_savings, 27.5);
    assert_eq!(out.advice.source, AdviceSource::Fallback);
    assert!(out.advice.text.contains("Monthly savings: $27.50"));
    assert!(out.history_saved);
    drop(first);

    let second = App::open(config, cloud_provider(Some(&fixture)).unwrap()).unwrap();
    let history = second.history("alice", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].report.total_savings, 27.5);

    // Stored keys are reused when none are passed.
    let again = second.analyze("alice", None).await.unwrap();
    assert_eq!(again.identity.account_id, "000000000000");
    assert_eq!(second.history("alice", 10).await.unwrap().len(), 2);
    assert!(second.history("bob", 10).await.unwrap().is_empty());
}

// ─── Test 2: Model-backed advice and follow-up question ───────────────────────

#[tokio::test]
async fn test_llm_advice_and_question_with_context() {
    let model = MODEL_PRIORITY[0];
    let llm = Arc::new(
        ScriptedLlm::new(&[model]).reply(model, Ok("## 🚨 Critical Issues\nStop `i-parked`.\n".to_string())),
    );
    let cloud = Arc::new(hawk_cloud::FixtureCloud::from_data(make_fixture_data()));
    let app = memory_app(cloud, scripted_advisor(llm.clone()));

    let out = app.analyze("alice", Some(credentials())).await.unwrap();
    assert_eq!(out.advice.source, AdviceSource::Llm);
    assert_eq!(out.advice.model.as_deref(), Some(model));

    let answer = app.ask("alice", "What should I do first?", true).await.unwrap();
    assert_eq!(answer.model, model);
    assert_eq!(answer.text, "## 🚨 Critical Issues\nStop `i-parked`.");
    assert_eq!(llm.calls_to(model), 2);

    assert!(matches!(
        app.ask("alice", "   ", false).await,
        Err(CtlError::Llm(_))
    ));
}

// ─── Test 3: Missing fixture file ─────────────────────────────────────────────

#[test]
fn test_missing_fixture_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        cloud_provider(Some(&dir.path().join("absent.json"))),
        Err(CtlError::Cloud(_))
    ));
}
