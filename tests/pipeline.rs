//! End-to-end pipeline runs against the demo dataset.

use std::sync::Arc;
use std::time::Duration;

use trisk::core::SimulationPlan;
use trisk::domain::{TriageEvent, TriageEventType, TriageStep};
use trisk::store::RunStore;
use trisk::{EngineConfig, MemoryData, MemoryRunStore, TriageEngine};

fn test_config() -> EngineConfig {
    EngineConfig {
        retry_backoff_ms: vec![1, 1],
        ..Default::default()
    }
}

fn demo_engine(config: EngineConfig) -> (TriageEngine, Arc<MemoryRunStore>) {
    let store = Arc::new(MemoryRunStore::new());
    let engine = TriageEngine::new(config, Arc::new(MemoryData::demo()), store.clone());
    (engine, store)
}

/// Drain a run's stream until the terminal event
async fn collect_events(
    mut rx: tokio::sync::broadcast::Receiver<TriageEvent>,
) -> Vec<TriageEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("run did not terminate in time")
            .expect("stream closed before terminal event");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

#[tokio::test]
async fn test_high_risk_alert_freezes_card() {
    let (engine, store) = demo_engine(test_config());
    let (run_id, rx) = engine
        .start_run_streaming("alert-high", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;

    // plan_built first, with all seven steps
    assert_eq!(events[0].event_type, TriageEventType::PlanBuilt);
    assert_eq!(events[0].detail.as_array().unwrap().len(), 7);

    // exactly one terminal event, and it is last
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);

    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["action"], "freeze_card");
    assert_eq!(decision["otpRequired"], true);
    assert_eq!(decision["note"], "Alert flagged high risk");

    let record = store.load_record(run_id).await.unwrap().unwrap();
    assert_eq!(record.risk, "high");
    assert!(!record.fallback_used);
    assert!(record.ended_at.is_some());
    assert!(record.latency_ms.is_some());

    // one successful trace per step
    let traces = store.replay_traces(run_id).await.unwrap();
    assert_eq!(traces.len(), 7);
    assert!(traces.iter().all(|t| t.ok));
    assert!(traces.windows(2).all(|w| w[0].seq < w[1].seq));
}

#[tokio::test]
async fn test_low_risk_alert_contacts_customer() {
    let (engine, _store) = demo_engine(test_config());
    let (_run_id, rx) = engine
        .start_run_streaming("alert-low", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;
    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["action"], "contact_customer");
    assert_eq!(decision["reason"], "low_alert_review");
}

#[tokio::test]
async fn test_medium_risk_alert_opens_dispute() {
    let (engine, _store) = demo_engine(test_config());
    let (_run_id, rx) = engine
        .start_run_streaming("alert-medium", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;
    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["action"], "open_dispute");
    assert_eq!(decision["reasonCode"], "10.4");
}

#[tokio::test]
async fn test_duplicate_pair_downgrades_risk() {
    let (engine, store) = demo_engine(test_config());
    let (run_id, rx) = engine
        .start_run_streaming("alert-dup", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;
    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["action"], "contact_customer");
    assert_eq!(decision["reason"], "duplicate_pending_capture");

    let record = store.load_record(run_id).await.unwrap().unwrap();
    assert_eq!(record.risk, "low");
    assert!(record
        .reasons
        .contains(&"duplicate_pending_capture".to_string()));
}

#[tokio::test]
async fn test_alert_without_suspect_is_false_positive() {
    let (engine, _store) = demo_engine(test_config());
    let (_run_id, rx) = engine
        .start_run_streaming("alert-ghost", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;
    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["action"], "mark_false_positive");
    assert_eq!(decision["reason"], "no_suspect_transaction");
}

#[tokio::test]
async fn test_simulated_timeout_degrades_without_tripping_breaker() {
    let (engine, store) = demo_engine(test_config());
    let (run_id, rx) = engine
        .start_run_streaming(
            "alert-high",
            SimulationPlan::timeout_on([TriageStep::RiskSignals]),
        )
        .await
        .unwrap();

    let events = collect_events(rx).await;

    let fallback = events
        .iter()
        .find(|e| e.event_type == TriageEventType::FallbackTriggered)
        .expect("expected a fallback event");
    assert_eq!(fallback.detail, "simulated_timeout");

    // The run still terminates with the default decision
    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["action"], "contact_customer");
    assert_eq!(decision["reason"], "fallback");

    let record = store.load_record(run_id).await.unwrap().unwrap();
    assert!(record.fallback_used);

    // Simulated failures never count toward the circuit
    assert_eq!(
        engine
            .breaker_state(TriageStep::RiskSignals)
            .consecutive_failures,
        0
    );
}

#[tokio::test]
async fn test_exhausted_flow_budget_aborts_run() {
    let config = EngineConfig {
        flow_budget_ms: 0,
        ..test_config()
    };
    let (engine, store) = demo_engine(config);
    let (run_id, rx) = engine
        .start_run_streaming("alert-high", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;

    let fallback = events
        .iter()
        .find(|e| e.event_type == TriageEventType::FallbackTriggered)
        .expect("expected a fallback event");
    assert_eq!(fallback.detail, "flow_budget_exceeded");

    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["action"], "contact_customer");
    assert_eq!(decision["reason"], "fallback");

    let record = store.load_record(run_id).await.unwrap().unwrap();
    assert!(record.fallback_used);
    assert_eq!(record.risk, "unknown");
}

#[tokio::test]
async fn test_streamed_payloads_are_masked() {
    let (engine, _store) = demo_engine(test_config());
    let (_run_id, rx) = engine
        .start_run_streaming("alert-high", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;
    let profile_update = events
        .iter()
        .find(|e| e.step == Some(TriageStep::GetProfile))
        .expect("expected a getProfile update");

    assert_eq!(
        profile_update.detail["customer"]["email"],
        "a***@example.com"
    );
}

#[tokio::test]
async fn test_unknown_alert_still_terminates() {
    let (engine, store) = demo_engine(test_config());
    let (run_id, rx) = engine
        .start_run_streaming("alert-nope", SimulationPlan::none())
        .await
        .unwrap();

    let events = collect_events(rx).await;

    // getProfile fails every attempt; the run degrades and finalizes
    let decision = &events.last().unwrap().detail;
    assert_eq!(decision["reason"], "fallback");

    let record = store.load_record(run_id).await.unwrap().unwrap();
    assert!(record.fallback_used);
}

#[tokio::test]
async fn test_pending_record_written_before_pipeline_ends() {
    let store = Arc::new(MemoryRunStore::new());
    let engine = TriageEngine::new(
        test_config(),
        Arc::new(MemoryData::demo()),
        store.clone(),
    );

    let run_id = engine
        .start_run("alert-low", SimulationPlan::none())
        .await
        .unwrap();

    // Visible immediately, before the spawned pipeline finishes
    let record = store.load_record(run_id).await.unwrap().unwrap();
    assert_eq!(record.alert_id, "alert-low");
}
