//! The per-run pipeline executor.
//!
//! Walks the plan in order, checking the flow budget before each step and
//! delegating each step to the resilience wrapper. Any unrecoverable step
//! failure degrades the run: remaining steps are skipped and the default
//! decision is finalized. Exactly one terminal event is published per run.

use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::domain::{Plan, RecommendedAction, RunContext, RunRecord, TriageEvent};
use crate::redact::mask_value;

use super::engine::EngineInner;
use super::resilience::{self, ToolContext};
use super::simulation::SimulationPlan;

/// Detail string published when the flow budget aborts a run
pub(crate) const FLOW_BUDGET_EXCEEDED: &str = "flow_budget_exceeded";

#[instrument(
    skip_all,
    fields(run_id = %record.run_id, alert_id = %record.alert_id)
)]
pub(crate) async fn execute(
    env: &EngineInner,
    mut record: RunRecord,
    plan: Plan,
    simulation: SimulationPlan,
) {
    let started = Instant::now();
    let run_id = record.run_id;
    let mut ctx = RunContext::new(run_id, record.alert_id.clone());

    info!(steps = plan.len(), "starting triage run");
    env.bus.publish(run_id, TriageEvent::plan_built(&plan));

    let tc = ToolContext {
        data: env.data.as_ref(),
        store: env.store.as_ref(),
        breakers: &env.breakers,
        config: &env.config,
        simulation: &simulation,
    };

    for step in &plan {
        if started.elapsed() > env.config.flow_budget() {
            ctx.fallback_used = true;
            warn!(step = %step, "flow budget exceeded, skipping remaining steps");
            env.bus
                .publish(run_id, TriageEvent::fallback_triggered(FLOW_BUDGET_EXCEEDED));
            break;
        }

        match resilience::run_tool(&tc, &mut ctx, *step).await {
            Ok(output) => {
                let detail =
                    mask_value(serde_json::to_value(&output).unwrap_or(Value::Null));
                env.bus
                    .publish(run_id, TriageEvent::tool_update(*step, detail));
            }
            Err(err) => {
                ctx.fallback_used = true;
                error!(step = %step, error = %err, "step failed, skipping remaining steps");
                env.bus
                    .publish(run_id, TriageEvent::fallback_triggered(err.to_string()));
                break;
            }
        }
    }

    let decision = ctx
        .decision
        .clone()
        .unwrap_or_else(RecommendedAction::fallback);
    env.bus
        .publish(run_id, TriageEvent::decision_finalized(&decision));

    record.ended_at = Some(Utc::now());
    record.latency_ms = Some(started.elapsed().as_millis() as u64);
    record.fallback_used = ctx.fallback_used;
    record.risk = ctx
        .risk
        .as_ref()
        .map(|r| r.level.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    record.reasons = ctx.risk.as_ref().map(|r| r.reasons.clone()).unwrap_or_default();

    if let Err(err) = env.store.write_record(&record).await {
        error!(error = %err, "failed to write run record");
    }

    info!(
        decision = decision.action_name(),
        fallback = ctx.fallback_used,
        latency_ms = record.latency_ms,
        "triage run finished"
    );
}
