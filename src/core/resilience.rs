//! Per-step resilience: timeout racing, bounded retry with backoff, and a
//! circuit breaker shared across concurrent runs.
//!
//! One call to [`run_tool`] performs up to `max_retries + 1` attempts of a
//! single step. Every attempt leaves a trace record; the breaker only sees
//! real failures (simulated timeouts exercise the fallback path without
//! touching its long-lived state).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::data::{DataAccess, DataError};
use crate::domain::{RunContext, TraceRecord, TriageStep};
use crate::redact::mask_value;
use crate::store::RunStore;

use super::simulation::SimulationPlan;
use super::steps::{self, StepOutput};

/// Failures a tool invocation can surface
#[derive(Debug, Error)]
pub enum ToolError {
    /// Per-attempt timeout exceeded
    #[error("tool_timeout")]
    Timeout,

    /// Forced by an injected simulation plan; never counted by the breaker
    #[error("simulated_timeout")]
    SimulatedTimeout,

    /// The step's circuit is open; no attempt was made
    #[error("circuit_open")]
    CircuitOpen,

    /// The result failed its shape check
    #[error("validation_failed: {0}")]
    ValidationFailed(String),

    /// The tool itself reported a failure (or panicked)
    #[error("tool_error: {0}")]
    Tool(String),
}

impl ToolError {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::SimulatedTimeout)
    }
}

impl From<DataError> for ToolError {
    fn from(err: DataError) -> Self {
        ToolError::Tool(err.to_string())
    }
}

/// Per-step breaker state. Reset to zero on any success; opens after the
/// configured number of consecutive non-simulated failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub open_until: Option<Instant>,
}

/// Breaker state for all steps, shared across concurrent runs.
///
/// The key set is the small fixed step enum, so a single mutex around the
/// map sees negligible contention.
#[derive(Debug, Default)]
pub struct BreakerTable {
    states: Mutex<HashMap<TriageStep, CircuitState>>,
}

impl BreakerTable {
    /// Reject immediately if the step's circuit is open. An expired window
    /// resets the failure count before the caller proceeds.
    pub fn check(&self, step: TriageStep) -> Result<(), ToolError> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = states.get_mut(&step) {
            if let Some(open_until) = state.open_until {
                if Instant::now() < open_until {
                    return Err(ToolError::CircuitOpen);
                }
                state.consecutive_failures = 0;
                state.open_until = None;
            }
        }
        Ok(())
    }

    pub fn record_success(&self, step: TriageStep) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.insert(step, CircuitState::default());
    }

    pub fn record_failure(&self, step: TriageStep, threshold: u32, window: Duration) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(step).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= threshold {
            state.open_until = Some(Instant::now() + window);
        }
    }

    /// Snapshot of a step's breaker state
    pub fn state(&self, step: TriageStep) -> CircuitState {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&step)
            .copied()
            .unwrap_or_default()
    }
}

/// Everything one tool invocation needs besides the run context
pub struct ToolContext<'a> {
    pub data: &'a dyn DataAccess,
    pub store: &'a dyn RunStore,
    pub breakers: &'a BreakerTable,
    pub config: &'a EngineConfig,
    pub simulation: &'a SimulationPlan,
}

/// Execute one step with bounded latency and bounded retries.
///
/// On exhaustion the run's fallback flag is set and the last error is
/// surfaced to the pipeline executor.
pub async fn run_tool(
    tc: &ToolContext<'_>,
    ctx: &mut RunContext,
    step: TriageStep,
) -> Result<StepOutput, ToolError> {
    tc.breakers.check(step)?;

    let mut attempt: u32 = 0;
    loop {
        let start = Instant::now();
        let outcome = attempt_once(tc, ctx, step).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let detail = mask_value(
                    serde_json::to_value(&output).unwrap_or(serde_json::Value::Null),
                );
                let trace = TraceRecord {
                    run_id: ctx.run_id,
                    seq: ctx.next_seq(),
                    step,
                    ok: true,
                    duration_ms,
                    detail,
                };
                tc.store
                    .append_trace(&trace)
                    .await
                    .map_err(|e| ToolError::Tool(e.to_string()))?;

                tc.breakers.record_success(step);
                debug!(step = %step, duration_ms, "tool succeeded");
                return Ok(output);
            }
            Err(err) => {
                attempt += 1;
                warn!(step = %step, attempt, error = %err, "tool attempt failed");

                let trace = TraceRecord {
                    run_id: ctx.run_id,
                    seq: ctx.next_seq(),
                    step,
                    ok: false,
                    duration_ms,
                    detail: json!({ "error": err.to_string() }),
                };
                if let Err(store_err) = tc.store.append_trace(&trace).await {
                    error!(step = %step, error = %store_err, "failed to persist failure trace");
                }

                if !err.is_simulated() {
                    tc.breakers.record_failure(
                        step,
                        tc.config.breaker_threshold,
                        tc.config.breaker_window(),
                    );
                }

                if attempt > tc.config.max_retries {
                    ctx.fallback_used = true;
                    error!(step = %step, attempt, error = %err, "tool failed permanently");
                    return Err(err);
                }

                tokio::time::sleep(tc.config.backoff_for(attempt)).await;
            }
        }
    }
}

/// One attempt: simulation check, timeout race, panic containment, and
/// shape validation of the accepted result.
async fn attempt_once(
    tc: &ToolContext<'_>,
    ctx: &mut RunContext,
    step: TriageStep,
) -> Result<StepOutput, ToolError> {
    if tc.simulation.forces_timeout(step) {
        return Err(ToolError::SimulatedTimeout);
    }

    let tool = AssertUnwindSafe(steps::execute(step, ctx, tc.data)).catch_unwind();
    let output = match tokio::time::timeout(tc.config.tool_timeout(), tool).await {
        Err(_elapsed) => return Err(ToolError::Timeout),
        Ok(Err(_panic)) => return Err(ToolError::Tool("tool panicked".to_string())),
        Ok(Ok(result)) => result?,
    };

    steps::validate(step, &output).map_err(ToolError::ValidationFailed)?;
    Ok(output)
}
