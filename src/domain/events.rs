//! Lifecycle events emitted while a run is in flight.
//!
//! Events are immutable and strictly ordered per run: one `plan_built`
//! first, `tool_update`/`fallback_triggered` in step order, and exactly one
//! terminal `decision_finalized` last.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::triage::{RecommendedAction, TriageStep};

/// Types of events published on a run's stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageEventType {
    /// The ordered step list, emitted once before the first step
    PlanBuilt,

    /// A step completed and its (masked) result was accepted
    ToolUpdate,

    /// A step could not be completed normally; the run degrades
    FallbackTriggered,

    /// Terminal event carrying the final decision
    DecisionFinalized,
}

/// A single event on a run's stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageEvent {
    #[serde(rename = "type")]
    pub event_type: TriageEventType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<TriageStep>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,

    /// Masked payload: plan list, tool result, error string, or decision
    pub detail: Value,
}

impl TriageEvent {
    pub fn plan_built(plan: &[TriageStep]) -> Self {
        Self {
            event_type: TriageEventType::PlanBuilt,
            step: None,
            ok: None,
            detail: json!(plan),
        }
    }

    pub fn tool_update(step: TriageStep, detail: Value) -> Self {
        Self {
            event_type: TriageEventType::ToolUpdate,
            step: Some(step),
            ok: Some(true),
            detail,
        }
    }

    pub fn fallback_triggered(detail: impl Into<String>) -> Self {
        Self {
            event_type: TriageEventType::FallbackTriggered,
            step: None,
            ok: None,
            detail: json!(detail.into()),
        }
    }

    pub fn decision_finalized(decision: &RecommendedAction) -> Self {
        Self {
            event_type: TriageEventType::DecisionFinalized,
            step: None,
            ok: None,
            detail: serde_json::to_value(decision).unwrap_or(Value::Null),
        }
    }

    /// Terminal events end the stream
    pub fn is_terminal(&self) -> bool {
        self.event_type == TriageEventType::DecisionFinalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = TriageEvent::tool_update(TriageStep::RiskSignals, json!({"score": 35}));

        let json = serde_json::to_string(&event).unwrap();
        let parsed: TriageEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, TriageEventType::ToolUpdate);
        assert_eq!(parsed.step, Some(TriageStep::RiskSignals));
        assert_eq!(parsed.ok, Some(true));
        assert!(json.contains("\"type\":\"tool_update\""));
        assert!(json.contains("\"step\":\"riskSignals\""));
    }

    #[test]
    fn test_plan_built_carries_full_plan() {
        let event = TriageEvent::plan_built(&TriageStep::DEFAULT_PLAN);
        let steps = event.detail.as_array().unwrap();
        assert_eq!(steps.len(), 7);
        assert_eq!(steps[0], "getProfile");
        assert_eq!(steps[6], "summarize");
    }

    #[test]
    fn test_only_decision_is_terminal() {
        assert!(TriageEvent::decision_finalized(&RecommendedAction::fallback()).is_terminal());
        assert!(!TriageEvent::fallback_triggered("tool_timeout").is_terminal());
        assert!(!TriageEvent::plan_built(&TriageStep::DEFAULT_PLAN).is_terminal());
    }
}
