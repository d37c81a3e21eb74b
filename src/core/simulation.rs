//! Fault injection for exercising the resilience path.
//!
//! A plan is injected per run, never held as ambient global state. Forced
//! timeouts are excluded from circuit-breaker accounting so tests can probe
//! the fallback path without polluting the shared breaker table.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::TriageStep;

/// Steps forced to fail with `simulated_timeout` on every attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationPlan {
    timeout_steps: HashSet<TriageStep>,
}

impl SimulationPlan {
    /// No faults injected
    pub fn none() -> Self {
        Self::default()
    }

    /// Force the given steps to time out
    pub fn timeout_on<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = TriageStep>,
    {
        Self {
            timeout_steps: steps.into_iter().collect(),
        }
    }

    pub fn forces_timeout(&self, step: TriageStep) -> bool {
        self.timeout_steps.contains(&step)
    }

    pub fn is_empty(&self) -> bool {
        self.timeout_steps.is_empty()
    }
}
