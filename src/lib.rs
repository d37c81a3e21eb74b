//! trisk: a fraud-alert triage orchestration engine.
//!
//! One triage run walks a fixed pipeline of tools over an alert (profile,
//! recent activity, risk scoring, knowledge-base lookup, compliance check,
//! decision, summary), each guarded by a timeout, bounded retries, and a
//! circuit breaker shared across runs. The run always terminates with
//! exactly one recommended action, degrading to a safe default when steps
//! fail, and streams masked lifecycle events to any attached observer.
//!
//! Entry points: [`TriageEngine`] to start runs and subscribe to their
//! streams, [`MemoryData`]/[`DataAccess`] for the data seam, and
//! [`FileRunStore`]/[`RunStore`] for durable traces and run records.

pub mod cli;
pub mod config;
pub mod core;
pub mod data;
pub mod domain;
pub mod redact;
pub mod store;

pub use config::EngineConfig;
pub use crate::core::{SimulationPlan, StepOutput, ToolError, TriageBus, TriageEngine, TriageError};
pub use data::{DataAccess, DataError, MemoryData};
pub use domain::{
    AlertProfile, AlertRisk, RecommendedAction, RiskAssessment, RiskLevel, RunRecord, TraceRecord,
    TriageEvent, TriageEventType, TriageStep, UnknownStep,
};
pub use redact::{mask_value, redact_pii};
pub use store::{FileRunStore, MemoryRunStore, RunStore, StoreError};
