//! Domain types for triage orchestration.
//!
//! This module contains the core data structures:
//! - Entities: records read from the data-access collaborator
//! - Triage: evidence, decisions, and durable run/trace records
//! - Events: immutable per-run lifecycle events

pub mod entities;
pub mod events;
pub mod triage;

// Re-export commonly used types
pub use entities::{
    Alert, AlertProfile, AlertRisk, CaseFile, CaseStatus, Customer, KbDoc, Transaction,
};
pub use events::{TriageEvent, TriageEventType};
pub use triage::{
    ComplianceResult, ComplianceStatus, KbHit, Plan, RecommendedAction, RiskAssessment, RiskLevel,
    RunContext, RunRecord, TraceRecord, TriageStep, TriageSummary, UnknownStep,
};
