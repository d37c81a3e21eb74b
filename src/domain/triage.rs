//! Triage run state: the fixed step plan, accumulated evidence, the
//! recommended action, and the durable trace/run records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::entities::{AlertProfile, CaseFile, Transaction};

/// One named unit of work in the triage pipeline.
///
/// The wire names (`getProfile`, `recentTx`, ...) are shared with trace
/// records, events, and the config-file plan override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriageStep {
    GetProfile,
    RecentTx,
    RiskSignals,
    KbLookup,
    ComplianceCheck,
    Decide,
    Summarize,
}

impl TriageStep {
    /// The fixed default plan, in execution order
    pub const DEFAULT_PLAN: [TriageStep; 7] = [
        TriageStep::GetProfile,
        TriageStep::RecentTx,
        TriageStep::RiskSignals,
        TriageStep::KbLookup,
        TriageStep::ComplianceCheck,
        TriageStep::Decide,
        TriageStep::Summarize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageStep::GetProfile => "getProfile",
            TriageStep::RecentTx => "recentTx",
            TriageStep::RiskSignals => "riskSignals",
            TriageStep::KbLookup => "kbLookup",
            TriageStep::ComplianceCheck => "complianceCheck",
            TriageStep::Decide => "decide",
            TriageStep::Summarize => "summarize",
        }
    }
}

impl fmt::Display for TriageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step name that is not part of the pipeline. Indicates a configuration
/// defect; the affected run is halted, the process is not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown_step: {0}")]
pub struct UnknownStep(pub String);

impl FromStr for TriageStep {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriageStep::DEFAULT_PLAN
            .iter()
            .find(|step| step.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}

/// An ordered, immutable step sequence for one run
pub type Plan = Vec<TriageStep>;

/// Risk level computed by `riskSignals`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored risk with supporting reasons. Mutable after creation: later steps
/// may append reasons and downgrade the level (duplicate detection does).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: i64,
    pub reasons: Vec<String>,
    pub level: RiskLevel,
}

/// The action a completed triage recommends. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecommendedAction {
    #[serde(rename_all = "camelCase")]
    FreezeCard {
        reason: String,
        otp_required: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    OpenDispute {
        reason: String,
        reason_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    ContactCustomer {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    MarkFalsePositive {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl RecommendedAction {
    pub fn action_name(&self) -> &'static str {
        match self {
            RecommendedAction::FreezeCard { .. } => "freeze_card",
            RecommendedAction::OpenDispute { .. } => "open_dispute",
            RecommendedAction::ContactCustomer { .. } => "contact_customer",
            RecommendedAction::MarkFalsePositive { .. } => "mark_false_positive",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            RecommendedAction::FreezeCard { reason, .. }
            | RecommendedAction::OpenDispute { reason, .. }
            | RecommendedAction::ContactCustomer { reason, .. }
            | RecommendedAction::MarkFalsePositive { reason, .. } => reason,
        }
    }

    /// Default decision when a run ends without reaching `decide`
    pub fn fallback() -> Self {
        RecommendedAction::ContactCustomer {
            reason: "fallback".to_string(),
            note: None,
        }
    }
}

/// Compliance posture for the recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Pass,
    OtpRequired,
    Bypass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceResult {
    pub requires_otp: bool,
    pub status: ComplianceStatus,
}

/// A knowledge-base hit surfaced to the analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KbHit {
    pub doc_id: String,
    pub title: String,
    pub anchor: String,
    pub extract: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageSummary {
    pub headline: String,
    pub fallback_used: bool,
}

/// Mutable state owned by exactly one in-flight pipeline execution.
///
/// Each step reads what earlier steps accumulated and writes its own
/// evidence. Nothing escapes the run except the emitted events and the
/// persisted records.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub alert_id: String,
    /// Resolved by `getProfile`; empty until then
    pub customer_id: String,
    /// Monotonic sequence for trace records within this run
    pub trace_seq: u64,
    pub profile: Option<AlertProfile>,
    pub transactions: Vec<Transaction>,
    pub risk: Option<RiskAssessment>,
    pub kb: Vec<KbHit>,
    pub compliance: Option<ComplianceResult>,
    /// Gathered by the `decide` step before rule evaluation
    pub existing_case: Option<CaseFile>,
    pub prior_runs: u64,
    pub summary: Option<TriageSummary>,
    pub decision: Option<RecommendedAction>,
    pub fallback_used: bool,
}

impl RunContext {
    pub fn new(run_id: Uuid, alert_id: impl Into<String>) -> Self {
        Self {
            run_id,
            alert_id: alert_id.into(),
            customer_id: String::new(),
            trace_seq: 0,
            profile: None,
            transactions: Vec::new(),
            risk: None,
            kb: Vec::new(),
            compliance: None,
            existing_case: None,
            prior_runs: 0,
            summary: None,
            decision: None,
            fallback_used: false,
        }
    }

    /// Next trace sequence number (post-increment)
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.trace_seq;
        self.trace_seq += 1;
        seq
    }
}

/// The persisted record of one attempt of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub run_id: Uuid,
    pub seq: u64,
    pub step: TriageStep,
    pub ok: bool,
    pub duration_ms: u64,
    pub detail: serde_json::Value,
}

/// Durable summary of one run, written once at termination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub alert_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub risk: String,
    pub reasons: Vec<String>,
    pub fallback_used: bool,
    pub latency_ms: Option<u64>,
}

impl RunRecord {
    /// Initial record written when a run is accepted, before the pipeline
    /// produces anything
    pub fn pending(run_id: Uuid, alert_id: impl Into<String>) -> Self {
        Self {
            run_id,
            alert_id: alert_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            risk: "pending".to_string(),
            reasons: Vec::new(),
            fallback_used: false,
            latency_ms: None,
        }
    }
}
