//! The seven pipeline tools and the shape checks applied to their results.
//!
//! Each handler reads evidence accumulated by earlier steps from the run
//! context and writes its own back before returning. Handlers stay thin:
//! data access goes through the collaborator, scoring and the rule table
//! live in [`decision`](super::decision).

use serde::Serialize;

use crate::data::DataAccess;
use crate::domain::{
    AlertProfile, AlertRisk, ComplianceResult, ComplianceStatus, KbHit, RecommendedAction,
    RiskAssessment, RiskLevel, RunContext, Transaction, TriageStep, TriageSummary,
};

use super::decision;
use super::resilience::ToolError;

/// How many recent transactions to pull for scoring
const RECENT_TX_LIMIT: usize = 50;

/// Knowledge-base hits surfaced to the analyst, at most
const KB_HIT_LIMIT: usize = 3;

/// Characters of document content quoted per hit
const KB_EXTRACT_CHARS: usize = 140;

/// The accepted result of one step, as published on the event stream
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Profile(AlertProfile),
    Transactions(Vec<Transaction>),
    Risk(RiskAssessment),
    Kb(Vec<KbHit>),
    Compliance(ComplianceResult),
    Decision(RecommendedAction),
    Summary(TriageSummary),
}

/// Run one step against the collaborator and the accumulated context
pub async fn execute(
    step: TriageStep,
    ctx: &mut RunContext,
    data: &dyn DataAccess,
) -> Result<StepOutput, ToolError> {
    match step {
        TriageStep::GetProfile => {
            let profile = data.alert_with_relations(&ctx.alert_id).await?;
            ctx.customer_id = profile.customer.id.clone();
            ctx.profile = Some(profile.clone());
            Ok(StepOutput::Profile(profile))
        }

        TriageStep::RecentTx => {
            let transactions = data
                .recent_transactions(&ctx.customer_id, RECENT_TX_LIMIT)
                .await?;
            ctx.transactions = transactions.clone();
            Ok(StepOutput::Transactions(transactions))
        }

        TriageStep::RiskSignals => {
            let chargebacks = data.count_chargebacks(&ctx.customer_id).await?;
            let risk = decision::score_risk(&ctx.transactions, chargebacks);
            ctx.risk = Some(risk.clone());
            Ok(StepOutput::Risk(risk))
        }

        TriageStep::KbLookup => {
            let keywords = ctx
                .risk
                .as_ref()
                .map(|r| r.reasons.clone())
                .unwrap_or_default();
            let docs = data.search_knowledge_base(&keywords).await?;

            let hits: Vec<KbHit> = docs
                .into_iter()
                .take(KB_HIT_LIMIT)
                .map(|doc| KbHit {
                    doc_id: doc.id,
                    title: doc.title,
                    anchor: doc.anchor,
                    extract: doc.content.chars().take(KB_EXTRACT_CHARS).collect(),
                })
                .collect();

            ctx.kb = hits.clone();
            Ok(StepOutput::Kb(hits))
        }

        TriageStep::ComplianceCheck => {
            let computed_high = ctx
                .risk
                .as_ref()
                .map(|r| r.level == RiskLevel::High)
                .unwrap_or(false);
            let alert_high = ctx
                .profile
                .as_ref()
                .map(|p| p.alert_risk == AlertRisk::High)
                .unwrap_or(false);

            let requires_otp = computed_high || alert_high;
            let result = ComplianceResult {
                requires_otp,
                status: if requires_otp {
                    ComplianceStatus::OtpRequired
                } else {
                    ComplianceStatus::Pass
                },
            };

            ctx.compliance = Some(result);
            Ok(StepOutput::Compliance(result))
        }

        TriageStep::Decide => {
            // Gather the remaining evidence first so the rule table itself
            // stays a pure function of the context.
            let suspect_id = ctx
                .profile
                .as_ref()
                .and_then(|p| p.suspect_txn.as_ref())
                .map(|txn| txn.id.clone());

            ctx.existing_case = match suspect_id {
                Some(id) => data.find_open_case(&id).await?,
                None => None,
            };
            ctx.prior_runs = data.count_prior_runs(&ctx.alert_id, ctx.run_id).await?;

            let action = decision::decide(ctx);
            ctx.decision = Some(action.clone());
            Ok(StepOutput::Decision(action))
        }

        TriageStep::Summarize => {
            let action = ctx
                .decision
                .clone()
                .unwrap_or_else(RecommendedAction::fallback);
            let summary = TriageSummary {
                headline: format!("Plan: {}", action.action_name().replace('_', " ")),
                fallback_used: ctx.fallback_used,
            };
            ctx.summary = Some(summary.clone());
            Ok(StepOutput::Summary(summary))
        }
    }
}

/// Shape check applied before a result is accepted. A failing check counts
/// as a failed attempt and goes through the retry path.
pub fn validate(step: TriageStep, output: &StepOutput) -> Result<(), String> {
    match (step, output) {
        (TriageStep::GetProfile, StepOutput::Profile(_)) => Ok(()),
        (TriageStep::RecentTx, StepOutput::Transactions(_)) => Ok(()),

        (TriageStep::RiskSignals, StepOutput::Risk(risk)) => {
            let expected = if risk.score >= 60 {
                RiskLevel::High
            } else if risk.score >= 30 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            };
            if risk.level != expected {
                return Err(format!(
                    "risk level {} inconsistent with score {}",
                    risk.level, risk.score
                ));
            }
            Ok(())
        }

        (TriageStep::KbLookup, StepOutput::Kb(hits)) => {
            if hits.len() > KB_HIT_LIMIT {
                return Err(format!("too many kb hits: {}", hits.len()));
            }
            for hit in hits {
                if hit.doc_id.is_empty() {
                    return Err("kb hit missing doc id".to_string());
                }
                if hit.extract.chars().count() > KB_EXTRACT_CHARS {
                    return Err("kb extract exceeds limit".to_string());
                }
            }
            Ok(())
        }

        (TriageStep::ComplianceCheck, StepOutput::Compliance(result)) => {
            let consistent = match result.status {
                ComplianceStatus::OtpRequired => result.requires_otp,
                ComplianceStatus::Pass => !result.requires_otp,
                ComplianceStatus::Bypass => true,
            };
            if !consistent {
                return Err("compliance status contradicts otp flag".to_string());
            }
            Ok(())
        }

        (TriageStep::Decide, StepOutput::Decision(action)) => {
            if action.reason().is_empty() {
                return Err("decision missing reason".to_string());
            }
            Ok(())
        }

        (TriageStep::Summarize, StepOutput::Summary(summary)) => {
            if summary.headline.is_empty() {
                return Err("summary missing headline".to_string());
            }
            Ok(())
        }

        _ => Err(format!("unexpected result shape for {}", step)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_inconsistent_risk_level() {
        let risk = RiskAssessment {
            score: 75,
            reasons: vec!["prior_chargebacks".to_string()],
            level: RiskLevel::Low,
        };
        let err = validate(TriageStep::RiskSignals, &StepOutput::Risk(risk)).unwrap_err();
        assert!(err.contains("inconsistent"));
    }

    #[test]
    fn test_validate_accepts_consistent_risk() {
        let risk = RiskAssessment {
            score: 35,
            reasons: vec![],
            level: RiskLevel::Medium,
        };
        assert!(validate(TriageStep::RiskSignals, &StepOutput::Risk(risk)).is_ok());
    }

    #[test]
    fn test_validate_limits_kb_hits() {
        let hit = KbHit {
            doc_id: "kb-1".to_string(),
            title: "Doc".to_string(),
            anchor: "#a".to_string(),
            extract: "x".repeat(140),
        };
        let four = vec![hit.clone(), hit.clone(), hit.clone(), hit.clone()];
        assert!(validate(TriageStep::KbLookup, &StepOutput::Kb(four)).is_err());

        let long_extract = KbHit {
            extract: "x".repeat(141),
            ..hit.clone()
        };
        assert!(validate(TriageStep::KbLookup, &StepOutput::Kb(vec![long_extract])).is_err());

        assert!(validate(TriageStep::KbLookup, &StepOutput::Kb(vec![hit])).is_ok());
    }

    #[test]
    fn test_validate_compliance_consistency() {
        let contradictory = ComplianceResult {
            requires_otp: true,
            status: ComplianceStatus::Pass,
        };
        assert!(validate(
            TriageStep::ComplianceCheck,
            &StepOutput::Compliance(contradictory)
        )
        .is_err());

        let consistent = ComplianceResult {
            requires_otp: true,
            status: ComplianceStatus::OtpRequired,
        };
        assert!(validate(
            TriageStep::ComplianceCheck,
            &StepOutput::Compliance(consistent)
        )
        .is_ok());
    }

    #[test]
    fn test_validate_rejects_mismatched_shape() {
        let summary = TriageSummary {
            headline: "Plan: freeze card".to_string(),
            fallback_used: false,
        };
        let err = validate(TriageStep::Decide, &StepOutput::Summary(summary)).unwrap_err();
        assert!(err.contains("unexpected result shape"));
    }
}
