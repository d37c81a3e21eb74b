//! Risk scoring and the decision rule table.
//!
//! `decide` is a pure function of the evidence accumulated in the run
//! context: the `decide` step gathers its case/prior-run lookups first, then
//! this rule table runs with no further I/O. Rules are evaluated in strict
//! priority order; the first match wins.

use std::collections::HashSet;

use chrono::Duration;

use crate::domain::{
    AlertRisk, RecommendedAction, RiskAssessment, RiskLevel, RunContext, Transaction,
};

/// Minor-unit amount above which a transaction counts as high-value
const HIGH_AMOUNT_CENTS: i64 = 50_000;

/// Reason appended when a duplicate pending/capture pair downgrades the risk
const DUPLICATE_REASON: &str = "duplicate_pending_capture";

/// Score recent activity into a risk assessment.
///
/// `score = 20 x high-value transactions + 15 if more than one country
/// + 30 x chargebacks`; high at 60, medium at 30.
pub fn score_risk(transactions: &[Transaction], chargebacks: u64) -> RiskAssessment {
    let high_amount = transactions
        .iter()
        .filter(|t| t.amount_cents.abs() > HIGH_AMOUNT_CENTS)
        .count() as i64;

    let countries: HashSet<&str> = transactions.iter().map(|t| t.country.as_str()).collect();
    let multi_country = countries.len() > 1;

    let score = high_amount * 20 + if multi_country { 15 } else { 0 } + chargebacks as i64 * 30;

    let mut reasons = Vec::new();
    if high_amount > 0 {
        reasons.push("high_amount_activity".to_string());
    }
    if multi_country {
        reasons.push("location_change".to_string());
    }
    if chargebacks > 0 {
        reasons.push("prior_chargebacks".to_string());
    }

    let level = if score >= 60 {
        RiskLevel::High
    } else if score >= 30 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    RiskAssessment {
        score,
        reasons,
        level,
    }
}

/// Evaluate the rule table. May downgrade the context's risk assessment
/// when a duplicate pending/capture pair explains the suspect transaction.
pub fn decide(ctx: &mut RunContext) -> RecommendedAction {
    let suspect = match ctx.profile.as_ref().and_then(|p| p.suspect_txn.clone()) {
        Some(txn) => txn,
        None => {
            return RecommendedAction::MarkFalsePositive {
                reason: "no_suspect_transaction".to_string(),
                note: None,
            }
        }
    };

    let alert_risk = ctx
        .profile
        .as_ref()
        .map(|p| p.alert_risk)
        .unwrap_or(AlertRisk::Low);

    if let Some(case) = &ctx.existing_case {
        return RecommendedAction::MarkFalsePositive {
            reason: "case_already_open".to_string(),
            note: Some(format!("Existing case {}", case.id)),
        };
    }

    if ctx.prior_runs > 0 && alert_risk != AlertRisk::High {
        return RecommendedAction::MarkFalsePositive {
            reason: "repeat_alert".to_string(),
            note: Some(format!("Prior triage runs: {}", ctx.prior_runs)),
        };
    }

    if opposite_sign_pair(&ctx.transactions, &suspect).is_some() {
        downgrade_for_duplicate(&mut ctx.risk);
        return RecommendedAction::ContactCustomer {
            reason: DUPLICATE_REASON.to_string(),
            note: Some("Matched pending vs captured pair".to_string()),
        };
    }

    if alert_risk == AlertRisk::Low {
        return RecommendedAction::ContactCustomer {
            reason: "low_alert_review".to_string(),
            note: None,
        };
    }

    let computed_level = ctx.risk.as_ref().map(|r| r.level).unwrap_or(RiskLevel::Low);

    if alert_risk == AlertRisk::High || computed_level == RiskLevel::High {
        return RecommendedAction::FreezeCard {
            reason: "high_risk_detected".to_string(),
            otp_required: true,
            note: (alert_risk == AlertRisk::High).then(|| "Alert flagged high risk".to_string()),
        };
    }

    if alert_risk == AlertRisk::Medium {
        return RecommendedAction::OpenDispute {
            reason: "pattern_match_dispute".to_string(),
            reason_code: "10.4".to_string(),
            note: Some("Medium risk alert recommends dispute".to_string()),
        };
    }

    if has_exact_duplicate(&ctx.transactions, &suspect) {
        downgrade_for_duplicate(&mut ctx.risk);
        return RecommendedAction::ContactCustomer {
            reason: "detected_duplicate_pending_capture".to_string(),
            note: Some("Likely pending vs captured pair".to_string()),
        };
    }

    if computed_level == RiskLevel::Medium {
        return RecommendedAction::ContactCustomer {
            reason: "manual_followup".to_string(),
            note: None,
        };
    }

    RecommendedAction::MarkFalsePositive {
        reason: "low_risk_alert".to_string(),
        note: None,
    }
}

/// A sign-opposite transaction at the same merchant within 48 hours and
/// within 20% + $5 of the suspect amount: the pending-vs-capture heuristic.
fn opposite_sign_pair<'a>(
    transactions: &'a [Transaction],
    suspect: &Transaction,
) -> Option<&'a Transaction> {
    let tolerance = suspect.amount_cents.abs() as f64 * 0.2 + 500.0;
    transactions.iter().find(|txn| {
        if txn.id == suspect.id || txn.merchant != suspect.merchant {
            return false;
        }
        let time_delta = (txn.ts - suspect.ts).num_milliseconds().abs();
        if time_delta > Duration::hours(48).num_milliseconds() {
            return false;
        }
        let amount_delta = (txn.amount_cents.abs() - suspect.amount_cents.abs()).abs();
        if amount_delta as f64 > tolerance {
            return false;
        }
        txn.amount_cents.signum() != suspect.amount_cents.signum()
    })
}

/// An exact-amount, same-merchant duplicate within 24 hours
fn has_exact_duplicate(transactions: &[Transaction], suspect: &Transaction) -> bool {
    transactions.iter().any(|txn| {
        txn.id != suspect.id
            && txn.merchant == suspect.merchant
            && txn.amount_cents.abs() == suspect.amount_cents.abs()
            && (txn.ts - suspect.ts).num_milliseconds().abs()
                < Duration::hours(24).num_milliseconds()
    })
}

fn downgrade_for_duplicate(risk: &mut Option<RiskAssessment>) {
    if let Some(risk) = risk {
        risk.level = RiskLevel::Low;
        risk.reasons.push(DUPLICATE_REASON.to_string());
    }
}
