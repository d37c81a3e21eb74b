//! Rule-table scenarios driven through staged run contexts.

use chrono::{Duration, Utc};
use uuid::Uuid;

use trisk::core::decision::decide;
use trisk::domain::{
    AlertProfile, AlertRisk, CaseFile, CaseStatus, Customer, RecommendedAction, RiskAssessment,
    RiskLevel, RunContext, Transaction,
};

fn txn(id: &str, cents: i64, merchant: &str, hours_ago: i64) -> Transaction {
    Transaction {
        id: id.to_string(),
        customer_id: "c-1".to_string(),
        merchant: merchant.to_string(),
        amount_cents: cents,
        country: "US".to_string(),
        ts: Utc::now() - Duration::hours(hours_ago),
    }
}

fn staged(alert_risk: AlertRisk, suspect: Option<Transaction>) -> RunContext {
    let mut ctx = RunContext::new(Uuid::new_v4(), "alert-1");
    ctx.customer_id = "c-1".to_string();
    ctx.profile = Some(AlertProfile {
        customer: Customer {
            id: "c-1".to_string(),
            name: "Test Customer".to_string(),
            email: "test@example.com".to_string(),
        },
        suspect_txn: suspect,
        alert_risk,
        alert_status: "NEW".to_string(),
    });
    ctx
}

fn risk(score: i64, level: RiskLevel) -> RiskAssessment {
    RiskAssessment {
        score,
        reasons: vec![],
        level,
    }
}

#[test]
fn test_missing_suspect_wins_over_everything() {
    let mut ctx = staged(AlertRisk::High, None);
    ctx.risk = Some(risk(90, RiskLevel::High));
    ctx.existing_case = Some(CaseFile {
        id: "case-1".to_string(),
        txn_id: "t-x".to_string(),
        status: CaseStatus::Open,
    });

    let action = decide(&mut ctx);
    assert_eq!(action.reason(), "no_suspect_transaction");
}

#[test]
fn test_existing_case_short_circuits() {
    let mut ctx = staged(AlertRisk::High, Some(txn("t-1", 80_000, "Jewelers", 1)));
    ctx.existing_case = Some(CaseFile {
        id: "case-7".to_string(),
        txn_id: "t-1".to_string(),
        status: CaseStatus::Pending,
    });

    match decide(&mut ctx) {
        RecommendedAction::MarkFalsePositive { reason, note } => {
            assert_eq!(reason, "case_already_open");
            assert_eq!(note.as_deref(), Some("Existing case case-7"));
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

#[test]
fn test_repeat_alert_unless_high() {
    let mut ctx = staged(AlertRisk::Medium, Some(txn("t-1", 8_000, "Games", 1)));
    ctx.prior_runs = 2;

    match decide(&mut ctx) {
        RecommendedAction::MarkFalsePositive { reason, note } => {
            assert_eq!(reason, "repeat_alert");
            assert_eq!(note.as_deref(), Some("Prior triage runs: 2"));
        }
        other => panic!("unexpected action: {:?}", other),
    }

    // A high-risk alert is triaged again despite prior runs
    let mut ctx = staged(AlertRisk::High, Some(txn("t-1", 8_000, "Games", 1)));
    ctx.prior_runs = 2;
    assert_eq!(decide(&mut ctx).action_name(), "freeze_card");
}

#[test]
fn test_opposite_pair_downgrades_and_contacts() {
    let suspect = txn("t-cap", 4_800, "Fresh Mart", 1);
    let mut ctx = staged(AlertRisk::High, Some(suspect.clone()));
    ctx.transactions = vec![suspect, txn("t-auth", -4_500, "Fresh Mart", 26)];
    ctx.risk = Some(risk(70, RiskLevel::High));

    match decide(&mut ctx) {
        RecommendedAction::ContactCustomer { reason, note } => {
            assert_eq!(reason, "duplicate_pending_capture");
            assert_eq!(note.as_deref(), Some("Matched pending vs captured pair"));
        }
        other => panic!("unexpected action: {:?}", other),
    }

    // The assessment was downgraded in place
    let downgraded = ctx.risk.unwrap();
    assert_eq!(downgraded.level, RiskLevel::Low);
    assert!(downgraded
        .reasons
        .contains(&"duplicate_pending_capture".to_string()));
}

#[test]
fn test_low_alert_gets_review_call() {
    let mut ctx = staged(AlertRisk::Low, Some(txn("t-1", 1_500, "Grocer", 5)));
    ctx.risk = Some(risk(90, RiskLevel::High));

    // The low alert label wins over the computed level
    match decide(&mut ctx) {
        RecommendedAction::ContactCustomer { reason, .. } => {
            assert_eq!(reason, "low_alert_review");
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

#[test]
fn test_high_freezes_with_otp() {
    // High alert label: note explains the label
    let mut ctx = staged(AlertRisk::High, Some(txn("t-1", 62_000, "Jewelers", 2)));
    ctx.risk = Some(risk(40, RiskLevel::Medium));
    match decide(&mut ctx) {
        RecommendedAction::FreezeCard {
            reason,
            otp_required,
            note,
        } => {
            assert_eq!(reason, "high_risk_detected");
            assert!(otp_required);
            assert_eq!(note.as_deref(), Some("Alert flagged high risk"));
        }
        other => panic!("unexpected action: {:?}", other),
    }

    // Computed high with a non-high label: freeze, no label note
    let mut ctx = staged(AlertRisk::Unknown, Some(txn("t-1", 62_000, "Jewelers", 2)));
    ctx.risk = Some(risk(75, RiskLevel::High));
    match decide(&mut ctx) {
        RecommendedAction::FreezeCard { note, .. } => assert!(note.is_none()),
        other => panic!("unexpected action: {:?}", other),
    }
}

#[test]
fn test_medium_alert_opens_dispute() {
    let mut ctx = staged(AlertRisk::Medium, Some(txn("t-1", 8_000, "Games", 3)));
    ctx.risk = Some(risk(10, RiskLevel::Low));

    match decide(&mut ctx) {
        RecommendedAction::OpenDispute {
            reason,
            reason_code,
            ..
        } => {
            assert_eq!(reason, "pattern_match_dispute");
            assert_eq!(reason_code, "10.4");
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

#[test]
fn test_unlabelled_alert_exact_duplicate() {
    let suspect = txn("t-1", 3_200, "Coffee Cart", 1);
    let mut ctx = staged(AlertRisk::Unknown, Some(suspect.clone()));
    ctx.transactions = vec![suspect, txn("t-2", 3_200, "Coffee Cart", 4)];
    ctx.risk = Some(risk(0, RiskLevel::Low));

    match decide(&mut ctx) {
        RecommendedAction::ContactCustomer { reason, note } => {
            assert_eq!(reason, "detected_duplicate_pending_capture");
            assert_eq!(note.as_deref(), Some("Likely pending vs captured pair"));
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

#[test]
fn test_unlabelled_alert_falls_back_on_computed_level() {
    // Computed medium: manual follow-up
    let mut ctx = staged(AlertRisk::Unknown, Some(txn("t-1", 8_000, "Games", 3)));
    ctx.risk = Some(risk(35, RiskLevel::Medium));
    match decide(&mut ctx) {
        RecommendedAction::ContactCustomer { reason, .. } => {
            assert_eq!(reason, "manual_followup");
        }
        other => panic!("unexpected action: {:?}", other),
    }

    // Computed low: nothing left, mark it a false positive
    let mut ctx = staged(AlertRisk::Unknown, Some(txn("t-1", 800, "Grocer", 3)));
    ctx.risk = Some(risk(0, RiskLevel::Low));
    assert_eq!(decide(&mut ctx).reason(), "low_risk_alert");
}
