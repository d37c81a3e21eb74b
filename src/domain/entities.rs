//! Records served by the data-access collaborator.
//!
//! These mirror the upstream fraud datastore: customers, card transactions,
//! alerts raised against a transaction, open cases, and knowledge-base docs.
//! The engine never writes to any of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cardholder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A single card transaction. Amounts are signed minor units:
/// negative for pending authorizations, positive for captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub customer_id: String,
    pub merchant: String,
    pub amount_cents: i64,
    pub country: String,
    pub ts: DateTime<Utc>,
}

/// Risk label carried by an alert, assigned upstream by the detection layer.
///
/// `Unknown` absorbs any label this engine does not recognize; the decision
/// rules treat it as "unlabelled" rather than rejecting the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertRisk {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

/// A fraud alert raised against a customer, optionally pointing at a
/// suspect transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub customer_id: String,
    pub suspect_txn_id: Option<String>,
    pub risk: AlertRisk,
    pub status: String,
}

/// Status of a dispute case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    Open,
    Pending,
    Frozen,
    Closed,
}

impl CaseStatus {
    /// Cases in these states block a new triage from re-opening work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Pending | Self::Frozen)
    }
}

/// A dispute case attached to a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    pub id: String,
    pub txn_id: String,
    pub status: CaseStatus,
}

/// A knowledge-base document searched during `kbLookup`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbDoc {
    pub id: String,
    pub title: String,
    pub anchor: String,
    pub content: String,
}

/// The resolved view of an alert returned by `getAlertWithRelations`:
/// the customer, the suspect transaction (if any), and the alert labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProfile {
    pub customer: Customer,
    pub suspect_txn: Option<Transaction>,
    pub alert_risk: AlertRisk,
    pub alert_status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_risk_wire_names() {
        let json = serde_json::to_string(&AlertRisk::High).unwrap();
        assert_eq!(json, "\"HIGH\"");

        let parsed: AlertRisk = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(parsed, AlertRisk::Medium);
    }

    #[test]
    fn test_unrecognized_alert_risk_is_unknown() {
        let parsed: AlertRisk = serde_json::from_str("\"ELEVATED\"").unwrap();
        assert_eq!(parsed, AlertRisk::Unknown);
    }

    #[test]
    fn test_active_case_statuses() {
        assert!(CaseStatus::Open.is_active());
        assert!(CaseStatus::Pending.is_active());
        assert!(CaseStatus::Frozen.is_active());
        assert!(!CaseStatus::Closed.is_active());
    }
}
