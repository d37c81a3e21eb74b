//! In-memory data access backed by fixture records.
//!
//! Used by the demo CLI and the test suite. The builder methods make it
//! easy to stage a scenario; `demo()` ships a small dataset that exercises
//! every decision path.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::{
    Alert, AlertProfile, AlertRisk, CaseFile, CaseStatus, Customer, KbDoc, Transaction,
};

use super::{DataAccess, DataError};

/// Fixture-backed [`DataAccess`] implementation
#[derive(Debug, Default)]
pub struct MemoryData {
    customers: Vec<Customer>,
    transactions: Vec<Transaction>,
    alerts: Vec<Alert>,
    cases: Vec<CaseFile>,
    kb_docs: Vec<KbDoc>,
    chargebacks: Vec<(String, u64)>,
    /// (alert_id, run_id) pairs backing `count_prior_runs`
    runs: Mutex<Vec<(String, Uuid)>>,
}

impl MemoryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customers.push(customer);
        self
    }

    pub fn with_transaction(mut self, txn: Transaction) -> Self {
        self.transactions.push(txn);
        self
    }

    pub fn with_alert(mut self, alert: Alert) -> Self {
        self.alerts.push(alert);
        self
    }

    pub fn with_case(mut self, case: CaseFile) -> Self {
        self.cases.push(case);
        self
    }

    pub fn with_kb_doc(mut self, doc: KbDoc) -> Self {
        self.kb_docs.push(doc);
        self
    }

    pub fn with_chargebacks(mut self, customer_id: impl Into<String>, count: u64) -> Self {
        self.chargebacks.push((customer_id.into(), count));
        self
    }

    /// Record a triage run so later runs see it via `count_prior_runs`
    pub fn note_run(&self, alert_id: impl Into<String>, run_id: Uuid) {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((alert_id.into(), run_id));
    }

    /// A small dataset covering the main decision paths:
    /// a high-risk traveler, a clean low-risk alert, a medium-risk alert,
    /// a pending-vs-capture duplicate pair, and an alert without a suspect.
    pub fn demo() -> Self {
        let now = Utc::now();
        let txn = |id: &str, customer: &str, merchant: &str, cents: i64, country: &str, hours_ago: i64| {
            Transaction {
                id: id.to_string(),
                customer_id: customer.to_string(),
                merchant: merchant.to_string(),
                amount_cents: cents,
                country: country.to_string(),
                ts: now - Duration::hours(hours_ago),
            }
        };

        Self::new()
            .with_customer(Customer {
                id: "c-amelia".to_string(),
                name: "Amelia Torres".to_string(),
                email: "amelia.torres@example.com".to_string(),
            })
            .with_customer(Customer {
                id: "c-ben".to_string(),
                name: "Ben Okafor".to_string(),
                email: "ben.okafor@example.com".to_string(),
            })
            .with_customer(Customer {
                id: "c-chloe".to_string(),
                name: "Chloe Lindqvist".to_string(),
                email: "chloe.l@example.com".to_string(),
            })
            .with_customer(Customer {
                id: "c-dan".to_string(),
                name: "Dan Reyes".to_string(),
                email: "dan.reyes@example.com".to_string(),
            })
            // Amelia: large amounts across two countries plus chargebacks
            .with_transaction(txn("t-am-1", "c-amelia", "Aurora Jewelers", -62_000, "GB", 2))
            .with_transaction(txn("t-am-2", "c-amelia", "Skyline Electronics", 75_000, "US", 10))
            .with_transaction(txn("t-am-3", "c-amelia", "Corner Deli", 1_200, "US", 30))
            .with_chargebacks("c-amelia", 2)
            // Ben: ordinary activity
            .with_transaction(txn("t-bn-1", "c-ben", "Metro Grocer", 1_500, "US", 5))
            .with_transaction(txn("t-bn-2", "c-ben", "Metro Grocer", 2_300, "US", 20))
            // Chloe: one odd purchase
            .with_transaction(txn("t-ch-1", "c-chloe", "Night Owl Games", -8_000, "US", 3))
            .with_transaction(txn("t-ch-2", "c-chloe", "City Transit", 9_000, "US", 18))
            // Dan: pending auth later captured at a slightly different amount
            .with_transaction(txn("t-dn-cap", "c-dan", "Fresh Mart", 4_800, "US", 1))
            .with_transaction(txn("t-dn-auth", "c-dan", "Fresh Mart", -4_500, "US", 26))
            .with_alert(Alert {
                id: "alert-high".to_string(),
                customer_id: "c-amelia".to_string(),
                suspect_txn_id: Some("t-am-1".to_string()),
                risk: AlertRisk::High,
                status: "NEW".to_string(),
            })
            .with_alert(Alert {
                id: "alert-low".to_string(),
                customer_id: "c-ben".to_string(),
                suspect_txn_id: Some("t-bn-1".to_string()),
                risk: AlertRisk::Low,
                status: "NEW".to_string(),
            })
            .with_alert(Alert {
                id: "alert-medium".to_string(),
                customer_id: "c-chloe".to_string(),
                suspect_txn_id: Some("t-ch-1".to_string()),
                risk: AlertRisk::Medium,
                status: "NEW".to_string(),
            })
            .with_alert(Alert {
                id: "alert-dup".to_string(),
                customer_id: "c-dan".to_string(),
                suspect_txn_id: Some("t-dn-cap".to_string()),
                risk: AlertRisk::Low,
                status: "NEW".to_string(),
            })
            .with_alert(Alert {
                id: "alert-ghost".to_string(),
                customer_id: "c-ben".to_string(),
                suspect_txn_id: None,
                risk: AlertRisk::High,
                status: "NEW".to_string(),
            })
            .with_kb_doc(KbDoc {
                id: "kb-1".to_string(),
                title: "Handling high-value activity".to_string(),
                anchor: "high-value".to_string(),
                content: "When high_amount_activity is flagged, verify the cardholder \
                          initiated the purchase before freezing."
                    .to_string(),
            })
            .with_kb_doc(KbDoc {
                id: "kb-2".to_string(),
                title: "Travel and location changes".to_string(),
                anchor: "travel".to_string(),
                content: "A location_change signal alone is weak evidence; correlate \
                          with device and merchant history."
                    .to_string(),
            })
            .with_kb_doc(KbDoc {
                id: "kb-3".to_string(),
                title: "Repeat chargeback customers".to_string(),
                anchor: "chargebacks".to_string(),
                content: "Customers with prior_chargebacks warrant dispute review \
                          under reason code 10.4."
                    .to_string(),
            })
    }
}

#[async_trait]
impl DataAccess for MemoryData {
    async fn alert_with_relations(&self, alert_id: &str) -> Result<AlertProfile, DataError> {
        let alert = self
            .alerts
            .iter()
            .find(|a| a.id == alert_id)
            .ok_or(DataError::NotFound)?;

        let customer = self
            .customers
            .iter()
            .find(|c| c.id == alert.customer_id)
            .cloned()
            .ok_or(DataError::NotFound)?;

        let suspect_txn = alert.suspect_txn_id.as_ref().and_then(|txn_id| {
            self.transactions.iter().find(|t| &t.id == txn_id).cloned()
        });

        Ok(AlertProfile {
            customer,
            suspect_txn,
            alert_risk: alert.risk,
            alert_status: alert.status.clone(),
        })
    }

    async fn recent_transactions(
        &self,
        customer_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, DataError> {
        let mut txns: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect();
        txns.sort_by(|a, b| b.ts.cmp(&a.ts));
        txns.truncate(limit);
        Ok(txns)
    }

    async fn count_chargebacks(&self, customer_id: &str) -> Result<u64, DataError> {
        Ok(self
            .chargebacks
            .iter()
            .filter(|(id, _)| id == customer_id)
            .map(|(_, count)| count)
            .sum())
    }

    async fn search_knowledge_base(&self, keywords: &[String]) -> Result<Vec<KbDoc>, DataError> {
        let docs = self
            .kb_docs
            .iter()
            .filter(|doc| {
                keywords.is_empty() || keywords.iter().any(|kw| doc.content.contains(kw.as_str()))
            })
            .take(3)
            .cloned()
            .collect();
        Ok(docs)
    }

    async fn find_open_case(&self, txn_id: &str) -> Result<Option<CaseFile>, DataError> {
        Ok(self
            .cases
            .iter()
            .find(|c| c.txn_id == txn_id && c.status.is_active())
            .cloned())
    }

    async fn count_prior_runs(
        &self,
        alert_id: &str,
        excluding_run: Uuid,
    ) -> Result<u64, DataError> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(runs
            .iter()
            .filter(|(alert, run)| alert == alert_id && *run != excluding_run)
            .count() as u64)
    }
}
