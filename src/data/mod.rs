//! Data-access seam.
//!
//! The engine consumes the fraud datastore through this narrow contract;
//! every call is fallible and may exceed the tool timeout. Production wires
//! a real backend here; the demo CLI and tests use [`MemoryData`].

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{AlertProfile, CaseFile, KbDoc, Transaction};

pub use memory::MemoryData;

/// Errors surfaced by the data-access collaborator
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// The requested record does not exist
    #[error("not_found")]
    NotFound,

    /// The backend failed in some other way
    #[error("data access failed: {0}")]
    Backend(String),
}

/// The six collaborator calls the pipeline depends on
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Resolve an alert with its customer and suspect transaction.
    /// Fails with [`DataError::NotFound`] if the alert does not exist.
    async fn alert_with_relations(&self, alert_id: &str) -> Result<AlertProfile, DataError>;

    /// Most recent transactions for a customer, newest first
    async fn recent_transactions(
        &self,
        customer_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, DataError>;

    /// Number of chargebacks on record for a customer
    async fn count_chargebacks(&self, customer_id: &str) -> Result<u64, DataError>;

    /// Knowledge-base documents matching any of the keywords, a few at most
    async fn search_knowledge_base(&self, keywords: &[String]) -> Result<Vec<KbDoc>, DataError>;

    /// An active (open/pending/frozen) case already attached to a transaction
    async fn find_open_case(&self, txn_id: &str) -> Result<Option<CaseFile>, DataError>;

    /// Completed or in-flight triage runs for this alert, excluding one
    async fn count_prior_runs(&self, alert_id: &str, excluding_run: Uuid)
        -> Result<u64, DataError>;
}
