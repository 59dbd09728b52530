//! Review queue & feedback store
//!
//! The storage engine is abstract: `ReviewStore` is the seam. Production
//! runs on PostgreSQL (`pg`); tests and storage-free development use the
//! in-memory implementation (`memory`). Both enforce the same invariants:
//! enqueue is idempotent per transaction_id, submit_decision transitions a
//! row exactly once, and the feedback append lands in the same logical
//! transaction as the queue update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::types::{AnalystDecision, Priority};

pub mod memory;
pub mod pg;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Clone)]
pub enum StorageError {
    /// No queue entry for this transaction id
    NotFound(String),
    /// The entry already carries an analyst decision
    AlreadyReviewed(String),
    /// Worth retrying (connection churn, pool timeout)
    Transient(String),
    /// Not worth retrying
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound(id) => write!(f, "not found: {id}"),
            StorageError::AlreadyReviewed(id) => write!(f, "already reviewed: {id}"),
            StorageError::Transient(msg) => write!(f, "transient storage error: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// ROWS
// ============================================================================

/// One persisted review
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewQueueEntry {
    pub id: Uuid,
    pub transaction_id: String,
    pub trust_score: i32,
    pub priority: String,
    pub request_json: serde_json::Value,
    pub subscores_json: serde_json::Value,
    pub sla_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reviewed: bool,
    pub analyst_id: Option<String>,
    pub decision: Option<String>,
    pub feedback_text: Option<String>,
}

impl ReviewQueueEntry {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.reviewed && self.sla_deadline < now
    }
}

/// Insert payload for `enqueue`
#[derive(Debug, Clone)]
pub struct NewReviewEntry {
    pub transaction_id: String,
    pub trust_score: i32,
    pub priority: Priority,
    pub request_json: serde_json::Value,
    pub subscores_json: serde_json::Value,
    pub sla_deadline: DateTime<Utc>,
}

/// One labeled example staged for retraining
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedbackRecord {
    pub id: i64,
    pub transaction_id: String,
    pub original_trust_score: i32,
    pub original_subscores_json: serde_json::Value,
    pub analyst_decision: String,
    /// 0 = legitimate, 1 = fraud
    pub correct_label: i16,
    pub model_was_correct: i16,
    pub used_for_retraining: bool,
    pub created_at: DateTime<Utc>,
}

/// Analyst verdict submission
#[derive(Debug, Clone)]
pub struct DecisionSubmission {
    pub transaction_id: String,
    pub analyst_id: String,
    pub decision: AnalystDecision,
    pub feedback_text: Option<String>,
    /// WARN band lower bound at submission time; drives model_was_correct
    pub warn_threshold: i32,
}

impl DecisionSubmission {
    /// Fraud label implied by the analyst decision
    pub fn correct_label(&self) -> i16 {
        self.decision.correct_label()
    }

    /// Whether the model agreed with the analyst: predicted-fraud means the
    /// trust score fell below the WARN band
    pub fn model_was_correct(&self, original_trust_score: i32) -> i16 {
        let model_predicted_fraud = original_trust_score < self.warn_threshold;
        i16::from(model_predicted_fraud == (self.correct_label() == 1))
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Idempotent insert: an existing entry with the same transaction_id is
    /// returned unchanged.
    async fn enqueue(&self, entry: NewReviewEntry) -> StorageResult<ReviewQueueEntry>;

    /// Pending entries, newest first, optionally filtered by priority
    async fn list_pending(
        &self,
        limit: i64,
        priority: Option<Priority>,
    ) -> StorageResult<Vec<ReviewQueueEntry>>;

    async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StorageResult<Option<ReviewQueueEntry>>;

    /// Record an analyst verdict and append the feedback row atomically.
    /// Fails `AlreadyReviewed` on a second call, `NotFound` on unknown ids.
    async fn submit_decision(
        &self,
        submission: DecisionSubmission,
    ) -> StorageResult<ReviewQueueEntry>;

    /// Pre-assign a pending entry to an analyst
    async fn assign(&self, transaction_id: &str, analyst_id: &str) -> StorageResult<()>;

    async fn count_pending(&self) -> StorageResult<i64>;

    /// Pending entries past their SLA deadline
    async fn list_overdue(&self, now: DateTime<Utc>) -> StorageResult<Vec<ReviewQueueEntry>>;

    /// Feedback rows not yet exported, newest first, capped at 2x min_samples
    async fn pending_feedback(&self, min_samples: i64) -> StorageResult<Vec<FeedbackRecord>>;

    /// Flag exported feedback rows; returns how many flipped
    async fn mark_used(&self, transaction_ids: &[String]) -> StorageResult<u64>;

    /// Liveness probe for the health endpoint
    async fn is_reachable(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(decision: AnalystDecision) -> DecisionSubmission {
        DecisionSubmission {
            transaction_id: "tx-1".into(),
            analyst_id: "analyst-9".into(),
            decision,
            feedback_text: None,
            warn_threshold: 45,
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(submission(AnalystDecision::Approve).correct_label(), 0);
        assert_eq!(submission(AnalystDecision::Reject).correct_label(), 1);
        assert_eq!(submission(AnalystDecision::Escalate).correct_label(), 1);
    }

    #[test]
    fn test_model_was_correct() {
        // Model predicted fraud (trust below WARN band), analyst confirmed
        assert_eq!(submission(AnalystDecision::Reject).model_was_correct(20), 1);
        // Model predicted fraud, analyst approved: model was wrong
        assert_eq!(submission(AnalystDecision::Approve).model_was_correct(20), 0);
        // Model trusted it, analyst approved
        assert_eq!(submission(AnalystDecision::Approve).model_was_correct(80), 1);
        // Model trusted it, analyst rejected
        assert_eq!(submission(AnalystDecision::Reject).model_was_correct(80), 0);
        // Boundary: trust exactly at the WARN threshold is not predicted-fraud
        assert_eq!(submission(AnalystDecision::Approve).model_was_correct(45), 1);
    }
}
