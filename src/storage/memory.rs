//! In-memory review store
//!
//! Backs tests and storage-free development. Same invariants as the
//! PostgreSQL store; the single mutex stands in for per-row locking.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::types::Priority;

use super::{
    DecisionSubmission, FeedbackRecord, NewReviewEntry, ReviewQueueEntry, ReviewStore,
    StorageError, StorageResult,
};

#[derive(Default)]
struct Inner {
    entries: HashMap<String, ReviewQueueEntry>,
    /// Insertion order, oldest first
    order: Vec<String>,
    feedback: Vec<FeedbackRecord>,
    next_feedback_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of feedback rows, including exported ones (test helper)
    pub fn feedback_len(&self) -> usize {
        self.inner.lock().feedback.len()
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn enqueue(&self, entry: NewReviewEntry) -> StorageResult<ReviewQueueEntry> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.entries.get(&entry.transaction_id) {
            return Ok(existing.clone());
        }

        let row = ReviewQueueEntry {
            id: Uuid::new_v4(),
            transaction_id: entry.transaction_id.clone(),
            trust_score: entry.trust_score,
            priority: entry.priority.as_str().to_string(),
            request_json: entry.request_json,
            subscores_json: entry.subscores_json,
            sla_deadline: entry.sla_deadline,
            created_at: Utc::now(),
            reviewed: false,
            analyst_id: None,
            decision: None,
            feedback_text: None,
        };

        inner.order.push(entry.transaction_id.clone());
        inner.entries.insert(entry.transaction_id, row.clone());
        Ok(row)
    }

    async fn list_pending(
        &self,
        limit: i64,
        priority: Option<Priority>,
    ) -> StorageResult<Vec<ReviewQueueEntry>> {
        let inner = self.inner.lock();
        let rows = inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.entries.get(id))
            .filter(|e| !e.reviewed)
            .filter(|e| priority.map_or(true, |p| e.priority == p.as_str()))
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StorageResult<Option<ReviewQueueEntry>> {
        Ok(self.inner.lock().entries.get(transaction_id).cloned())
    }

    async fn submit_decision(
        &self,
        submission: DecisionSubmission,
    ) -> StorageResult<ReviewQueueEntry> {
        let mut inner = self.inner.lock();

        let entry = inner
            .entries
            .get(&submission.transaction_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(submission.transaction_id.clone()))?;

        if entry.reviewed {
            return Err(StorageError::AlreadyReviewed(submission.transaction_id));
        }

        let correct_label = submission.correct_label();
        let model_was_correct = submission.model_was_correct(entry.trust_score);

        let feedback_id = inner.next_feedback_id;
        inner.next_feedback_id += 1;
        inner.feedback.push(FeedbackRecord {
            id: feedback_id,
            transaction_id: entry.transaction_id.clone(),
            original_trust_score: entry.trust_score,
            original_subscores_json: entry.subscores_json.clone(),
            analyst_decision: submission.decision.as_str().to_string(),
            correct_label,
            model_was_correct,
            used_for_retraining: false,
            created_at: Utc::now(),
        });

        let entry = inner
            .entries
            .get_mut(&submission.transaction_id)
            .expect("entry checked above");
        entry.reviewed = true;
        entry.analyst_id = Some(submission.analyst_id);
        entry.decision = Some(submission.decision.as_str().to_string());
        entry.feedback_text = submission.feedback_text;

        Ok(entry.clone())
    }

    async fn assign(&self, transaction_id: &str, analyst_id: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(transaction_id)
            .ok_or_else(|| StorageError::NotFound(transaction_id.to_string()))?;
        if entry.reviewed {
            return Err(StorageError::AlreadyReviewed(transaction_id.to_string()));
        }
        entry.analyst_id = Some(analyst_id.to_string());
        Ok(())
    }

    async fn count_pending(&self) -> StorageResult<i64> {
        Ok(self.inner.lock().entries.values().filter(|e| !e.reviewed).count() as i64)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> StorageResult<Vec<ReviewQueueEntry>> {
        let inner = self.inner.lock();
        let rows = inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.entries.get(id))
            .filter(|e| e.is_overdue(now))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn pending_feedback(&self, min_samples: i64) -> StorageResult<Vec<FeedbackRecord>> {
        let inner = self.inner.lock();
        let cap = (min_samples.max(0) as usize) * 2;
        let rows = inner
            .feedback
            .iter()
            .rev()
            .filter(|f| !f.used_for_retraining)
            .take(cap)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn mark_used(&self, transaction_ids: &[String]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        let mut flipped = 0;
        for record in inner.feedback.iter_mut() {
            if !record.used_for_retraining && transaction_ids.contains(&record.transaction_id) {
                record.used_for_retraining = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================
