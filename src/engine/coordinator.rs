//! Scoring coordinator
//!
//! Orchestrates one request end to end: validation, the four detectors in
//! parallel (each bounded by its deadline), aggregation, the HITL rewrite
//! and enqueue, explanation, response assembly. A detector fault, a timeout
//! or a persistence hiccup never fails the request; the coordinator degrades
//! and reports.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{self, RuntimeConfig};
use crate::engine::aggregator::aggregate;
use crate::engine::detectors::{self, Detector};
use crate::engine::explain::{explain, FeatureImportance, RiskBreakdown, RiskLevel};
use crate::engine::hitl::{self, ReviewPlan};
use crate::engine::types::{Action, Decision, DetectorId, Subscore, TransactionRequest};
use crate::error::{AppError, AppResult};
use crate::storage::{NewReviewEntry, ReviewStore, StorageError};

const MAX_TRANSACTION_ID_LEN: usize = 128;

/// Backoff schedule for transient enqueue failures
const ENQUEUE_BACKOFF_MS: [u64; 3] = [50, 200, 800];

/// Reason appended when a required review could not be persisted
const ENQUEUE_FAILED_REASON: &str = "review_enqueue_failed";

// ============================================================================
// RESPONSE
// ============================================================================

/// Per-detector probabilities, rounded for display
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubscoreMap {
    pub phishing: f64,
    pub quishing: f64,
    pub collect: f64,
    pub malware: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreResponse {
    pub transaction_id: String,
    pub trust_score: u8,
    pub action: Action,
    pub subscores: SubscoreMap,
    pub reasons: Vec<String>,
    pub risk_breakdown: RiskBreakdown,
    pub feature_importance: Vec<FeatureImportance>,
    pub risk_level: RiskLevel,
    /// Non-null exactly when action is HUMAN_REVIEW and the enqueue landed
    pub review_id: Option<String>,
}

// ============================================================================
// SCORING
// ============================================================================

/// Score one request against the current runtime configuration
pub async fn score(req: TransactionRequest, store: &dyn ReviewStore) -> AppResult<ScoreResponse> {
    score_with_config(req, store, config::runtime()).await
}

pub async fn score_with_config(
    req: TransactionRequest,
    store: &dyn ReviewStore,
    cfg: Arc<RuntimeConfig>,
) -> AppResult<ScoreResponse> {
    validate(&req)?;

    let subscores = run_detectors(&req, cfg.clone()).await;
    let mut decision = aggregate(subscores, &cfg);

    let mut review_id = None;
    let mut enqueue_failed = false;

    if let Some(plan) = hitl::evaluate(&decision, req.amount, &cfg) {
        decision.action = Action::HumanReview;

        match enqueue_with_retry(store, &req, &decision, &plan).await {
            Ok(entry) => {
                tracing::info!(
                    transaction_id = %req.transaction_id,
                    priority = entry.priority,
                    "routed to human review"
                );
                review_id = Some(entry.id.to_string());
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %req.transaction_id,
                    "review enqueue failed after retries: {}",
                    e
                );
                enqueue_failed = true;
            }
        }
    }

    let mut explanation = explain(&req, &decision, &cfg);
    if enqueue_failed {
        explanation.reasons.push(ENQUEUE_FAILED_REASON.to_string());
    }

    Ok(ScoreResponse {
        transaction_id: req.transaction_id,
        trust_score: decision.trust_score,
        action: decision.action,
        subscores: subscore_map(&decision),
        reasons: explanation.reasons,
        risk_breakdown: explanation.risk_breakdown,
        feature_importance: explanation.feature_importance,
        risk_level: explanation.risk_level,
        review_id,
    })
}

fn validate(req: &TransactionRequest) -> AppResult<()> {
    if req.transaction_id.is_empty() {
        return Err(AppError::InvalidRequest("transaction_id must be non-empty".into()));
    }
    if req.transaction_id.len() > MAX_TRANSACTION_ID_LEN {
        return Err(AppError::InvalidRequest(format!(
            "transaction_id exceeds {MAX_TRANSACTION_ID_LEN} characters"
        )));
    }
    if !req.amount.is_finite() || req.amount < 0.0 {
        return Err(AppError::InvalidRequest("amount must be a non-negative number".into()));
    }
    Ok(())
}

/// Run the four detectors concurrently, each on the blocking pool and each
/// bounded by the per-detector deadline. A deadline or a panicked detector
/// yields the neutral substitute; the aggregation proceeds regardless.
async fn run_detectors(req: &TransactionRequest, cfg: Arc<RuntimeConfig>) -> Vec<Subscore> {
    let deadline = Duration::from_millis(cfg.per_detector_deadline_ms);

    let handles: Vec<(DetectorId, tokio::task::JoinHandle<Subscore>)> = detectors::registry()
        .iter()
        .map(|d| {
            let detector: Arc<dyn Detector> = d.clone();
            let req = req.clone();
            let cfg = cfg.clone();
            let id = detector.id();

            let handle = tokio::spawn(async move {
                let work = tokio::task::spawn_blocking(move || detector.score(&req, &cfg));
                match tokio::time::timeout(deadline, work).await {
                    Ok(Ok(sub)) => sub,
                    Ok(Err(_)) => {
                        tracing::warn!(detector = id.as_str(), "detector task failed");
                        Subscore::neutral(id, "detector_unavailable")
                    }
                    Err(_) => {
                        tracing::warn!(detector = id.as_str(), "detector deadline exceeded");
                        Subscore::neutral(id, "timeout")
                    }
                }
            });
            (id, handle)
        })
        .collect();

    let mut subscores = Vec::with_capacity(handles.len());
    for (id, handle) in handles {
        match handle.await {
            Ok(sub) => subscores.push(sub),
            Err(_) => subscores.push(Subscore::neutral(id, "detector_unavailable")),
        }
    }
    subscores
}

async fn enqueue_with_retry(
    store: &dyn ReviewStore,
    req: &TransactionRequest,
    decision: &Decision,
    plan: &ReviewPlan,
) -> Result<crate::storage::ReviewQueueEntry, StorageError> {
    let entry = NewReviewEntry {
        transaction_id: req.transaction_id.clone(),
        trust_score: i32::from(decision.trust_score),
        priority: plan.priority,
        request_json: serde_json::to_value(req)
            .map_err(|e| StorageError::Unavailable(format!("serialize request: {e}")))?,
        subscores_json: serde_json::to_value(&decision.subscores)
            .map_err(|e| StorageError::Unavailable(format!("serialize subscores: {e}")))?,
        sla_deadline: Utc::now() + chrono::Duration::seconds(plan.sla_seconds),
    };

    let mut last_err = None;
    for (attempt, backoff_ms) in std::iter::once(None)
        .chain(ENQUEUE_BACKOFF_MS.iter().copied().map(Some))
        .enumerate()
    {
        if let Some(ms) = backoff_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        match store.enqueue(entry.clone()).await {
            Ok(row) => return Ok(row),
            Err(StorageError::Transient(msg)) => {
                tracing::warn!(attempt, "transient enqueue failure: {}", msg);
                last_err = Some(StorageError::Transient(msg));
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| StorageError::Unavailable("enqueue retries exhausted".into())))
}

fn subscore_map(decision: &Decision) -> SubscoreMap {
    let p = |id: DetectorId| {
        decision
            .subscore(id)
            .map(|s| (s.probability * 1000.0).round() / 1000.0)
            .unwrap_or(0.0)
    };
    SubscoreMap {
        phishing: p(DetectorId::Phishing),
        quishing: p(DetectorId::Quishing),
        collect: p(DetectorId::Collect),
        malware: p(DetectorId::Malware),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{DevicePosture, TransactionType};
    use crate::storage::memory::MemoryStore;

    fn base_request(id: &str) -> TransactionRequest {
        TransactionRequest {
            transaction_id: id.into(),
            payer_vpa: "payer@bank".into(),
            payee_vpa: "friend@bank".into(),
            amount: 500.0,
            message: String::new(),
            transaction_type: TransactionType::Pay,
            qr_payload: None,
            payee_new: 0,
            device_posture: None,
            initiated_at: None,
        }
    }

    fn cfg() -> Arc<RuntimeConfig> {
        Arc::new(RuntimeConfig::default())
    }

    async fn run(req: TransactionRequest, store: &MemoryStore) -> ScoreResponse {
        score_with_config(req, store, cfg()).await.unwrap()
    }

    #[tokio::test]
    async fn test_rejects_empty_transaction_id() {
        let store = MemoryStore::new();
        let mut req = base_request("");
        req.amount = 100.0;
        let err = score_with_config(req, &store, cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_rejects_negative_amount() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-neg");
        req.amount = -1.0;
        let err = score_with_config(req, &store, cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_benign_payment_allows() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-lunch");
        req.message = "Send 500 for lunch".into();

        let resp = run(req, &store).await;

        assert_eq!(resp.action, Action::Allow);
        assert!(resp.trust_score >= 80);
        assert!(resp.reasons.is_empty());
        assert_eq!(resp.risk_level, RiskLevel::Low);
        assert!(resp.review_id.is_none());
        assert_eq!(store.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_phishing_memo_blocks() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-phish");
        req.amount = 100.0;
        req.message = "URGENT: verify KYC, share OTP to 9xxxxxxxx9, tap bit.ly/abc".into();

        let resp = run(req, &store).await;

        assert_eq!(resp.action, Action::Block);
        assert!(resp.trust_score <= 20);
        assert!(resp.subscores.phishing >= 0.9);
        assert!(resp.reasons.iter().any(|r| r.contains("OTP")));
        assert!(resp.review_id.is_none());
    }

    #[tokio::test]
    async fn test_quishing_payload_blocks() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-qr");
        req.transaction_type = TransactionType::QrPay;
        req.payee_vpa = "alice@bank".into();
        req.amount = 100.0;
        req.qr_payload = Some("upi://pay?pa=mallory@bank&am=1000".into());

        let resp = run(req, &store).await;

        assert_eq!(resp.action, Action::Block);
        assert!(resp.subscores.quishing >= 0.9);
        assert!(resp
            .reasons
            .iter()
            .any(|r| r.contains("does not match the requested payee")
                || r.contains("differs from the requested amount")));
    }

    #[tokio::test]
    async fn test_large_collect_goes_to_review() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-collect");
        req.transaction_type = TransactionType::Collect;
        req.amount = 75_000.0;
        req.payee_new = 1;
        req.message = "prize claim".into();

        let resp = run(req, &store).await;

        assert_eq!(resp.action, Action::HumanReview);
        let review_id = resp.review_id.expect("enqueued");

        let entry = store
            .get_by_transaction_id("tx-collect")
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(entry.id.to_string(), review_id);
        assert_eq!(entry.priority, "CRITICAL");
        let sla_secs = (entry.sla_deadline - entry.created_at).num_seconds();
        assert!((55..=65).contains(&sla_secs));

        // The persisted request deserializes back to the original
        let stored: TransactionRequest = serde_json::from_value(entry.request_json).unwrap();
        assert_eq!(stored.transaction_id, "tx-collect");
        assert_eq!(stored.amount, 75_000.0);
        assert_eq!(stored.transaction_type, TransactionType::Collect);
        assert_eq!(stored.message, "prize claim");
        assert_eq!(stored.payee_new, 1);
    }

    #[tokio::test]
    async fn test_rescoring_reuses_the_review_row() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-repeat");
        req.transaction_type = TransactionType::Collect;
        req.amount = 75_000.0;
        req.payee_new = 1;
        req.message = "prize claim".into();

        let first = run(req.clone(), &store).await;
        let second = run(req, &store).await;

        assert_eq!(first.review_id, second.review_id);
        assert_eq!(store.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_compromised_device_blocks_without_review() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-mal");
        req.device_posture = Some(DevicePosture {
            debugger_attached: true,
            accessibility_service_active: true,
            ..Default::default()
        });

        let resp = run(req, &store).await;

        assert!(matches!(resp.action, Action::Warn | Action::Block));
        assert!(resp.subscores.malware >= 0.85);
        assert!(resp.reasons.iter().any(|r| r.contains("debugger")));
        assert!(resp.review_id.is_none());
    }

    #[tokio::test]
    async fn test_scoring_is_idempotent() {
        let store = MemoryStore::new();
        let mut req = base_request("tx-idem");
        req.message = "please verify your account".into();

        let first = run(req.clone(), &store).await;
        let second = run(req, &store).await;

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_breakdown_always_sums_to_one() {
        let store = MemoryStore::new();
        for (i, memo) in ["", "urgent verify kyc", "prize claim now"].iter().enumerate() {
            let mut req = base_request(&format!("tx-sum-{i}"));
            req.message = memo.to_string();
            let resp = run(req, &store).await;
            let sum = resp.risk_breakdown.sum();
            assert!((0.99..=1.01).contains(&sum), "sum {sum} for memo {memo:?}");
        }
    }

    #[tokio::test]
    async fn test_hitl_disabled_passes_warn_through() {
        let store = MemoryStore::new();
        let cfg = Arc::new(RuntimeConfig { hitl_enabled: false, ..Default::default() });

        let mut req = base_request("tx-nohitl");
        req.transaction_type = TransactionType::Collect;
        req.amount = 75_000.0;
        req.payee_new = 1;
        req.message = "prize claim".into();

        let resp = score_with_config(req, &store, cfg).await.unwrap();
        assert_ne!(resp.action, Action::HumanReview);
        assert!(resp.review_id.is_none());
        assert_eq!(store.count_pending().await.unwrap(), 0);
    }

    /// Store that fails transiently a fixed number of times before working
    struct FlakyStore {
        inner: MemoryStore,
        failures: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl ReviewStore for FlakyStore {
        async fn enqueue(
            &self,
            entry: NewReviewEntry,
        ) -> Result<crate::storage::ReviewQueueEntry, StorageError> {
            use std::sync::atomic::Ordering;
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::Transient("connection reset".into()));
            }
            self.inner.enqueue(entry).await
        }

        async fn list_pending(
            &self,
            limit: i64,
            priority: Option<crate::engine::types::Priority>,
        ) -> Result<Vec<crate::storage::ReviewQueueEntry>, StorageError> {
            self.inner.list_pending(limit, priority).await
        }

        async fn get_by_transaction_id(
            &self,
            transaction_id: &str,
        ) -> Result<Option<crate::storage::ReviewQueueEntry>, StorageError> {
            self.inner.get_by_transaction_id(transaction_id).await
        }

        async fn submit_decision(
            &self,
            submission: crate::storage::DecisionSubmission,
        ) -> Result<crate::storage::ReviewQueueEntry, StorageError> {
            self.inner.submit_decision(submission).await
        }

        async fn assign(&self, transaction_id: &str, analyst_id: &str) -> Result<(), StorageError> {
            self.inner.assign(transaction_id, analyst_id).await
        }

        async fn count_pending(&self) -> Result<i64, StorageError> {
            self.inner.count_pending().await
        }

        async fn list_overdue(
            &self,
            now: chrono::DateTime<Utc>,
        ) -> Result<Vec<crate::storage::ReviewQueueEntry>, StorageError> {
            self.inner.list_overdue(now).await
        }

        async fn pending_feedback(
            &self,
            min_samples: i64,
        ) -> Result<Vec<crate::storage::FeedbackRecord>, StorageError> {
            self.inner.pending_feedback(min_samples).await
        }

        async fn mark_used(&self, transaction_ids: &[String]) -> Result<u64, StorageError> {
            self.inner.mark_used(transaction_ids).await
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    fn review_worthy_request(id: &str) -> TransactionRequest {
        let mut req = base_request(id);
        req.transaction_type = TransactionType::Collect;
        req.amount = 75_000.0;
        req.payee_new = 1;
        req.message = "prize claim".into();
        req
    }

    #[tokio::test]
    async fn test_transient_enqueue_failures_are_retried() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failures: std::sync::atomic::AtomicU32::new(2),
        };

        let resp = score_with_config(review_worthy_request("tx-flaky"), &store, cfg())
            .await
            .unwrap();

        assert_eq!(resp.action, Action::HumanReview);
        assert!(resp.review_id.is_some());
        assert!(!resp.reasons.iter().any(|r| r == ENQUEUE_FAILED_REASON));
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_not_fail() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failures: std::sync::atomic::AtomicU32::new(10),
        };

        let resp = score_with_config(review_worthy_request("tx-down"), &store, cfg())
            .await
            .unwrap();

        // The scoring response still comes back; the intended review is
        // reported but not persisted
        assert_eq!(resp.action, Action::HumanReview);
        assert!(resp.review_id.is_none());
        assert!(resp.reasons.iter().any(|r| r == ENQUEUE_FAILED_REASON));
    }
}
