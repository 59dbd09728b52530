//! Analyst endpoints
//!
//! Unlike scoring, these fail loudly: a silently dropped verdict would
//! corrupt the feedback loop.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config;
use crate::engine::types::{AnalystDecision, Priority};
use crate::error::{AppError, AppResult};
use crate::storage::{DecisionSubmission, ReviewQueueEntry, ReviewStore};
use crate::AppState;

const DEFAULT_QUEUE_LIMIT: i64 = 50;

/// Backoff schedule for transient failures while recording a verdict
const SUBMIT_BACKOFF_MS: [u64; 3] = [50, 200, 800];

#[derive(Debug, Deserialize, Default)]
pub struct QueueFilter {
    pub priority: Option<String>,
    pub limit: Option<i64>,
}

/// Queue entry shaped for the analyst dashboard
#[derive(Debug, Serialize)]
pub struct QueueItemView {
    pub id: Uuid,
    pub transaction_id: String,
    pub trust_score: i32,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub time_in_queue_minutes: f64,
    pub overdue: bool,
    pub analyst_id: Option<String>,
    pub request: serde_json::Value,
    pub subscores: serde_json::Value,
}

impl QueueItemView {
    fn from_entry(entry: ReviewQueueEntry, now: DateTime<Utc>) -> Self {
        Self {
            time_in_queue_minutes: (now - entry.created_at).num_seconds() as f64 / 60.0,
            overdue: entry.is_overdue(now),
            id: entry.id,
            transaction_id: entry.transaction_id,
            trust_score: entry.trust_score,
            priority: entry.priority,
            created_at: entry.created_at,
            sla_deadline: entry.sla_deadline,
            analyst_id: entry.analyst_id,
            request: entry.request_json,
            subscores: entry.subscores_json,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queue_depth: i64,
    pub items: Vec<QueueItemView>,
}

/// List pending reviews, newest first
pub async fn review_queue(
    State(state): State<AppState>,
    Query(filter): Query<QueueFilter>,
) -> AppResult<Json<QueueResponse>> {
    let priority = match filter.priority.as_deref() {
        Some(raw) => Some(
            Priority::parse(raw)
                .ok_or_else(|| AppError::InvalidRequest(format!("unknown priority {raw}")))?,
        ),
        None => None,
    };

    let limit = filter.limit.unwrap_or(DEFAULT_QUEUE_LIMIT).clamp(1, 500);
    let entries = state.store.list_pending(limit, priority).await?;
    let queue_depth = state.store.count_pending().await?;

    let now = Utc::now();
    Ok(Json(QueueResponse {
        queue_depth,
        items: entries.into_iter().map(|e| QueueItemView::from_entry(e, now)).collect(),
    }))
}

/// List pending reviews past their SLA deadline
pub async fn overdue(State(state): State<AppState>) -> AppResult<Json<QueueResponse>> {
    let now = Utc::now();
    let entries = state.store.list_overdue(now).await?;
    let queue_depth = state.store.count_pending().await?;

    Ok(Json(QueueResponse {
        queue_depth,
        items: entries.into_iter().map(|e| QueueItemView::from_entry(e, now)).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReviewSubmission {
    pub transaction_id: String,
    pub analyst_id: String,
    pub decision: AnalystDecision,
    #[serde(default)]
    pub feedback_text: Option<String>,
}

/// Record an analyst verdict. The feedback row is appended in the same
/// logical transaction by the store.
pub async fn submit_review(
    State(state): State<AppState>,
    Json(submission): Json<ReviewSubmission>,
) -> AppResult<Json<serde_json::Value>> {
    if submission.transaction_id.is_empty() || submission.analyst_id.is_empty() {
        return Err(AppError::InvalidRequest(
            "transaction_id and analyst_id must be non-empty".into(),
        ));
    }

    let request = DecisionSubmission {
        transaction_id: submission.transaction_id,
        analyst_id: submission.analyst_id,
        decision: submission.decision,
        feedback_text: submission.feedback_text,
        warn_threshold: config::runtime().warn_threshold,
    };

    let entry = submit_with_retry(state.store.as_ref(), request).await?;

    tracing::info!(
        transaction_id = %entry.transaction_id,
        decision = ?submission.decision,
        "analyst review recorded"
    );

    Ok(Json(json!({
        "message": "Review submitted",
        "transaction_id": entry.transaction_id,
        "decision": entry.decision,
    })))
}

/// A verdict is too valuable to drop on connection churn: transient storage
/// failures are retried before the error reaches the analyst.
async fn submit_with_retry(
    store: &dyn crate::storage::ReviewStore,
    request: DecisionSubmission,
) -> Result<ReviewQueueEntry, crate::storage::StorageError> {
    use crate::storage::StorageError;

    let mut last_err = None;
    for backoff_ms in std::iter::once(None).chain(SUBMIT_BACKOFF_MS.iter().copied().map(Some)) {
        if let Some(ms) = backoff_ms {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        match store.submit_decision(request.clone()).await {
            Ok(entry) => return Ok(entry),
            Err(StorageError::Transient(msg)) => {
                tracing::warn!("transient failure recording review: {}", msg);
                last_err = Some(StorageError::Transient(msg));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| StorageError::Unavailable("submit retries exhausted".into())))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub transaction_id: String,
    pub analyst_id: String,
}

/// Pre-assign a pending review to an analyst
pub async fn assign(
    State(state): State<AppState>,
    Json(req): Json<AssignRequest>,
) -> AppResult<Json<serde_json::Value>> {
    state.store.assign(&req.transaction_id, &req.analyst_id).await?;
    Ok(Json(json!({
        "message": "Review assigned",
        "transaction_id": req.transaction_id,
        "analyst_id": req.analyst_id,
    })))
}
