//! Retraining export endpoints
//!
//! The training pipeline is an external consumer: it pulls unexported
//! feedback rows, trains, then flags what it consumed. Nothing is deleted.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppResult;
use crate::storage::{FeedbackRecord, ReviewStore};
use crate::AppState;

const DEFAULT_MIN_SAMPLES: i64 = 100;

#[derive(Debug, Deserialize, Default)]
pub struct PendingFilter {
    pub min_samples: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PendingFeedbackResponse {
    pub count: usize,
    /// True when fewer rows exist than the requested minimum; the exporter
    /// should wait for more labels
    pub below_minimum: bool,
    pub records: Vec<FeedbackRecord>,
}

/// Unexported feedback rows, newest first, capped at 2x min_samples
pub async fn pending(
    State(state): State<AppState>,
    Query(filter): Query<PendingFilter>,
) -> AppResult<Json<PendingFeedbackResponse>> {
    let min_samples = filter.min_samples.unwrap_or(DEFAULT_MIN_SAMPLES).max(1);
    let records = state.store.pending_feedback(min_samples).await?;

    Ok(Json(PendingFeedbackResponse {
        count: records.len(),
        below_minimum: (records.len() as i64) < min_samples,
        records,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MarkUsedRequest {
    pub transaction_ids: Vec<String>,
}

/// Flag exported rows as consumed by the trainer
pub async fn mark_used(
    State(state): State<AppState>,
    Json(req): Json<MarkUsedRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let updated = state.store.mark_used(&req.transaction_ids).await?;
    tracing::info!(updated, "feedback rows marked used for retraining");
    Ok(Json(json!({ "updated": updated })))
}
