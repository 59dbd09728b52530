//! Scoring handler

use axum::{extract::State, Json};

use crate::engine::coordinator::{self, ScoreResponse};
use crate::engine::types::TransactionRequest;
use crate::error::AppResult;
use crate::AppState;

/// Score a transaction for fraud risk
pub async fn score_request(
    State(state): State<AppState>,
    Json(req): Json<TransactionRequest>,
) -> AppResult<Json<ScoreResponse>> {
    tracing::debug!(transaction_id = %req.transaction_id, "scoring request");
    let response = coordinator::score(req, state.store.as_ref()).await?;
    tracing::debug!(
        transaction_id = %response.transaction_id,
        trust_score = response.trust_score,
        action = ?response.action,
        "scored"
    );
    Ok(Json(response))
}
