//! Health and service-info handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::json;

use crate::engine::model;
use crate::engine::types::DetectorId;
use crate::storage::ReviewStore;
use crate::AppState;

#[derive(Serialize)]
pub struct DetectorStates {
    phishing: bool,
    quishing: bool,
    collect: bool,
    malware: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    detectors: DetectorStates,
    review_queue_depth: i64,
}

/// Healthy iff every detector model loaded (or rule-only operation is
/// explicitly allowed) and storage answers.
pub async fn check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage_ok = state.store.is_reachable().await;
    let queue_depth = if storage_ok {
        state.store.count_pending().await.unwrap_or(0)
    } else {
        0
    };

    let all_loaded = model::loaded_count() == DetectorId::ALL.len();
    let healthy = storage_ok && (all_loaded || state.config.allow_degraded);

    let status = if !healthy {
        "unhealthy"
    } else if all_loaded {
        "healthy"
    } else {
        "degraded"
    };

    let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now().timestamp(),
            detectors: DetectorStates {
                phishing: model::is_loaded(DetectorId::Phishing),
                quishing: model::is_loaded(DetectorId::Quishing),
                collect: model::is_loaded(DetectorId::Collect),
                malware: model::is_loaded(DetectorId::Malware),
            },
            review_queue_depth: queue_depth,
        }),
    )
}

/// API information endpoint
pub async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "service": "paysentry",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "score_request": "/api/v1/score_request",
            "review_queue": "/api/v1/analyst/review_queue",
            "submit_review": "/api/v1/analyst/review"
        }
    }))
}
