//! PaySentry — pre-transaction fraud screening service
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         PAYSENTRY                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌────────────────────────────────────────┐  │
//! │  │  API     │   │  Scoring Coordinator                   │  │
//! │  │  (Axum)  │──▶│  Phish │ QR │ Collect │ Malware        │  │
//! │  └────┬─────┘   │  → Aggregator → HITL → Explainer       │  │
//! │       │         └───────────────────┬────────────────────┘  │
//! │       ▼                             ▼                        │
//! │  ┌──────────────┐          ┌─────────────────┐              │
//! │  │ Analyst API  │─────────▶│  PostgreSQL     │              │
//! │  │ (review/feed)│          │  queue+feedback │              │
//! │  └──────────────┘          └─────────────────┘              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod engine;
mod error;
mod handlers;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

use crate::engine::model;
use crate::storage::{memory::MemoryStore, pg, ReviewStore};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "paysentry=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let app_config = config::Config::from_env();
    let runtime_config = config::RuntimeConfig::from_env();

    if let Err(e) = runtime_config.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
    config::install(runtime_config);

    tracing::info!("PaySentry starting...");

    // Load detector models; missing artifacts leave detectors rule-only
    let loaded = model::load_all(&app_config.model_dir);
    if loaded < engine::types::DetectorId::ALL.len() {
        tracing::warn!(
            loaded,
            "not all detector models loaded; affected detectors run rule-only"
        );
    }

    // Storage
    let store: Arc<dyn ReviewStore> = if app_config.database_url == "memory" {
        tracing::warn!("using in-memory review store; reviews will not survive restart");
        Arc::new(MemoryStore::new())
    } else {
        let pool = pg::create_pool(&app_config.database_url)
            .await
            .expect("Failed to create database pool");
        pg::run_migrations(&pool).await.expect("Failed to run migrations");
        Arc::new(pg::PgStore::new(pool))
    };

    let state = AppState {
        store,
        config: app_config.clone(),
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], app_config.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind listener");
    axum::serve(listener, app).await.expect("server error");
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReviewStore>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api", get(handlers::health::info))
        // Scoring
        .route("/api/v1/score_request", post(handlers::score::score_request))
        // Analyst
        .route("/api/v1/analyst/review_queue", get(handlers::analyst::review_queue))
        .route("/api/v1/analyst/review_queue/overdue", get(handlers::analyst::overdue))
        .route("/api/v1/analyst/review", post(handlers::analyst::submit_review))
        .route("/api/v1/analyst/assign", post(handlers::analyst::assign))
        // Retraining export
        .route("/api/v1/retrain/pending", get(handlers::retrain::pending))
        .route("/api/v1/retrain/mark_used", post(handlers::retrain::mark_used))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
