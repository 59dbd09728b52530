//! PostgreSQL review store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::engine::types::Priority;

use super::{
    DecisionSubmission, FeedbackRecord, NewReviewEntry, ReviewQueueEntry, ReviewStore,
    StorageError, StorageResult,
};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Apply the schema
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;
    tracing::info!("database schema applied");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Pending and resolved human reviews
CREATE TABLE IF NOT EXISTS review_queue (
    id UUID PRIMARY KEY,
    transaction_id TEXT NOT NULL UNIQUE,
    trust_score INT NOT NULL,
    priority TEXT NOT NULL,
    request_json JSONB NOT NULL,
    subscores_json JSONB NOT NULL,
    sla_deadline TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    reviewed BOOLEAN NOT NULL DEFAULT FALSE,
    analyst_id TEXT,
    decision TEXT,
    feedback_text TEXT
);

-- Labeled analyst verdicts staged for retraining; append-only
CREATE TABLE IF NOT EXISTS feedback_log (
    id BIGSERIAL PRIMARY KEY,
    transaction_id TEXT NOT NULL,
    original_trust_score INT NOT NULL,
    original_subscores_json JSONB NOT NULL,
    analyst_decision TEXT NOT NULL,
    correct_label SMALLINT NOT NULL,
    model_was_correct SMALLINT NOT NULL,
    used_for_retraining BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_review_pending ON review_queue(reviewed, created_at);
CREATE INDEX IF NOT EXISTS idx_review_priority ON review_queue(priority);
CREATE INDEX IF NOT EXISTS idx_review_sla ON review_queue(sla_deadline);
CREATE INDEX IF NOT EXISTS idx_feedback_unused ON feedback_log(used_for_retraining, created_at);
CREATE INDEX IF NOT EXISTS idx_feedback_txid ON feedback_log(transaction_id);
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageError::Transient(err.to_string())
        }
        _ => StorageError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn enqueue(&self, entry: NewReviewEntry) -> StorageResult<ReviewQueueEntry> {
        let inserted = sqlx::query_as::<_, ReviewQueueEntry>(
            r#"
            INSERT INTO review_queue
                (id, transaction_id, trust_score, priority, request_json, subscores_json, sla_deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.transaction_id)
        .bind(entry.trust_score)
        .bind(entry.priority.as_str())
        .bind(&entry.request_json)
        .bind(&entry.subscores_json)
        .bind(entry.sla_deadline)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = inserted {
            return Ok(row);
        }

        // Conflict: the entry already exists; return it unchanged
        sqlx::query_as::<_, ReviewQueueEntry>(
            "SELECT * FROM review_queue WHERE transaction_id = $1",
        )
        .bind(&entry.transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StorageError::Unavailable("enqueue conflict row vanished".into()))
    }

    async fn list_pending(
        &self,
        limit: i64,
        priority: Option<Priority>,
    ) -> StorageResult<Vec<ReviewQueueEntry>> {
        let rows = match priority {
            Some(p) => {
                sqlx::query_as::<_, ReviewQueueEntry>(
                    r#"
                    SELECT * FROM review_queue
                    WHERE reviewed = FALSE AND priority = $2
                    ORDER BY created_at DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .bind(p.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ReviewQueueEntry>(
                    r#"
                    SELECT * FROM review_queue
                    WHERE reviewed = FALSE
                    ORDER BY created_at DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        };
        rows.map_err(map_sqlx)
    }

    async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> StorageResult<Option<ReviewQueueEntry>> {
        sqlx::query_as::<_, ReviewQueueEntry>(
            "SELECT * FROM review_queue WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn submit_decision(
        &self,
        submission: DecisionSubmission,
    ) -> StorageResult<ReviewQueueEntry> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Per-row exclusion: concurrent submissions serialize here
        let entry = sqlx::query_as::<_, ReviewQueueEntry>(
            "SELECT * FROM review_queue WHERE transaction_id = $1 FOR UPDATE",
        )
        .bind(&submission.transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| StorageError::NotFound(submission.transaction_id.clone()))?;

        if entry.reviewed {
            return Err(StorageError::AlreadyReviewed(submission.transaction_id));
        }

        let updated = sqlx::query_as::<_, ReviewQueueEntry>(
            r#"
            UPDATE review_queue
            SET reviewed = TRUE, analyst_id = $2, decision = $3, feedback_text = $4
            WHERE transaction_id = $1
            RETURNING *
            "#,
        )
        .bind(&submission.transaction_id)
        .bind(&submission.analyst_id)
        .bind(submission.decision.as_str())
        .bind(&submission.feedback_text)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        // Feedback append rides the same transaction: both land or neither
        sqlx::query(
            r#"
            INSERT INTO feedback_log
                (transaction_id, original_trust_score, original_subscores_json,
                 analyst_decision, correct_label, model_was_correct)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&updated.transaction_id)
        .bind(updated.trust_score)
        .bind(&updated.subscores_json)
        .bind(submission.decision.as_str())
        .bind(submission.correct_label())
        .bind(submission.model_was_correct(updated.trust_score))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(updated)
    }

    async fn assign(&self, transaction_id: &str, analyst_id: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE review_queue
            SET analyst_id = $2
            WHERE transaction_id = $1 AND reviewed = FALSE
            "#,
        )
        .bind(transaction_id)
        .bind(analyst_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(transaction_id.to_string()));
        }
        Ok(())
    }

    async fn count_pending(&self) -> StorageResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM review_queue WHERE reviewed = FALSE",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> StorageResult<Vec<ReviewQueueEntry>> {
        sqlx::query_as::<_, ReviewQueueEntry>(
            r#"
            SELECT * FROM review_queue
            WHERE reviewed = FALSE AND sla_deadline < $1
            ORDER BY sla_deadline ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn pending_feedback(&self, min_samples: i64) -> StorageResult<Vec<FeedbackRecord>> {
        sqlx::query_as::<_, FeedbackRecord>(
            r#"
            SELECT * FROM feedback_log
            WHERE used_for_retraining = FALSE
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(min_samples.max(0) * 2)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn mark_used(&self, transaction_ids: &[String]) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE feedback_log
            SET used_for_retraining = TRUE
            WHERE used_for_retraining = FALSE AND transaction_id = ANY($1)
            "#,
        )
        .bind(transaction_ids)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn is_reachable(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
