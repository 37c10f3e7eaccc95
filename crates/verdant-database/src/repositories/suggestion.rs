//! PostgreSQL edit suggestion repository.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use verdant_core::error::{AppError, ErrorKind};
use verdant_core::result::AppResult;
use verdant_entity::suggestion::{EditSuggestion, SuggestionStatus};

use crate::traits::SuggestionRepository;

/// Repository for the `edit_suggestions` table.
#[derive(Debug, Clone)]
pub struct PgSuggestionRepository {
    pool: PgPool,
}

impl PgSuggestionRepository {
    /// Create a new suggestion repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SuggestionRepository for PgSuggestionRepository {
    async fn create(&self, suggestion: &EditSuggestion) -> AppResult<EditSuggestion> {
        sqlx::query_as::<_, EditSuggestion>(
            "INSERT INTO edit_suggestions \
             (id, target_id, diff, snapshot, status, created_by, reviewed_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(suggestion.id)
        .bind(suggestion.target_id)
        .bind(Json(&suggestion.diff))
        .bind(Json(&suggestion.snapshot))
        .bind(suggestion.status)
        .bind(suggestion.created_by)
        .bind(suggestion.reviewed_by)
        .bind(suggestion.created_at)
        .bind(suggestion.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create suggestion", e))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EditSuggestion>> {
        sqlx::query_as::<_, EditSuggestion>("SELECT * FROM edit_suggestions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find suggestion", e))
    }

    async fn transition(
        &self,
        id: Uuid,
        status: SuggestionStatus,
        reviewer: Option<Uuid>,
    ) -> AppResult<Option<EditSuggestion>> {
        sqlx::query_as::<_, EditSuggestion>(
            "UPDATE edit_suggestions SET status = $2, reviewed_by = COALESCE($3, reviewed_by), \
             updated_at = NOW() WHERE id = $1 AND status = $4 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .bind(reviewer)
        .bind(SuggestionStatus::PendingReview)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update suggestion", e))
    }

    async fn find_by_target(
        &self,
        target_id: Uuid,
        status: Option<SuggestionStatus>,
    ) -> AppResult<Vec<EditSuggestion>> {
        sqlx::query_as::<_, EditSuggestion>(
            "SELECT * FROM edit_suggestions WHERE target_id = $1 \
             AND ($2::suggestion_status IS NULL OR status = $2) \
             ORDER BY created_at DESC",
        )
        .bind(target_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list suggestions", e))
    }
}
