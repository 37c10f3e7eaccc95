//! PostgreSQL vegetable repository and merge transaction.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use verdant_core::error::{AppError, ErrorKind};
use verdant_core::result::AppResult;
use verdant_entity::suggestion::SuggestionStatus;
use verdant_entity::vegetable::{
    AggregateRows, FriendshipRecord, ImageRecord, SourceRecord, TipRecord, VarietyRecord,
    Vegetable, VegetableRecord, VegetableSummary,
};

use crate::traits::{MergeTransaction, VegetableRepository};

/// Repository for vegetable aggregates stored across the `vegetables`,
/// `sources`, `images`, `varieties`, `tips` and `friendships` tables.
#[derive(Debug, Clone)]
pub struct PgVegetableRepository {
    pool: PgPool,
}

impl PgVegetableRepository {
    /// Create a new vegetable repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_root(&self, id: Uuid) -> AppResult<Option<VegetableRecord>> {
        sqlx::query_as::<_, VegetableRecord>("SELECT * FROM vegetables WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find vegetable", e))
    }

    async fn load_rows(&self, root: &VegetableRecord) -> AppResult<AggregateRows> {
        let mut rows = AggregateRows::default();

        let varieties = sqlx::query_as::<_, VarietyRecord>("SELECT * FROM varieties WHERE id = ANY($1)")
            .bind(&root.variety_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load varieties", e))?;

        let tips = sqlx::query_as::<_, TipRecord>("SELECT * FROM tips WHERE id = ANY($1)")
            .bind(&root.tip_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load tips", e))?;

        let image_ids: Vec<Uuid> = root
            .photo_ids
            .iter()
            .chain(varieties.iter().flat_map(|v| v.photo_ids.iter()))
            .copied()
            .collect();
        let images = sqlx::query_as::<_, ImageRecord>("SELECT * FROM images WHERE id = ANY($1)")
            .bind(&image_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load images", e))?;

        let source_ids: Vec<Uuid> = root
            .source_ids
            .iter()
            .chain(images.iter().flat_map(|i| i.source_ids.iter()))
            .chain(varieties.iter().flat_map(|v| v.source_ids.iter()))
            .chain(tips.iter().flat_map(|t| t.source_ids.iter()))
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let sources = sqlx::query_as::<_, SourceRecord>("SELECT * FROM sources WHERE id = ANY($1)")
            .bind(&source_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load sources", e))?;

        rows.friend_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT CASE WHEN vegetable_a = $1 THEN vegetable_b ELSE vegetable_a END \
             FROM friendships WHERE vegetable_a = $1 OR vegetable_b = $1",
        )
        .bind(root.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load friendships", e))?;

        rows.varieties = varieties.into_iter().map(|v| (v.id, v)).collect();
        rows.tips = tips.into_iter().map(|t| (t.id, t)).collect();
        rows.images = images.into_iter().map(|i| (i.id, i)).collect();
        rows.sources = sources.into_iter().map(|s| (s.id, s)).collect();
        Ok(rows)
    }
}

#[async_trait]
impl VegetableRepository for PgVegetableRepository {
    async fn find_aggregate(&self, id: Uuid) -> AppResult<Option<Vegetable>> {
        let Some(root) = self.find_root(id).await? else {
            return Ok(None);
        };
        let rows = self.load_rows(&root).await?;
        Ok(Some(rows.assemble(&root)))
    }

    async fn find_summaries(&self, ids: &[Uuid]) -> AppResult<Vec<VegetableSummary>> {
        sqlx::query_as::<_, VegetableSummary>(
            "SELECT id, handle, names FROM vegetables WHERE id = ANY($1) ORDER BY handle",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load summaries", e))
    }

    async fn begin_merge(&self) -> AppResult<Box<dyn MergeTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        Ok(Box::new(PgMergeTransaction { tx }))
    }
}

/// A merge running inside one PostgreSQL transaction.
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
pub struct PgMergeTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgMergeTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgMergeTransaction").finish()
    }
}

#[async_trait]
impl MergeTransaction for PgMergeTransaction {
    async fn lock_root(&mut self, id: Uuid) -> AppResult<Option<VegetableRecord>> {
        sqlx::query_as::<_, VegetableRecord>("SELECT * FROM vegetables WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock vegetable", e))
    }

    async fn upsert_sources(&mut self, sources: &[SourceRecord]) -> AppResult<()> {
        for source in sources {
            sqlx::query(
                "INSERT INTO sources (id, source_type, credits, origin, comments, user_ids) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (id) DO UPDATE SET source_type = EXCLUDED.source_type, \
                 credits = EXCLUDED.credits, origin = EXCLUDED.origin, \
                 comments = EXCLUDED.comments, user_ids = EXCLUDED.user_ids",
            )
            .bind(source.id)
            .bind(source.source_type)
            .bind(&source.credits)
            .bind(&source.origin)
            .bind(&source.comments)
            .bind(&source.user_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert source", e))?;
        }
        debug!(count = sources.len(), "Upserted sources");
        Ok(())
    }

    async fn upsert_images(&mut self, images: &[ImageRecord]) -> AppResult<()> {
        for image in images {
            sqlx::query(
                "INSERT INTO images (id, storage_id, label, source_ids) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (id) DO UPDATE SET storage_id = EXCLUDED.storage_id, \
                 label = EXCLUDED.label, source_ids = EXCLUDED.source_ids",
            )
            .bind(image.id)
            .bind(&image.storage_id)
            .bind(&image.label)
            .bind(&image.source_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert image", e))?;
        }
        debug!(count = images.len(), "Upserted images");
        Ok(())
    }

    async fn upsert_varieties(&mut self, varieties: &[VarietyRecord]) -> AppResult<()> {
        for variety in varieties {
            sqlx::query(
                "INSERT INTO varieties (id, vegetable_id, names, handle, photo_ids, source_ids) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (id) DO UPDATE SET names = EXCLUDED.names, \
                 handle = EXCLUDED.handle, photo_ids = EXCLUDED.photo_ids, \
                 source_ids = EXCLUDED.source_ids",
            )
            .bind(variety.id)
            .bind(variety.vegetable_id)
            .bind(&variety.names)
            .bind(&variety.handle)
            .bind(&variety.photo_ids)
            .bind(&variety.source_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert variety", e))?;
        }
        debug!(count = varieties.len(), "Upserted varieties");
        Ok(())
    }

    async fn upsert_tips(&mut self, tips: &[TipRecord]) -> AppResult<()> {
        for tip in tips {
            sqlx::query(
                "INSERT INTO tips (id, vegetable_id, subjects, content, handle, source_ids) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (id) DO UPDATE SET subjects = EXCLUDED.subjects, \
                 content = EXCLUDED.content, handle = EXCLUDED.handle, \
                 source_ids = EXCLUDED.source_ids",
            )
            .bind(tip.id)
            .bind(tip.vegetable_id)
            .bind(&tip.subjects)
            .bind(&tip.content)
            .bind(&tip.handle)
            .bind(&tip.source_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert tip", e))?;
        }
        debug!(count = tips.len(), "Upserted tips");
        Ok(())
    }

    async fn update_root(
        &mut self,
        root: &VegetableRecord,
        expected_revision: i64,
    ) -> AppResult<VegetableRecord> {
        sqlx::query_as::<_, VegetableRecord>(
            "UPDATE vegetables SET names = $3, scientific_names = $4, handle = $5, gender = $6, \
             strata = $7, uses = $8, edible_parts = $9, height_min_cm = $10, height_max_cm = $11, \
             temperature_min = $12, temperature_max = $13, origin = $14, content = $15, \
             photo_ids = $16, source_ids = $17, variety_ids = $18, tip_ids = $19, \
             revision = revision + 1, updated_at = NOW() \
             WHERE id = $1 AND revision = $2 RETURNING *",
        )
        .bind(root.id)
        .bind(expected_revision)
        .bind(&root.names)
        .bind(&root.scientific_names)
        .bind(&root.handle)
        .bind(root.gender)
        .bind(Json(&root.strata))
        .bind(Json(&root.uses))
        .bind(Json(&root.edible_parts))
        .bind(root.height_min_cm)
        .bind(root.height_max_cm)
        .bind(root.temperature_min)
        .bind(root.temperature_max)
        .bind(&root.origin)
        .bind(&root.content)
        .bind(&root.photo_ids)
        .bind(&root.source_ids)
        .bind(&root.variety_ids)
        .bind(&root.tip_ids)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update vegetable", e))?
        .ok_or_else(|| {
            AppError::conflict(format!(
                "Vegetable {} changed since revision {expected_revision}",
                root.id
            ))
        })
    }

    async fn sync_friendships(&mut self, vegetable_id: Uuid, friend_ids: &[Uuid]) -> AppResult<()> {
        let links: Vec<FriendshipRecord> = friend_ids
            .iter()
            .filter(|id| **id != vegetable_id)
            .map(|id| FriendshipRecord::between(vegetable_id, *id))
            .collect();

        for link in &links {
            sqlx::query(
                "INSERT INTO friendships (id, vegetable_a, vegetable_b) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&link.id)
            .bind(link.vegetable_a)
            .bind(link.vegetable_b)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to insert friendship", e)
            })?;
        }

        let keep: Vec<String> = links.into_iter().map(|l| l.id).collect();
        let removed = sqlx::query(
            "DELETE FROM friendships WHERE (vegetable_a = $1 OR vegetable_b = $1) \
             AND NOT (id = ANY($2))",
        )
        .bind(vegetable_id)
        .bind(&keep)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to prune friendships", e))?
        .rows_affected();

        debug!(vegetable_id = %vegetable_id, kept = keep.len(), removed, "Synchronized friendships");
        Ok(())
    }

    async fn mark_merged(&mut self, suggestion_id: Uuid, reviewer: Uuid) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE edit_suggestions SET status = $2, reviewed_by = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(suggestion_id)
        .bind(SuggestionStatus::Merged)
        .bind(reviewer)
        .bind(SuggestionStatus::PendingReview)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark suggestion", e))?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::conflict(format!(
                "Suggestion {suggestion_id} is no longer pending review"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit merge", e))
    }
}
