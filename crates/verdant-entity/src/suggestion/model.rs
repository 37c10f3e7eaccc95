//! Edit suggestion entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::SuggestionStatus;
use crate::changeset::ChangeOperation;
use crate::vegetable::Vegetable;

/// A contributor's proposed change to a vegetable.
///
/// Only `status`, `reviewed_by` and `updated_at` ever change after
/// creation. `snapshot` records what the contributor saw and is never used
/// as the base when merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EditSuggestion {
    /// Unique suggestion identifier.
    pub id: Uuid,
    /// The vegetable this suggestion edits (non-owning).
    pub target_id: Uuid,
    /// Structural diff from `snapshot` to the proposed state.
    #[sqlx(json)]
    pub diff: Vec<ChangeOperation>,
    /// Aggregate state at proposal time.
    #[sqlx(json)]
    pub snapshot: Vegetable,
    /// Review status.
    pub status: SuggestionStatus,
    /// Contributor who proposed the change.
    pub created_by: Uuid,
    /// Reviewer who merged or rejected it.
    pub reviewed_by: Option<Uuid>,
    /// When the suggestion was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new suggestion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSuggestion {
    /// Target vegetable.
    pub target_id: Uuid,
    /// Materialized diff (no inline image payloads).
    pub diff: Vec<ChangeOperation>,
    /// Aggregate state at proposal time.
    pub snapshot: Vegetable,
    /// Contributor.
    pub created_by: Uuid,
}

impl EditSuggestion {
    /// Build a new pending suggestion from creation data.
    pub fn pending(data: CreateSuggestion) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            target_id: data.target_id,
            diff: data.diff,
            snapshot: data.snapshot,
            status: SuggestionStatus::PendingReview,
            created_by: data.created_by,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a reviewer may still act on this suggestion.
    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::PendingReview
    }
}
