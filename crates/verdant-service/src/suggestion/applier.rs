//! Replays a stored diff onto the live aggregate for review.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use verdant_changeset::{IdentityKeys, apply_changes, changed_root_fields, normalize};
use verdant_core::error::AppError;
use verdant_core::result::AppResult;
use verdant_database::traits::VegetableRepository;
use verdant_entity::suggestion::{EditSuggestion, SuggestionStatus};
use verdant_entity::vegetable::Vegetable;

/// What a reviewer sees, and what a merge writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPreview {
    /// Live aggregate with the suggestion applied, in canonical shape.
    pub to_render: Value,
    /// Root fields the suggestion changes, each with its entire new value.
    pub data_that_changed: BTreeMap<String, Value>,
    /// Revision of the live aggregate the preview was built from.
    pub base_revision: i64,
}

impl ReviewPreview {
    /// Whether applying the suggestion changes nothing on the live aggregate.
    pub fn is_noop(&self) -> bool {
        self.data_that_changed.is_empty()
    }

    /// The proposed aggregate as a typed value, for validation.
    pub fn proposed_vegetable(&self) -> AppResult<Vegetable> {
        let mut vegetable: Vegetable = serde_json::from_value(self.to_render.clone())?;
        vegetable.revision = self.base_revision;
        Ok(vegetable)
    }
}

/// Rebuilds proposed states against the current store contents.
///
/// The suggestion's snapshot is never the base: the diff is always applied
/// to whatever the store holds now.
#[derive(Debug, Clone)]
pub struct ChangesetApplier {
    vegetables: Arc<dyn VegetableRepository>,
    keys: IdentityKeys,
}

impl ChangesetApplier {
    /// Creates an applier over a vegetable repository.
    pub fn new(vegetables: Arc<dyn VegetableRepository>, keys: IdentityKeys) -> Self {
        Self { vegetables, keys }
    }

    /// Build the review preview of a suggestion.
    pub async fn reconstruct(&self, suggestion: &EditSuggestion) -> AppResult<ReviewPreview> {
        let live = self
            .vegetables
            .find_aggregate(suggestion.target_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Vegetable {} targeted by suggestion {} not found",
                    suggestion.target_id, suggestion.id
                ))
            })?;
        let base_revision = live.revision;
        let current = normalize(&live, &self.keys)?;

        if suggestion.status == SuggestionStatus::Merged {
            return Ok(ReviewPreview {
                to_render: current,
                data_that_changed: BTreeMap::new(),
                base_revision,
            });
        }

        let mut proposed = current.clone();
        apply_changes(&mut proposed, &suggestion.diff, &self.keys)?;
        let data_that_changed = changed_root_fields(&current, &proposed);

        debug!(
            suggestion_id = %suggestion.id,
            base_revision,
            changed_fields = data_that_changed.len(),
            "Reconstructed suggestion"
        );

        Ok(ReviewPreview {
            to_render: proposed,
            data_that_changed,
            base_revision,
        })
    }
}
