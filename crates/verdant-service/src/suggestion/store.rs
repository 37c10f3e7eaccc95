//! Suggestion persistence with caller-supplied ids.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use verdant_core::error::AppError;
use verdant_core::result::AppResult;
use verdant_core::types::id::{SuggestionId, VegetableId};
use verdant_database::traits::SuggestionRepository;
use verdant_entity::changeset::ChangeOperation;
use verdant_entity::suggestion::{CreateSuggestion, EditSuggestion, SuggestionStatus};
use verdant_entity::vegetable::Vegetable;

/// Creates, reads, and transitions edit suggestions.
#[derive(Debug, Clone)]
pub struct SuggestionStore {
    /// Suggestion repository.
    repo: Arc<dyn SuggestionRepository>,
}

impl SuggestionStore {
    /// Creates a new suggestion store.
    pub fn new(repo: Arc<dyn SuggestionRepository>) -> Self {
        Self { repo }
    }

    /// Persist a new pending suggestion.
    pub async fn create(
        &self,
        target_id: Uuid,
        diff: Vec<ChangeOperation>,
        snapshot: Vegetable,
        author: Uuid,
    ) -> AppResult<EditSuggestion> {
        let suggestion = EditSuggestion::pending(CreateSuggestion {
            target_id,
            diff,
            snapshot,
            created_by: author,
        });
        let created = self.repo.create(&suggestion).await?;

        info!(
            suggestion_id = %created.id,
            target_id = %created.target_id,
            author = %author,
            operations = created.diff.len(),
            "Suggestion created"
        );
        Ok(created)
    }

    /// Fetch a suggestion by its textual id.
    pub async fn get(&self, id: &str) -> AppResult<EditSuggestion> {
        let id = SuggestionId::parse(id)?;
        self.repo
            .find_by_id(id.into_uuid())
            .await?
            .ok_or_else(|| AppError::not_found(format!("Suggestion {id} not found")))
    }

    /// Move a pending suggestion to a terminal status.
    pub async fn set_status(
        &self,
        id: &str,
        status: SuggestionStatus,
        reviewer: Option<Uuid>,
    ) -> AppResult<EditSuggestion> {
        if !status.is_terminal() {
            return Err(AppError::invalid_input(format!(
                "A suggestion cannot be moved to {status}"
            )));
        }
        let id = SuggestionId::parse(id)?;

        match self.repo.transition(id.into_uuid(), status, reviewer).await? {
            Some(updated) => {
                info!(suggestion_id = %id, status = %status, "Suggestion status changed");
                Ok(updated)
            }
            None => match self.repo.find_by_id(id.into_uuid()).await? {
                Some(existing) => Err(AppError::conflict(format!(
                    "Suggestion {id} is already {}",
                    existing.status
                ))),
                None => Err(AppError::not_found(format!("Suggestion {id} not found"))),
            },
        }
    }

    /// Suggestions for one vegetable, newest first.
    pub async fn list_for_target(
        &self,
        target_id: &str,
        status: Option<SuggestionStatus>,
    ) -> AppResult<Vec<EditSuggestion>> {
        let target_id = VegetableId::parse(target_id)?;
        self.repo.find_by_target(target_id.into_uuid(), status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_core::error::ErrorKind;
    use verdant_database::MemoryStore;

    fn carrot() -> Vegetable {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "names": ["Cenoura"],
            "handle": "cenoura"
        }))
        .unwrap()
    }

    async fn seeded() -> (SuggestionStore, Vegetable) {
        let memory = MemoryStore::new();
        let vegetable = carrot();
        memory.insert_aggregate(&vegetable).await.unwrap();
        (SuggestionStore::new(Arc::new(memory)), vegetable)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (store, vegetable) = seeded().await;
        let created = store
            .create(vegetable.id, vec![], vegetable.clone(), Uuid::new_v4())
            .await
            .unwrap();

        let fetched = store.get(&created.id.to_string()).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, SuggestionStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_get_rejects_malformed_and_missing_ids() {
        let (store, _) = seeded().await;
        let err = store.get("not-a-uuid").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);

        let err = store.get(&Uuid::new_v4().to_string()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_terminal_status_cannot_change() {
        let (store, vegetable) = seeded().await;
        let created = store
            .create(vegetable.id, vec![], vegetable, Uuid::new_v4())
            .await
            .unwrap();
        let id = created.id.to_string();

        store
            .set_status(&id, SuggestionStatus::Rejected, Some(Uuid::new_v4()))
            .await
            .unwrap();
        let err = store
            .set_status(&id, SuggestionStatus::Merged, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = store
            .set_status(&id, SuggestionStatus::PendingReview, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }
}
