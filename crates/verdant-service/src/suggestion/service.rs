//! Caller-facing suggestion operations.
//!
//! `propose_edit` and `review_suggestion` never return raw errors: every
//! failure is logged here and reduced to the opaque code of its kind.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use verdant_changeset::{IdentityKeys, normalize};
use verdant_core::config::{StorageConfig, SuggestionConfig};
use verdant_core::error::{AppError, ErrorKind};
use verdant_core::result::AppResult;
use verdant_core::traits::BlobStorage;
use verdant_database::traits::{SuggestionRepository, VegetableRepository};
use verdant_entity::suggestion::{EditSuggestion, ReviewDecision, SuggestionStatus};
use verdant_entity::vegetable::{Vegetable, VegetableSummary};

use super::applier::{ChangesetApplier, ReviewPreview};
use super::images::ImageMaterializer;
use super::merge::MergeExecutor;
use super::store::SuggestionStore;
use crate::batch::{BatchLoader, VegetableSummaryFetch};
use crate::context::RequestContext;

/// Result of proposing an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposeOutcome {
    /// The stored suggestion.
    pub suggestion_id: Option<Uuid>,
    /// Where to send the contributor next.
    pub redirect: Option<String>,
    /// Opaque failure code.
    pub error_code: Option<&'static str>,
}

/// Result of reviewing a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome {
    /// Status the suggestion ended in.
    pub status: Option<SuggestionStatus>,
    /// Where to send the reviewer next (approvals only).
    pub redirect: Option<String>,
    /// Opaque failure code.
    pub error_code: Option<&'static str>,
}

impl ProposeOutcome {
    /// Whether the suggestion was stored.
    pub fn is_ok(&self) -> bool {
        self.error_code.is_none()
    }
}

impl ReviewOutcome {
    /// Whether the decision was applied.
    pub fn is_ok(&self) -> bool {
        self.error_code.is_none()
    }
}

/// Everything a reviewer needs to judge a suggestion.
#[derive(Debug, Clone)]
pub struct ReviewScreen {
    /// The suggestion under review.
    pub suggestion: EditSuggestion,
    /// Its effect on the live aggregate.
    pub preview: ReviewPreview,
    /// Summaries of the friends in the proposed state.
    pub friends: Vec<VegetableSummary>,
}

/// Orchestrates proposing, previewing, and reviewing edit suggestions.
#[derive(Clone)]
pub struct SuggestionService {
    vegetables: Arc<dyn VegetableRepository>,
    store: SuggestionStore,
    applier: ChangesetApplier,
    executor: MergeExecutor,
    images: ImageMaterializer,
    friends: Arc<BatchLoader<Uuid, VegetableSummary>>,
    keys: IdentityKeys,
}

impl std::fmt::Debug for SuggestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionService")
            .field("images", &self.images)
            .field("keys", &self.keys)
            .finish()
    }
}

impl SuggestionService {
    /// Creates a new suggestion service.
    ///
    /// Must be called inside a tokio runtime: the friend lookup queue
    /// starts its flush task here.
    pub fn new(
        vegetables: Arc<dyn VegetableRepository>,
        suggestions: Arc<dyn SuggestionRepository>,
        storage: Arc<dyn BlobStorage>,
        suggestion_config: &SuggestionConfig,
        storage_config: &StorageConfig,
    ) -> Self {
        let keys = IdentityKeys::default();
        let friends = BatchLoader::<Uuid, VegetableSummary>::spawn(
            Arc::new(VegetableSummaryFetch::new(Arc::clone(&vegetables))),
            Duration::from_millis(suggestion_config.batch_interval_ms),
            suggestion_config.batch_max_size,
        );

        Self {
            store: SuggestionStore::new(suggestions),
            applier: ChangesetApplier::new(Arc::clone(&vegetables), keys.clone()),
            executor: MergeExecutor::new(Arc::clone(&vegetables)),
            images: ImageMaterializer::new(
                storage,
                suggestion_config.upload_concurrency,
                storage_config.max_image_size_bytes,
            ),
            friends: Arc::new(friends),
            vegetables,
            keys,
        }
    }

    /// Store a contributor's edit of `current` as a pending suggestion.
    pub async fn propose_edit(
        &self,
        ctx: &RequestContext,
        current: &Vegetable,
        updated: Vegetable,
    ) -> ProposeOutcome {
        match self.try_propose(ctx, current, updated).await {
            Ok(suggestion) => ProposeOutcome {
                suggestion_id: Some(suggestion.id),
                redirect: Some(format!("/sugestoes/{}", suggestion.id)),
                error_code: None,
            },
            Err(e) => ProposeOutcome {
                suggestion_id: None,
                redirect: None,
                error_code: Some(report("propose_edit", ctx, &e)),
            },
        }
    }

    async fn try_propose(
        &self,
        ctx: &RequestContext,
        current: &Vegetable,
        updated: Vegetable,
    ) -> AppResult<EditSuggestion> {
        if current.id != updated.id {
            return Err(AppError::invalid_input(format!(
                "Edit of vegetable {} carries id {}",
                current.id, updated.id
            )));
        }
        updated.validate()?;
        if self.vegetables.find_aggregate(current.id).await?.is_none() {
            return Err(AppError::not_found(format!(
                "Vegetable {} not found",
                current.id
            )));
        }

        let before = normalize(current, &self.keys)?;
        let after = normalize(&updated, &self.keys)?;
        let materialized = self.images.materialize(&before, after, &self.keys).await?;

        let created = if materialized.diff.is_empty() {
            Err(AppError::invalid_input("NO_CHANGES: the edit changes nothing"))
        } else {
            self.store
                .create(current.id, materialized.diff, current.clone(), ctx.user_id)
                .await
        };
        if created.is_err() {
            self.images.discard(&materialized.uploaded).await;
        }
        created
    }

    /// Approve or reject a pending suggestion.
    pub async fn review_suggestion(
        &self,
        ctx: &RequestContext,
        suggestion_id: &str,
        decision: ReviewDecision,
    ) -> ReviewOutcome {
        match self.try_review(ctx, suggestion_id, decision).await {
            Ok((status, redirect)) => ReviewOutcome {
                status: Some(status),
                redirect,
                error_code: None,
            },
            Err(e) => ReviewOutcome {
                status: None,
                redirect: None,
                error_code: Some(report("review_suggestion", ctx, &e)),
            },
        }
    }

    async fn try_review(
        &self,
        ctx: &RequestContext,
        suggestion_id: &str,
        decision: ReviewDecision,
    ) -> AppResult<(SuggestionStatus, Option<String>)> {
        if !ctx.can_review() {
            return Err(AppError::authorization(format!(
                "User {} may not review suggestions",
                ctx.user_id
            )));
        }

        let suggestion = self.store.get(suggestion_id).await?;
        if !suggestion.is_pending() {
            return Err(AppError::conflict(format!(
                "Suggestion {} is already {}",
                suggestion.id, suggestion.status
            )));
        }

        match decision {
            ReviewDecision::Reject => {
                let rejected = self
                    .store
                    .set_status(suggestion_id, decision.resulting_status(), Some(ctx.user_id))
                    .await?;
                Ok((rejected.status, None))
            }
            ReviewDecision::Approve => {
                let preview = self.applier.reconstruct(&suggestion).await?;
                preview.proposed_vegetable()?.validate()?;

                let merged = self
                    .executor
                    .merge(
                        &preview.data_that_changed,
                        suggestion.target_id,
                        suggestion.id,
                        ctx.user_id,
                        preview.base_revision,
                    )
                    .await?;

                info!(
                    suggestion_id = %suggestion.id,
                    reviewer = %ctx.user_id,
                    revision = merged.revision,
                    "Suggestion approved"
                );
                Ok((
                    decision.resulting_status(),
                    Some(format!("/vegetables/{}", merged.handle)),
                ))
            }
        }
    }

    /// Build the review screen of a suggestion.
    pub async fn preview(&self, ctx: &RequestContext, suggestion_id: &str) -> AppResult<ReviewScreen> {
        let suggestion = self.store.get(suggestion_id).await?;
        let preview = self.applier.reconstruct(&suggestion).await?;

        let friend_ids: Vec<Uuid> = preview
            .proposed_vegetable()?
            .friends
            .into_iter()
            .map(|f| f.id)
            .collect();
        let friends = self.friends.load_many(friend_ids).await?;

        info!(
            suggestion_id = %suggestion.id,
            user_id = %ctx.user_id,
            changed_fields = preview.data_that_changed.len(),
            "Suggestion previewed"
        );
        Ok(ReviewScreen {
            suggestion,
            preview,
            friends,
        })
    }

    /// Suggestions for one vegetable, newest first.
    pub async fn list_for_target(
        &self,
        target_id: &str,
        status: Option<SuggestionStatus>,
    ) -> AppResult<Vec<EditSuggestion>> {
        self.store.list_for_target(target_id, status).await
    }

    /// The live aggregate of a vegetable.
    pub async fn vegetable(&self, id: Uuid) -> AppResult<Vegetable> {
        self.vegetables
            .find_aggregate(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Vegetable {id} not found")))
    }
}

/// Log a failed operation and reduce it to its opaque code.
fn report(operation: &str, ctx: &RequestContext, e: &AppError) -> &'static str {
    match e.kind {
        ErrorKind::InvalidInput
        | ErrorKind::NotFound
        | ErrorKind::Authorization
        | ErrorKind::Conflict => {
            warn!(operation, user_id = %ctx.user_id, error = %e, "Suggestion operation refused");
        }
        _ => {
            error!(operation, user_id = %ctx.user_id, error = %e, "Suggestion operation failed");
        }
    }
    e.error_code()
}
