//! Repository traits the service layer depends on.

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use verdant_core::result::AppResult;
use verdant_entity::suggestion::{EditSuggestion, SuggestionStatus};
use verdant_entity::vegetable::{
    ImageRecord, SourceRecord, TipRecord, VarietyRecord, Vegetable, VegetableRecord,
    VegetableSummary,
};

/// One write of a merge, in the order the executor performs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStep {
    /// Read and lock the target's root row.
    LockTarget,
    /// Upsert every changed source.
    Sources,
    /// Upsert every changed image.
    Images,
    /// Upsert every changed variety.
    Varieties,
    /// Upsert every changed tip.
    Tips,
    /// Update the root row and bump its revision.
    Root,
    /// Synchronize friendship links.
    Friendships,
    /// Mark the suggestion merged.
    Status,
    /// Commit the transaction.
    Commit,
}

impl MergeStep {
    /// Human-readable step name used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockTarget => "lock target",
            Self::Sources => "upsert sources",
            Self::Images => "upsert images",
            Self::Varieties => "upsert varieties",
            Self::Tips => "upsert tips",
            Self::Root => "update vegetable",
            Self::Friendships => "sync friendships",
            Self::Status => "mark suggestion merged",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to vegetable aggregates and the entry point for merges.
#[async_trait]
pub trait VegetableRepository: Send + Sync + fmt::Debug + 'static {
    /// Load a full aggregate, or `None` if the vegetable does not exist.
    async fn find_aggregate(&self, id: Uuid) -> AppResult<Option<Vegetable>>;

    /// Summaries of the given vegetables. Unknown ids are omitted.
    async fn find_summaries(&self, ids: &[Uuid]) -> AppResult<Vec<VegetableSummary>>;

    /// Open a merge transaction.
    async fn begin_merge(&self) -> AppResult<Box<dyn MergeTransaction>>;
}

/// A transaction exclusively owned by one merge.
///
/// Dropping the transaction without calling [`MergeTransaction::commit`]
/// discards every write made through it.
#[async_trait]
pub trait MergeTransaction: Send {
    /// Read the root row of `id`, holding it until the transaction ends.
    async fn lock_root(&mut self, id: Uuid) -> AppResult<Option<VegetableRecord>>;

    /// Insert or overwrite sources.
    async fn upsert_sources(&mut self, sources: &[SourceRecord]) -> AppResult<()>;

    /// Insert or overwrite images. Referenced sources must exist.
    async fn upsert_images(&mut self, images: &[ImageRecord]) -> AppResult<()>;

    /// Insert or overwrite varieties. Referenced images must exist.
    async fn upsert_varieties(&mut self, varieties: &[VarietyRecord]) -> AppResult<()>;

    /// Insert or overwrite tips. Referenced sources must exist.
    async fn upsert_tips(&mut self, tips: &[TipRecord]) -> AppResult<()>;

    /// Overwrite the root row if its revision is still `expected_revision`,
    /// bumping the revision. Fails with `Conflict` otherwise.
    async fn update_root(
        &mut self,
        root: &VegetableRecord,
        expected_revision: i64,
    ) -> AppResult<VegetableRecord>;

    /// Make `friend_ids` the exact set of friends of `vegetable_id`.
    ///
    /// Existing links are kept, missing ones inserted, and links of the
    /// vegetable no longer listed deleted.
    async fn sync_friendships(&mut self, vegetable_id: Uuid, friend_ids: &[Uuid]) -> AppResult<()>;

    /// Move a pending suggestion to `MERGED`. Fails with `Conflict` if the
    /// suggestion is no longer pending.
    async fn mark_merged(&mut self, suggestion_id: Uuid, reviewer: Uuid) -> AppResult<()>;

    /// Commit every write.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Persistence of edit suggestions.
#[async_trait]
pub trait SuggestionRepository: Send + Sync + fmt::Debug + 'static {
    /// Insert a new suggestion.
    async fn create(&self, suggestion: &EditSuggestion) -> AppResult<EditSuggestion>;

    /// Find a suggestion by id.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EditSuggestion>>;

    /// Move a pending suggestion to `status`.
    ///
    /// Returns `None` when no pending suggestion with that id exists.
    async fn transition(
        &self,
        id: Uuid,
        status: SuggestionStatus,
        reviewer: Option<Uuid>,
    ) -> AppResult<Option<EditSuggestion>>;

    /// Suggestions targeting one vegetable, newest first, optionally
    /// filtered by status.
    async fn find_by_target(
        &self,
        target_id: Uuid,
        status: Option<SuggestionStatus>,
    ) -> AppResult<Vec<EditSuggestion>>;
}
