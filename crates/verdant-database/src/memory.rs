//! In-memory store using a Tokio mutex for single-node deployments and tests.
//!
//! A merge transaction holds the store lock from `begin_merge` until it is
//! committed or dropped and writes to a staged copy of the state; commit
//! swaps the copy in. Referential checks mirror the ordering constraints of
//! the relational schema.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use verdant_core::error::AppError;
use verdant_core::result::AppResult;
use verdant_entity::suggestion::{EditSuggestion, SuggestionStatus};
use verdant_entity::vegetable::{
    AggregateRows, FriendshipRecord, ImageRecord, SourceRecord, TipRecord, VarietyRecord,
    Vegetable, VegetableRecord, VegetableSummary,
};

use crate::traits::{MergeStep, MergeTransaction, SuggestionRepository, VegetableRepository};

#[derive(Debug, Clone, Default)]
struct InnerState {
    vegetables: HashMap<Uuid, VegetableRecord>,
    sources: HashMap<Uuid, SourceRecord>,
    images: HashMap<Uuid, ImageRecord>,
    varieties: HashMap<Uuid, VarietyRecord>,
    tips: HashMap<Uuid, TipRecord>,
    friendships: BTreeMap<String, FriendshipRecord>,
    suggestions: HashMap<Uuid, EditSuggestion>,
    fail_at: Option<MergeStep>,
}

impl InnerState {
    fn rows_for(&self, root: &VegetableRecord) -> AggregateRows {
        let varieties: HashMap<Uuid, VarietyRecord> = root
            .variety_ids
            .iter()
            .filter_map(|id| self.varieties.get(id))
            .map(|v| (v.id, v.clone()))
            .collect();
        let tips: HashMap<Uuid, TipRecord> = root
            .tip_ids
            .iter()
            .filter_map(|id| self.tips.get(id))
            .map(|t| (t.id, t.clone()))
            .collect();
        let images: HashMap<Uuid, ImageRecord> = root
            .photo_ids
            .iter()
            .chain(varieties.values().flat_map(|v| v.photo_ids.iter()))
            .filter_map(|id| self.images.get(id))
            .map(|i| (i.id, i.clone()))
            .collect();
        let sources = root
            .source_ids
            .iter()
            .chain(images.values().flat_map(|i| i.source_ids.iter()))
            .chain(varieties.values().flat_map(|v| v.source_ids.iter()))
            .chain(tips.values().flat_map(|t| t.source_ids.iter()))
            .filter_map(|id| self.sources.get(id))
            .map(|s| (s.id, s.clone()))
            .collect();
        let friend_ids = self
            .friendships
            .values()
            .filter_map(|link| link.other(root.id))
            .collect();

        AggregateRows {
            sources,
            images,
            varieties,
            tips,
            friend_ids,
        }
    }

    fn aggregate(&self, id: Uuid) -> Option<Vegetable> {
        let root = self.vegetables.get(&id)?;
        Some(self.rows_for(root).assemble(root))
    }
}

/// Number of rows per table, for inspecting the store in tests and tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    /// Vegetable root rows.
    pub vegetables: usize,
    /// Source rows.
    pub sources: usize,
    /// Image rows.
    pub images: usize,
    /// Variety rows.
    pub varieties: usize,
    /// Tip rows.
    pub tips: usize,
    /// Friendship links.
    pub friendships: usize,
    /// Edit suggestions.
    pub suggestions: usize,
}

/// In-memory vegetable and suggestion store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a full aggregate, including its friendship links.
    pub async fn insert_aggregate(&self, vegetable: &Vegetable) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let record = VegetableRecord::from_aggregate(vegetable);

        let all_sources = vegetable
            .sources
            .iter()
            .chain(vegetable.all_photos().flat_map(|p| p.sources.iter()))
            .chain(vegetable.varieties.iter().flat_map(|v| v.sources.iter()))
            .chain(vegetable.tips.iter().flat_map(|t| t.sources.iter()));
        for source in all_sources {
            state.sources.insert(source.id, SourceRecord::from(source));
        }

        for photo in vegetable.all_photos() {
            let Some(storage_id) = photo.image.storage_id() else {
                return Err(AppError::invalid_input(format!(
                    "Photo {} has not been uploaded",
                    photo.id
                )));
            };
            state.images.insert(
                photo.id,
                ImageRecord {
                    id: photo.id,
                    storage_id: storage_id.to_string(),
                    label: photo.label.clone(),
                    source_ids: photo.sources.iter().map(|s| s.id).collect(),
                },
            );
        }

        for variety in &vegetable.varieties {
            state.varieties.insert(
                variety.id,
                VarietyRecord {
                    id: variety.id,
                    vegetable_id: vegetable.id,
                    names: variety.names.clone(),
                    handle: variety.handle.clone(),
                    photo_ids: variety.photos.iter().map(|p| p.id).collect(),
                    source_ids: variety.sources.iter().map(|s| s.id).collect(),
                },
            );
        }

        for tip in &vegetable.tips {
            state.tips.insert(
                tip.id,
                TipRecord {
                    id: tip.id,
                    vegetable_id: vegetable.id,
                    subjects: tip.subjects.clone(),
                    content: tip.content.clone(),
                    handle: tip.handle.clone(),
                    source_ids: tip.sources.iter().map(|s| s.id).collect(),
                },
            );
        }

        for friend in &vegetable.friends {
            let link = FriendshipRecord::between(vegetable.id, friend.id);
            state.friendships.insert(link.id.clone(), link);
        }

        info!(vegetable_id = %vegetable.id, handle = %vegetable.handle, "Vegetable stored");
        state.vegetables.insert(vegetable.id, record);
        Ok(())
    }

    /// Make the next merge transactions fail when they reach `step`.
    pub async fn fail_merge_at(&self, step: Option<MergeStep>) {
        self.state.lock().await.fail_at = step;
    }

    /// Every friendship link, ordered by pair id.
    pub async fn friendships(&self) -> Vec<FriendshipRecord> {
        self.state.lock().await.friendships.values().cloned().collect()
    }

    /// Current row counts.
    pub async fn row_counts(&self) -> RowCounts {
        let state = self.state.lock().await;
        RowCounts {
            vegetables: state.vegetables.len(),
            sources: state.sources.len(),
            images: state.images.len(),
            varieties: state.varieties.len(),
            tips: state.tips.len(),
            friendships: state.friendships.len(),
            suggestions: state.suggestions.len(),
        }
    }
}

#[async_trait]
impl VegetableRepository for MemoryStore {
    async fn find_aggregate(&self, id: Uuid) -> AppResult<Option<Vegetable>> {
        Ok(self.state.lock().await.aggregate(id))
    }

    async fn find_summaries(&self, ids: &[Uuid]) -> AppResult<Vec<VegetableSummary>> {
        let state = self.state.lock().await;
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let mut summaries: Vec<VegetableSummary> = state
            .vegetables
            .values()
            .filter(|v| wanted.contains(&v.id))
            .map(VegetableRecord::summary)
            .collect();
        summaries.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(summaries)
    }

    async fn begin_merge(&self) -> AppResult<Box<dyn MergeTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        let fail_at = guard.fail_at;
        Ok(Box::new(MemoryMergeTransaction {
            guard,
            staged,
            fail_at,
        }))
    }
}

/// A merge against the in-memory store.
#[derive(Debug)]
pub struct MemoryMergeTransaction {
    guard: OwnedMutexGuard<InnerState>,
    staged: InnerState,
    fail_at: Option<MergeStep>,
}

impl MemoryMergeTransaction {
    fn enter(&self, step: MergeStep) -> AppResult<()> {
        if self.fail_at == Some(step) {
            return Err(AppError::database(format!("Injected failure at step '{step}'")));
        }
        Ok(())
    }

    fn require<T>(map: &HashMap<Uuid, T>, ids: &[Uuid], owner: Uuid, what: &str) -> AppResult<()> {
        match ids.iter().find(|id| !map.contains_key(id)) {
            Some(missing) => Err(AppError::database(format!(
                "{owner} references missing {what} {missing}"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MergeTransaction for MemoryMergeTransaction {
    async fn lock_root(&mut self, id: Uuid) -> AppResult<Option<VegetableRecord>> {
        self.enter(MergeStep::LockTarget)?;
        Ok(self.staged.vegetables.get(&id).cloned())
    }

    async fn upsert_sources(&mut self, sources: &[SourceRecord]) -> AppResult<()> {
        self.enter(MergeStep::Sources)?;
        for source in sources {
            self.staged.sources.insert(source.id, source.clone());
        }
        Ok(())
    }

    async fn upsert_images(&mut self, images: &[ImageRecord]) -> AppResult<()> {
        self.enter(MergeStep::Images)?;
        for image in images {
            Self::require(&self.staged.sources, &image.source_ids, image.id, "source")?;
            self.staged.images.insert(image.id, image.clone());
        }
        Ok(())
    }

    async fn upsert_varieties(&mut self, varieties: &[VarietyRecord]) -> AppResult<()> {
        self.enter(MergeStep::Varieties)?;
        for variety in varieties {
            Self::require(&self.staged.images, &variety.photo_ids, variety.id, "image")?;
            Self::require(&self.staged.sources, &variety.source_ids, variety.id, "source")?;
            self.staged.varieties.insert(variety.id, variety.clone());
        }
        Ok(())
    }

    async fn upsert_tips(&mut self, tips: &[TipRecord]) -> AppResult<()> {
        self.enter(MergeStep::Tips)?;
        for tip in tips {
            Self::require(&self.staged.sources, &tip.source_ids, tip.id, "source")?;
            self.staged.tips.insert(tip.id, tip.clone());
        }
        Ok(())
    }

    async fn update_root(
        &mut self,
        root: &VegetableRecord,
        expected_revision: i64,
    ) -> AppResult<VegetableRecord> {
        self.enter(MergeStep::Root)?;
        let current_revision = self
            .staged
            .vegetables
            .get(&root.id)
            .map(|v| v.revision)
            .ok_or_else(|| AppError::not_found(format!("Vegetable {} not found", root.id)))?;
        if current_revision != expected_revision {
            return Err(AppError::conflict(format!(
                "Vegetable {} changed since revision {expected_revision}",
                root.id
            )));
        }

        Self::require(&self.staged.images, &root.photo_ids, root.id, "image")?;
        Self::require(&self.staged.sources, &root.source_ids, root.id, "source")?;
        Self::require(&self.staged.varieties, &root.variety_ids, root.id, "variety")?;
        Self::require(&self.staged.tips, &root.tip_ids, root.id, "tip")?;

        let mut updated = root.clone();
        updated.revision = current_revision + 1;
        updated.updated_at = Utc::now();
        self.staged.vegetables.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn sync_friendships(&mut self, vegetable_id: Uuid, friend_ids: &[Uuid]) -> AppResult<()> {
        self.enter(MergeStep::Friendships)?;
        Self::require(&self.staged.vegetables, friend_ids, vegetable_id, "friend")?;

        let keep: HashSet<String> = friend_ids
            .iter()
            .filter(|id| **id != vegetable_id)
            .map(|id| {
                let link = FriendshipRecord::between(vegetable_id, *id);
                let pair = link.id.clone();
                self.staged.friendships.entry(pair.clone()).or_insert(link);
                pair
            })
            .collect();

        let before = self.staged.friendships.len();
        self.staged
            .friendships
            .retain(|pair, link| keep.contains(pair) || link.other(vegetable_id).is_none());
        debug!(
            vegetable_id = %vegetable_id,
            kept = keep.len(),
            removed = before - self.staged.friendships.len(),
            "Synchronized friendships"
        );
        Ok(())
    }

    async fn mark_merged(&mut self, suggestion_id: Uuid, reviewer: Uuid) -> AppResult<()> {
        self.enter(MergeStep::Status)?;
        let suggestion = self
            .staged
            .suggestions
            .get_mut(&suggestion_id)
            .ok_or_else(|| AppError::not_found(format!("Suggestion {suggestion_id} not found")))?;
        if !suggestion.status.can_transition_to(SuggestionStatus::Merged) {
            return Err(AppError::conflict(format!(
                "Suggestion {suggestion_id} is already {}",
                suggestion.status
            )));
        }
        suggestion.status = SuggestionStatus::Merged;
        suggestion.reviewed_by = Some(reviewer);
        suggestion.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.enter(MergeStep::Commit)?;
        let Self {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl SuggestionRepository for MemoryStore {
    async fn create(&self, suggestion: &EditSuggestion) -> AppResult<EditSuggestion> {
        let mut state = self.state.lock().await;
        if state.suggestions.contains_key(&suggestion.id) {
            return Err(AppError::conflict(format!(
                "Suggestion {} already exists",
                suggestion.id
            )));
        }
        state.suggestions.insert(suggestion.id, suggestion.clone());
        Ok(suggestion.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EditSuggestion>> {
        Ok(self.state.lock().await.suggestions.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        status: SuggestionStatus,
        reviewer: Option<Uuid>,
    ) -> AppResult<Option<EditSuggestion>> {
        let mut state = self.state.lock().await;
        let Some(suggestion) = state.suggestions.get_mut(&id) else {
            return Ok(None);
        };
        if suggestion.status != SuggestionStatus::PendingReview {
            return Ok(None);
        }
        suggestion.status = status;
        if reviewer.is_some() {
            suggestion.reviewed_by = reviewer;
        }
        suggestion.updated_at = Utc::now();
        Ok(Some(suggestion.clone()))
    }

    async fn find_by_target(
        &self,
        target_id: Uuid,
        status: Option<SuggestionStatus>,
    ) -> AppResult<Vec<EditSuggestion>> {
        let state = self.state.lock().await;
        let mut found: Vec<EditSuggestion> = state
            .suggestions
            .values()
            .filter(|s| s.target_id == target_id)
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}
