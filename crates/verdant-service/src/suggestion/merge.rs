//! Transactional merge of a reviewed suggestion.
//!
//! The changed root fields of a [`ReviewPreview`](super::applier::ReviewPreview)
//! are turned into a [`MergePlan`] of row writes, which [`MergeExecutor`]
//! performs in dependency order inside one transaction:
//!
//! 1. sources (root, photo, variety photo and tip sources, deduplicated)
//! 2. images (root and variety photos)
//! 3. varieties
//! 4. tips
//! 5. the root row, guarded by the base revision
//! 6. friendship links
//! 7. the suggestion status
//!
//! Rows of children removed from the aggregate are left in place; only the
//! root's reference lists stop pointing at them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use verdant_core::error::{AppError, ErrorKind};
use verdant_core::result::AppResult;
use verdant_database::traits::{MergeStep, VegetableRepository};
use verdant_entity::vegetable::{
    Friend, ImageRecord, Photo, Source, SourceRecord, Tip, TipRecord, Variety, VarietyRecord,
    VegetableRecord,
};

/// Scalar root fields a merge may overwrite.
const ROOT_FIELDS: &[&str] = &[
    "names",
    "scientific_names",
    "handle",
    "gender",
    "strata",
    "uses",
    "edible_parts",
    "height_min_cm",
    "height_max_cm",
    "temperature_min",
    "temperature_max",
    "origin",
    "content",
];

/// Root fields stored as arrays; an absent value means empty.
const ARRAY_FIELDS: &[&str] = &["names", "scientific_names", "strata", "uses", "edible_parts"];

/// Row writes derived from the changed root fields of one suggestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    /// Sources to upsert.
    pub sources: Vec<SourceRecord>,
    /// Images to upsert.
    pub images: Vec<ImageRecord>,
    /// Varieties to upsert.
    pub varieties: Vec<VarietyRecord>,
    /// Tips to upsert.
    pub tips: Vec<TipRecord>,
    /// New values of scalar root fields.
    pub root_fields: BTreeMap<String, Value>,
    /// New root photo order, if photos changed.
    pub photo_ids: Option<Vec<Uuid>>,
    /// New root source order, if sources changed.
    pub source_ids: Option<Vec<Uuid>>,
    /// New variety order, if varieties changed.
    pub variety_ids: Option<Vec<Uuid>>,
    /// New tip order, if tips changed.
    pub tip_ids: Option<Vec<Uuid>>,
    /// New friend set, if friends changed.
    pub friend_ids: Option<Vec<Uuid>>,
}

impl MergePlan {
    /// Build the plan for the changed root fields of `target_id`.
    pub fn from_changes(target_id: Uuid, changes: &BTreeMap<String, Value>) -> AppResult<Self> {
        let mut plan = Self::default();
        let mut seen_sources = HashSet::new();

        for (field, value) in changes {
            match field.as_str() {
                "photos" => {
                    let photos: Vec<Photo> = collection(field, value)?;
                    plan.photo_ids = Some(photos.iter().map(|p| p.id).collect());
                    for photo in &photos {
                        plan.push_photo(photo, &mut seen_sources)?;
                    }
                }
                "sources" => {
                    let sources: Vec<Source> = collection(field, value)?;
                    plan.source_ids = Some(sources.iter().map(|s| s.id).collect());
                    plan.push_sources(&sources, &mut seen_sources);
                }
                "varieties" => {
                    let varieties: Vec<Variety> = collection(field, value)?;
                    plan.variety_ids = Some(varieties.iter().map(|v| v.id).collect());
                    for variety in &varieties {
                        for photo in &variety.photos {
                            plan.push_photo(photo, &mut seen_sources)?;
                        }
                        plan.push_sources(&variety.sources, &mut seen_sources);
                        plan.varieties.push(VarietyRecord {
                            id: variety.id,
                            vegetable_id: target_id,
                            names: variety.names.clone(),
                            handle: variety.handle.clone(),
                            photo_ids: variety.photos.iter().map(|p| p.id).collect(),
                            source_ids: variety.sources.iter().map(|s| s.id).collect(),
                        });
                    }
                }
                "tips" => {
                    let tips: Vec<Tip> = collection(field, value)?;
                    plan.tip_ids = Some(tips.iter().map(|t| t.id).collect());
                    for tip in &tips {
                        plan.push_sources(&tip.sources, &mut seen_sources);
                        plan.tips.push(TipRecord {
                            id: tip.id,
                            vegetable_id: target_id,
                            subjects: tip.subjects.clone(),
                            content: tip.content.clone(),
                            handle: tip.handle.clone(),
                            source_ids: tip.sources.iter().map(|s| s.id).collect(),
                        });
                    }
                }
                "friends" => {
                    let friends: Vec<Friend> = collection(field, value)?;
                    if friends.iter().any(|f| f.id == target_id) {
                        return Err(AppError::invalid_input(format!(
                            "Vegetable {target_id} cannot be its own friend"
                        )));
                    }
                    plan.friend_ids = Some(friends.into_iter().map(|f| f.id).collect());
                }
                name if ROOT_FIELDS.contains(&name) => {
                    let value = match value {
                        Value::Null if ARRAY_FIELDS.contains(&name) => Value::Array(Vec::new()),
                        other => other.clone(),
                    };
                    plan.root_fields.insert(field.clone(), value);
                }
                other => {
                    return Err(AppError::invalid_input(format!(
                        "Field '{other}' cannot be changed by a suggestion"
                    )));
                }
            }
        }

        Ok(plan)
    }

    fn push_sources(&mut self, sources: &[Source], seen: &mut HashSet<Uuid>) {
        for source in sources {
            if seen.insert(source.id) {
                self.sources.push(SourceRecord::from(source));
            }
        }
    }

    fn push_photo(&mut self, photo: &Photo, seen: &mut HashSet<Uuid>) -> AppResult<()> {
        let storage_id = photo.image.storage_id().ok_or_else(|| {
            AppError::invalid_input(format!("Photo {} has no stored image", photo.id))
        })?;
        self.push_sources(&photo.sources, seen);
        self.images.push(ImageRecord {
            id: photo.id,
            storage_id: storage_id.to_string(),
            label: photo.label.clone(),
            source_ids: photo.sources.iter().map(|s| s.id).collect(),
        });
        Ok(())
    }

    /// Overlay the planned root changes onto a locked root row.
    pub fn apply_root(&self, root: &mut VegetableRecord) -> AppResult<()> {
        if !self.root_fields.is_empty() {
            let id = root.id;
            let mut row = serde_json::to_value(&*root)?;
            if let Value::Object(fields) = &mut row {
                for (field, value) in &self.root_fields {
                    fields.insert(field.clone(), value.clone());
                }
            }
            *root = serde_json::from_value(row).map_err(|e| {
                AppError::with_source(
                    ErrorKind::InvalidInput,
                    format!("Changed fields do not fit vegetable {id}"),
                    e,
                )
            })?;
        }

        if let Some(ids) = &self.photo_ids {
            root.photo_ids = ids.clone();
        }
        if let Some(ids) = &self.source_ids {
            root.source_ids = ids.clone();
        }
        if let Some(ids) = &self.variety_ids {
            root.variety_ids = ids.clone();
        }
        if let Some(ids) = &self.tip_ids {
            root.tip_ids = ids.clone();
        }
        Ok(())
    }
}

fn collection<T: DeserializeOwned>(field: &str, value: &Value) -> AppResult<Vec<T>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value.clone()).map_err(|e| {
        AppError::with_source(
            ErrorKind::InvalidInput,
            format!("Malformed '{field}' collection"),
            e,
        )
    })
}

/// Wrap a store failure as a transaction failure naming the step.
///
/// Conflicts and missing rows keep their kind so callers can tell a lost
/// race from a broken store.
fn failed_at(step: MergeStep) -> impl Fn(AppError) -> AppError {
    move |e| match e.kind {
        ErrorKind::Conflict | ErrorKind::NotFound => e,
        _ => {
            error!(step = %step, error = %e, "Merge step failed");
            AppError::with_source(
                ErrorKind::Transaction,
                format!("Merge failed at step '{step}'"),
                e,
            )
        }
    }
}

/// Writes approved suggestions to the store.
#[derive(Debug, Clone)]
pub struct MergeExecutor {
    vegetables: Arc<dyn VegetableRepository>,
}

impl MergeExecutor {
    /// Creates a merge executor.
    pub fn new(vegetables: Arc<dyn VegetableRepository>) -> Self {
        Self { vegetables }
    }

    /// Merge the changed fields of a suggestion into its target, all or
    /// nothing, returning the updated root row.
    pub async fn merge(
        &self,
        changes: &BTreeMap<String, Value>,
        target_id: Uuid,
        suggestion_id: Uuid,
        reviewer: Uuid,
        base_revision: i64,
    ) -> AppResult<VegetableRecord> {
        let plan = MergePlan::from_changes(target_id, changes)?;

        let mut tx = self
            .vegetables
            .begin_merge()
            .await
            .map_err(failed_at(MergeStep::LockTarget))?;

        let mut root = tx
            .lock_root(target_id)
            .await
            .map_err(failed_at(MergeStep::LockTarget))?
            .ok_or_else(|| AppError::not_found(format!("Vegetable {target_id} not found")))?;
        if root.revision != base_revision {
            return Err(AppError::conflict(format!(
                "Vegetable {target_id} moved from revision {base_revision} to {}",
                root.revision
            )));
        }

        tx.upsert_sources(&plan.sources)
            .await
            .map_err(failed_at(MergeStep::Sources))?;
        tx.upsert_images(&plan.images)
            .await
            .map_err(failed_at(MergeStep::Images))?;
        tx.upsert_varieties(&plan.varieties)
            .await
            .map_err(failed_at(MergeStep::Varieties))?;
        tx.upsert_tips(&plan.tips)
            .await
            .map_err(failed_at(MergeStep::Tips))?;

        plan.apply_root(&mut root)?;
        let updated = tx
            .update_root(&root, base_revision)
            .await
            .map_err(failed_at(MergeStep::Root))?;

        if let Some(friend_ids) = &plan.friend_ids {
            tx.sync_friendships(target_id, friend_ids)
                .await
                .map_err(failed_at(MergeStep::Friendships))?;
        }

        tx.mark_merged(suggestion_id, reviewer)
            .await
            .map_err(failed_at(MergeStep::Status))?;
        tx.commit().await.map_err(failed_at(MergeStep::Commit))?;

        info!(
            target_id = %target_id,
            suggestion_id = %suggestion_id,
            revision = updated.revision,
            sources = plan.sources.len(),
            images = plan.images.len(),
            varieties = plan.varieties.len(),
            tips = plan.tips.len(),
            "Suggestion merged"
        );
        Ok(updated)
    }
}
