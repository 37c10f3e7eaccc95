//! Row-level records the vegetable aggregate is persisted as.
//!
//! The aggregate owns its children through ordered reference lists
//! (`photo_ids`, `source_ids`, ...). Sources have no dependencies; images
//! reference sources; varieties reference images and sources; tips reference
//! sources.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::enums::{EdiblePart, Gender, SourceType, Stratum, VegetableUse};
use super::model::{Friend, ImageRef, Photo, Source, Tip, Variety, Vegetable};

/// A row of the `vegetables` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VegetableRecord {
    /// Unique vegetable identifier.
    pub id: Uuid,
    /// Optimistic concurrency counter.
    pub revision: i64,
    /// Common names.
    pub names: Vec<String>,
    /// Scientific names.
    pub scientific_names: Vec<String>,
    /// URL slug.
    pub handle: String,
    /// Grammatical gender.
    pub gender: Option<Gender>,
    /// Strata (JSON array).
    #[sqlx(json)]
    pub strata: Vec<Stratum>,
    /// Uses (JSON array).
    #[sqlx(json)]
    pub uses: Vec<VegetableUse>,
    /// Edible parts (JSON array).
    #[sqlx(json)]
    pub edible_parts: Vec<EdiblePart>,
    /// Minimum height in centimeters.
    pub height_min_cm: Option<f64>,
    /// Maximum height in centimeters.
    pub height_max_cm: Option<f64>,
    /// Minimum temperature in °C.
    pub temperature_min: Option<f64>,
    /// Maximum temperature in °C.
    pub temperature_max: Option<f64>,
    /// Region of origin.
    pub origin: Option<String>,
    /// Free-text content.
    pub content: Option<String>,
    /// Ordered photo references.
    pub photo_ids: Vec<Uuid>,
    /// Ordered source references.
    pub source_ids: Vec<Uuid>,
    /// Ordered variety references.
    pub variety_ids: Vec<Uuid>,
    /// Ordered tip references.
    pub tip_ids: Vec<Uuid>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

/// A row of the `sources` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SourceRecord {
    /// Unique source identifier.
    pub id: Uuid,
    /// Community or external.
    pub source_type: SourceType,
    /// Who to credit.
    pub credits: Option<String>,
    /// URL or bibliographic origin.
    pub origin: Option<String>,
    /// Comments.
    pub comments: Option<String>,
    /// Credited community members.
    pub user_ids: Vec<Uuid>,
}

/// A row of the `images` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ImageRecord {
    /// Unique image identifier (the photo id).
    pub id: Uuid,
    /// Blob storage identifier.
    pub storage_id: String,
    /// Caption.
    pub label: Option<String>,
    /// Ordered source references.
    pub source_ids: Vec<Uuid>,
}

/// A row of the `varieties` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VarietyRecord {
    /// Unique variety identifier.
    pub id: Uuid,
    /// Owning vegetable.
    pub vegetable_id: Uuid,
    /// Names.
    pub names: Vec<String>,
    /// URL slug.
    pub handle: Option<String>,
    /// Ordered photo references.
    pub photo_ids: Vec<Uuid>,
    /// Ordered source references.
    pub source_ids: Vec<Uuid>,
}

/// A row of the `tips` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TipRecord {
    /// Unique tip identifier.
    pub id: Uuid,
    /// Owning vegetable.
    pub vegetable_id: Uuid,
    /// Subjects.
    pub subjects: Vec<String>,
    /// Tip text.
    pub content: String,
    /// URL slug.
    pub handle: Option<String>,
    /// Ordered source references.
    pub source_ids: Vec<Uuid>,
}

/// Minimal vegetable projection used to label friends in review screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VegetableSummary {
    /// Vegetable identifier.
    pub id: Uuid,
    /// URL slug.
    pub handle: String,
    /// Common names.
    pub names: Vec<String>,
}

impl From<&Source> for SourceRecord {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id,
            source_type: source.source_type,
            credits: source.credits.clone(),
            origin: source.origin.clone(),
            comments: source.comments.clone(),
            user_ids: source.user_ids.clone(),
        }
    }
}

impl From<&SourceRecord> for Source {
    fn from(record: &SourceRecord) -> Self {
        Self {
            id: record.id,
            source_type: record.source_type,
            credits: record.credits.clone(),
            origin: record.origin.clone(),
            comments: record.comments.clone(),
            user_ids: record.user_ids.clone(),
        }
    }
}

impl VegetableRecord {
    /// Build the root row of an aggregate, copying its reference lists.
    pub fn from_aggregate(vegetable: &Vegetable) -> Self {
        Self {
            id: vegetable.id,
            revision: vegetable.revision,
            names: vegetable.names.clone(),
            scientific_names: vegetable.scientific_names.clone(),
            handle: vegetable.handle.clone(),
            gender: vegetable.gender,
            strata: vegetable.strata.clone(),
            uses: vegetable.uses.clone(),
            edible_parts: vegetable.edible_parts.clone(),
            height_min_cm: vegetable.height_min_cm,
            height_max_cm: vegetable.height_max_cm,
            temperature_min: vegetable.temperature_min,
            temperature_max: vegetable.temperature_max,
            origin: vegetable.origin.clone(),
            content: vegetable.content.clone(),
            photo_ids: vegetable.photos.iter().map(|p| p.id).collect(),
            source_ids: vegetable.sources.iter().map(|s| s.id).collect(),
            variety_ids: vegetable.varieties.iter().map(|v| v.id).collect(),
            tip_ids: vegetable.tips.iter().map(|t| t.id).collect(),
            updated_at: Utc::now(),
        }
    }

    /// Summary projection of this row.
    pub fn summary(&self) -> VegetableSummary {
        VegetableSummary {
            id: self.id,
            handle: self.handle.clone(),
            names: self.names.clone(),
        }
    }
}

/// Every row needed to reassemble one aggregate, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct AggregateRows {
    /// Sources by id.
    pub sources: HashMap<Uuid, SourceRecord>,
    /// Images by id.
    pub images: HashMap<Uuid, ImageRecord>,
    /// Varieties by id.
    pub varieties: HashMap<Uuid, VarietyRecord>,
    /// Tips by id.
    pub tips: HashMap<Uuid, TipRecord>,
    /// Ids of vegetables linked as friends.
    pub friend_ids: Vec<Uuid>,
}

impl AggregateRows {
    /// Reassemble the aggregate following the root row's reference lists.
    ///
    /// Dangling references are skipped rather than failing the read.
    pub fn assemble(&self, root: &VegetableRecord) -> Vegetable {
        let mut friend_ids = self.friend_ids.clone();
        friend_ids.sort();
        friend_ids.dedup();

        Vegetable {
            id: root.id,
            revision: root.revision,
            names: root.names.clone(),
            scientific_names: root.scientific_names.clone(),
            handle: root.handle.clone(),
            gender: root.gender,
            strata: root.strata.clone(),
            uses: root.uses.clone(),
            edible_parts: root.edible_parts.clone(),
            height_min_cm: root.height_min_cm,
            height_max_cm: root.height_max_cm,
            temperature_min: root.temperature_min,
            temperature_max: root.temperature_max,
            origin: root.origin.clone(),
            content: root.content.clone(),
            photos: self.photos(&root.photo_ids),
            sources: self.sources(&root.source_ids),
            varieties: root
                .variety_ids
                .iter()
                .filter_map(|id| self.varieties.get(id))
                .map(|v| Variety {
                    id: v.id,
                    names: v.names.clone(),
                    handle: v.handle.clone(),
                    photos: self.photos(&v.photo_ids),
                    sources: self.sources(&v.source_ids),
                })
                .collect(),
            tips: root
                .tip_ids
                .iter()
                .filter_map(|id| self.tips.get(id))
                .map(|t| Tip {
                    id: t.id,
                    subjects: t.subjects.clone(),
                    content: t.content.clone(),
                    handle: t.handle.clone(),
                    sources: self.sources(&t.source_ids),
                })
                .collect(),
            friends: friend_ids.into_iter().map(|id| Friend { id }).collect(),
        }
    }

    fn sources(&self, ids: &[Uuid]) -> Vec<Source> {
        ids.iter()
            .filter_map(|id| self.sources.get(id))
            .map(Source::from)
            .collect()
    }

    fn photos(&self, ids: &[Uuid]) -> Vec<Photo> {
        ids.iter()
            .filter_map(|id| self.images.get(id))
            .map(|image| Photo {
                id: image.id,
                label: image.label.clone(),
                image: ImageRef::Stored {
                    storage_id: image.storage_id.clone(),
                },
                sources: self.sources(&image.source_ids),
            })
            .collect()
    }
}
