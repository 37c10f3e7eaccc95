//! The vegetable aggregate as contributors edit it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::enums::{EdiblePart, Gender, SourceType, Stratum, VegetableUse};

/// A vegetable with all of its owned collections.
///
/// Members of `photos`, `sources`, `varieties`, `tips` and `friends` are
/// identified by `id`; their position in the array carries no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_ranges"))]
pub struct Vegetable {
    /// Unique vegetable identifier.
    pub id: Uuid,
    /// Store revision, bumped on every merged suggestion.
    #[serde(default)]
    pub revision: i64,
    /// Common names, most used first.
    #[validate(length(min = 1, message = "at least one name is required"))]
    pub names: Vec<String>,
    /// Scientific names.
    #[serde(default)]
    pub scientific_names: Vec<String>,
    /// URL slug.
    #[validate(custom(function = "validate_handle"))]
    pub handle: String,
    /// Grammatical gender of the common name.
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Agroforestry strata.
    #[serde(default)]
    pub strata: Vec<Stratum>,
    /// Uses.
    #[serde(default)]
    pub uses: Vec<VegetableUse>,
    /// Edible parts.
    #[serde(default)]
    pub edible_parts: Vec<EdiblePart>,
    /// Minimum adult height in centimeters.
    #[serde(default)]
    pub height_min_cm: Option<f64>,
    /// Maximum adult height in centimeters.
    #[serde(default)]
    pub height_max_cm: Option<f64>,
    /// Minimum tolerated temperature in °C.
    #[serde(default)]
    pub temperature_min: Option<f64>,
    /// Maximum tolerated temperature in °C.
    #[serde(default)]
    pub temperature_max: Option<f64>,
    /// Region of origin.
    #[serde(default)]
    #[validate(length(max = 300))]
    pub origin: Option<String>,
    /// Free-text content.
    #[serde(default)]
    pub content: Option<String>,
    /// Ordered photos.
    #[serde(default)]
    #[validate(nested)]
    pub photos: Vec<Photo>,
    /// Citations for the vegetable's data.
    #[serde(default)]
    #[validate(nested)]
    pub sources: Vec<Source>,
    /// Varieties.
    #[serde(default)]
    #[validate(nested)]
    pub varieties: Vec<Variety>,
    /// Growing tips.
    #[serde(default)]
    #[validate(nested)]
    pub tips: Vec<Tip>,
    /// Co-planting friends.
    #[serde(default)]
    pub friends: Vec<Friend>,
}

/// A photo owned by a vegetable or a variety.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Photo {
    /// Unique photo identifier, assigned when the photo is first attached.
    pub id: Uuid,
    /// Caption.
    #[serde(default)]
    #[validate(length(max = 300))]
    pub label: Option<String>,
    /// Where the bytes live.
    #[serde(flatten)]
    pub image: ImageRef,
    /// Credits for the photo.
    #[serde(default)]
    #[validate(nested)]
    pub sources: Vec<Source>,
}

/// Either an already-hosted image or one still carried inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    /// Image hosted in blob storage.
    Stored {
        /// Blob storage identifier.
        storage_id: String,
    },
    /// Image submitted with the form and not uploaded yet.
    New(NewImage),
}

impl ImageRef {
    /// Whether the image still carries an inline payload.
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }

    /// The storage id of a hosted image.
    pub fn storage_id(&self) -> Option<&str> {
        match self {
            Self::Stored { storage_id } => Some(storage_id),
            Self::New(_) => None,
        }
    }
}

/// An inline image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewImage {
    /// Base64-encoded bytes.
    pub data: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Original file name, if the browser sent one.
    #[serde(default)]
    pub file_name: Option<String>,
}

/// A citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Source {
    /// Unique source identifier.
    pub id: Uuid,
    /// Community knowledge or external reference.
    #[serde(default)]
    pub source_type: SourceType,
    /// Who to credit.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub credits: Option<String>,
    /// URL or bibliographic origin.
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub origin: Option<String>,
    /// Free-form comments.
    #[serde(default)]
    pub comments: Option<String>,
    /// Community members credited by this source.
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
}

/// A cultivated variety of a vegetable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Variety {
    /// Unique variety identifier.
    pub id: Uuid,
    /// Names of the variety.
    #[validate(length(min = 1, message = "a variety needs a name"))]
    pub names: Vec<String>,
    /// URL slug.
    #[serde(default)]
    pub handle: Option<String>,
    /// Ordered photos of the variety.
    #[serde(default)]
    #[validate(nested)]
    pub photos: Vec<Photo>,
    /// Citations for the variety.
    #[serde(default)]
    #[validate(nested)]
    pub sources: Vec<Source>,
}

/// A growing tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Tip {
    /// Unique tip identifier.
    pub id: Uuid,
    /// Subjects the tip covers (planting, harvest, ...).
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Tip text.
    #[validate(length(min = 1))]
    pub content: String,
    /// URL slug.
    #[serde(default)]
    pub handle: Option<String>,
    /// Citations for the tip.
    #[serde(default)]
    #[validate(nested)]
    pub sources: Vec<Source>,
}

/// A co-planting friend, identified by the other vegetable's id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Friend {
    /// The friend vegetable.
    pub id: Uuid,
}

impl Vegetable {
    /// Every photo in the aggregate, root photos first, then variety photos.
    pub fn all_photos(&self) -> impl Iterator<Item = &Photo> {
        self.photos
            .iter()
            .chain(self.varieties.iter().flat_map(|v| v.photos.iter()))
    }

    /// The name to display for this vegetable.
    pub fn display_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.handle)
    }
}

fn validate_handle(handle: &str) -> Result<(), ValidationError> {
    let well_formed = !handle.is_empty()
        && handle.len() <= 120
        && !handle.starts_with('-')
        && !handle.ends_with('-')
        && handle
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("handle")
            .with_message("handle must be a lowercase slug".into()))
    }
}

fn validate_ranges(vegetable: &Vegetable) -> Result<(), ValidationError> {
    if let (Some(min), Some(max)) = (vegetable.height_min_cm, vegetable.height_max_cm) {
        if min > max {
            return Err(ValidationError::new("height_range")
                .with_message("minimum height exceeds maximum height".into()));
        }
    }
    if let (Some(min), Some(max)) = (vegetable.temperature_min, vegetable.temperature_max) {
        if min > max {
            return Err(ValidationError::new("temperature_range")
                .with_message("minimum temperature exceeds maximum temperature".into()));
        }
    }
    Ok(())
}
