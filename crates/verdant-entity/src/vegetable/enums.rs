//! Enumerations describing vegetables and their citations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grammatical gender of the vegetable's common name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vegetable_gender", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    /// Masculine.
    Masculine,
    /// Feminine.
    Feminine,
    /// Neutral.
    Neutral,
}

/// Forest layer a plant occupies in an agroforestry system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stratum {
    /// Emergent canopy.
    Emergent,
    /// High layer.
    High,
    /// Medium layer.
    Medium,
    /// Low layer.
    Low,
    /// Ground cover.
    Groundcover,
}

/// How people use the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VegetableUse {
    /// Eaten by people.
    HumanFeed,
    /// Fed to animals.
    AnimalFeed,
    /// Medicinal.
    Medicinal,
    /// Planted for biomass.
    Biomass,
    /// Ornamental.
    Ornamental,
    /// Ritual use.
    Ritualistic,
    /// Timber and construction.
    Construction,
}

/// Edible part of a plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdiblePart {
    /// Fruit.
    Fruit,
    /// Flower.
    Flower,
    /// Leaf.
    Leaf,
    /// Stem.
    Stem,
    /// Seed.
    Seed,
    /// Bark.
    Bark,
    /// Bulb.
    Bulb,
    /// Sprout.
    Sprout,
    /// Tuber.
    Tuber,
    /// Root.
    Root,
    /// Resin.
    Resin,
}

/// Where a citation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "source_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Knowledge shared by community members.
    Community,
    /// An external publication, website or person.
    External,
}

impl SourceType {
    /// Return the type as an uppercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Community => "COMMUNITY",
            Self::External => "EXTERNAL",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for SourceType {
    fn default() -> Self {
        Self::External
    }
}
