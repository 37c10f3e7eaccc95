//! Vegetable aggregate, its enums, and the records it is persisted as.

pub mod enums;
pub mod friendship;
pub mod model;
pub mod record;

pub use enums::{EdiblePart, Gender, SourceType, Stratum, VegetableUse};
pub use friendship::{FriendshipRecord, friendship_pair_id};
pub use model::{Friend, ImageRef, NewImage, Photo, Source, Tip, Variety, Vegetable};
pub use record::{
    AggregateRows, ImageRecord, SourceRecord, TipRecord, VarietyRecord, VegetableRecord, VegetableSummary,
};
