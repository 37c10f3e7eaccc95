//! # verdant-entity
//!
//! Domain entity models for Verdant. The `Vegetable` aggregate is the shape
//! contributors edit and reviewers merge; the `*Record` structs are the rows
//! it is persisted as. Database rows additionally derive `sqlx::FromRow`.

pub mod changeset;
pub mod suggestion;
pub mod vegetable;

pub use changeset::{ChangeKind, ChangeOperation};
pub use suggestion::{EditSuggestion, SuggestionStatus};
pub use vegetable::{Friend, ImageRef, NewImage, Photo, Source, Tip, Variety, Vegetable};
