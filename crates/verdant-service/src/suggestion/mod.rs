//! Edit-suggestion workflow: image pre-pass, storage, review preview, and merge.

pub mod applier;
pub mod images;
pub mod merge;
pub mod service;
pub mod store;

pub use applier::{ChangesetApplier, ReviewPreview};
pub use images::{ImageMaterializer, Materialized};
pub use merge::{MergeExecutor, MergePlan};
pub use service::{ProposeOutcome, ReviewOutcome, ReviewScreen, SuggestionService};
pub use store::SuggestionStore;
