//! # verdant-service
//!
//! Suggestion workflows for Verdant. Contributors propose edits to a
//! vegetable; each proposal is stored as an identity-keyed diff with its
//! inline images already uploaded. Reviewers see the diff replayed onto the
//! live aggregate and approve it into one ordered, all-or-nothing merge.
//!
//! Services take their repositories and blob storage as `Arc` trait objects
//! at construction time.

pub mod batch;
pub mod context;
pub mod suggestion;

pub use batch::{BatchFetch, BatchLoader, VegetableSummaryFetch};
pub use context::{RequestContext, UserRole};
pub use suggestion::{
    ChangesetApplier, ImageMaterializer, MergeExecutor, MergePlan, ProposeOutcome, ReviewOutcome,
    ReviewPreview, ReviewScreen, SuggestionService, SuggestionStore,
};
