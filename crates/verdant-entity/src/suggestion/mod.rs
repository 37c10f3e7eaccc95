//! Edit suggestions and their review lifecycle.

pub mod model;
pub mod status;

pub use model::{CreateSuggestion, EditSuggestion};
pub use status::{ReviewDecision, SuggestionStatus};
