//! PostgreSQL repository implementations.

pub mod suggestion;
pub mod vegetable;

pub use suggestion::PgSuggestionRepository;
pub use vegetable::{PgMergeTransaction, PgVegetableRepository};
