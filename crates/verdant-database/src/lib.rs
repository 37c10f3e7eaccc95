//! # verdant-database
//!
//! Persistence for vegetables and edit suggestions: the repository traits
//! the service layer depends on, PostgreSQL implementations over a sqlx
//! pool, and an in-memory store for single-node use and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod traits;

pub use connection::DatabasePool;
pub use memory::{MemoryStore, RowCounts};
pub use repositories::{PgSuggestionRepository, PgVegetableRepository};
pub use traits::{MergeStep, MergeTransaction, SuggestionRepository, VegetableRepository};
