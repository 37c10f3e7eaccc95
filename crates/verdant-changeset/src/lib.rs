//! # verdant-changeset
//!
//! Pure transforms over the canonical JSON shape of a vegetable aggregate:
//!
//! - [`normalize`] brings stored and form-submitted aggregates to the same shape,
//! - [`diff`] computes identity-keyed change operations between two shapes,
//! - [`apply_changes`] replays operations onto another (possibly newer) shape,
//! - [`changed_root_fields`] extracts the root fields two shapes disagree on.
//!
//! Nothing here performs I/O.

pub mod apply;
pub mod diff;
pub mod identity;
pub mod normalize;
pub mod walk;

pub use apply::{apply_changes, changed_root_fields};
pub use diff::diff;
pub use identity::IdentityKeys;
pub use normalize::{normalize, normalize_value};
pub use walk::{AddedValue, added_values};
