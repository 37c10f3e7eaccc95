//! Suggestion status lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Review status of an edit suggestion.
///
/// `PendingReview` moves to either terminal state exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "suggestion_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionStatus {
    /// Waiting for a reviewer.
    PendingReview,
    /// Applied to the target vegetable.
    Merged,
    /// Declined by a reviewer.
    Rejected,
}

impl SuggestionStatus {
    /// Check if the suggestion is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Rejected)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SuggestionStatus) -> bool {
        matches!(
            (self, next),
            (Self::PendingReview, Self::Merged) | (Self::PendingReview, Self::Rejected)
        )
    }

    /// Return the status as an uppercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "PENDING_REVIEW",
            Self::Merged => "MERGED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reviewer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    /// Merge the suggestion.
    Approve,
    /// Decline the suggestion.
    Reject,
}

impl ReviewDecision {
    /// The status a suggestion ends in after this decision.
    pub fn resulting_status(&self) -> SuggestionStatus {
        match self {
            Self::Approve => SuggestionStatus::Merged,
            Self::Reject => SuggestionStatus::Rejected,
        }
    }
}
