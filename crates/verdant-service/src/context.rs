//! Request context carrying the acting user and their role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// May propose edits.
    Contributor,
    /// May propose edits and review suggestions.
    Reviewer,
    /// Full access.
    Admin,
}

/// Context for the current authenticated request.
///
/// Built by whatever authenticates the caller and passed into every
/// operation so that it knows who is acting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated user's ID.
    pub user_id: Uuid,
    /// The user's role.
    pub role: UserRole,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context.
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            user_id,
            role,
            request_time: Utc::now(),
        }
    }

    /// Whether the user may approve or reject suggestions.
    pub fn can_review(&self) -> bool {
        matches!(self.role, UserRole::Reviewer | UserRole::Admin)
    }
}
