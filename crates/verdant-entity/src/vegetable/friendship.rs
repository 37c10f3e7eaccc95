//! Symmetric co-planting links between vegetables.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Order-independent identifier of the link between two vegetables.
///
/// The two ids are sorted lexicographically and concatenated, so A↔B and
/// B↔A produce the same key.
pub fn friendship_pair_id(a: Uuid, b: Uuid) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b { format!("{a}{b}") } else { format!("{b}{a}") }
}

/// A row of the `friendships` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct FriendshipRecord {
    /// Pair identifier, see [`friendship_pair_id`].
    pub id: String,
    /// Lexicographically smaller member.
    pub vegetable_a: Uuid,
    /// Lexicographically greater member.
    pub vegetable_b: Uuid,
}

impl FriendshipRecord {
    /// Build the canonical record for two vegetables, in either order.
    pub fn between(x: Uuid, y: Uuid) -> Self {
        let (vegetable_a, vegetable_b) = if x.to_string() <= y.to_string() {
            (x, y)
        } else {
            (y, x)
        };
        Self {
            id: friendship_pair_id(x, y),
            vegetable_a,
            vegetable_b,
        }
    }

    /// The member on the other side of `vegetable_id`, if it is part of the link.
    pub fn other(&self, vegetable_id: Uuid) -> Option<Uuid> {
        if self.vegetable_a == vegetable_id {
            Some(self.vegetable_b)
        } else if self.vegetable_b == vegetable_id {
            Some(self.vegetable_a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_id_is_symmetric() {
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(friendship_pair_id(x, y), friendship_pair_id(y, x));
        assert_eq!(FriendshipRecord::between(x, y), FriendshipRecord::between(y, x));
    }

    #[test]
    fn test_other_side() {
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let link = FriendshipRecord::between(x, y);
        assert_eq!(link.other(x), Some(y));
        assert_eq!(link.other(y), Some(x));
        assert_eq!(link.other(Uuid::new_v4()), None);
    }
}
