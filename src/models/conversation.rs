use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Unordered pair of two distinct participants.
///
/// Stored normalized (smaller id first) so `(a, b)` and `(b, a)` compare and hash equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantPair {
    first: Uuid,
    second: Uuid,
}

impl ParticipantPair {
    pub fn new(a: Uuid, b: Uuid) -> Result<Self, AppError> {
        if a == b {
            return Err(AppError::BadRequest(
                "a conversation needs two distinct participants".into(),
            ));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { first, second })
    }

    pub fn first(&self) -> Uuid {
        self.first
    }

    pub fn second(&self) -> Uuid {
        self.second
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.first == user_id || self.second == user_id
    }

    pub fn as_array(&self) -> [Uuid; 2] {
        [self.first, self.second]
    }
}

/// A two-party thread. The participant set is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: ParticipantPair,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(participants: ParticipantPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            participants,
            created_at: Utc::now(),
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_unordered() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            ParticipantPair::new(a, b).unwrap(),
            ParticipantPair::new(b, a).unwrap()
        );
    }

    #[test]
    fn pair_rejects_self_conversation() {
        let a = Uuid::new_v4();
        assert!(matches!(
            ParticipantPair::new(a, a),
            Err(AppError::BadRequest(_))
        ));
    }
}
