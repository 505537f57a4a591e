//! Ownership guard.
//!
//! Every mutation on a video, comment, tweet or playlist loads the entity
//! and calls [`authorize`] before writing.

use tubeline_common::{AppError, AppResult};
use tubeline_db::entities::{comment, playlist, tweet, video};
use tubeline_db::store::Document;

/// An entity with a single owning user.
pub trait Owned: Document {
    /// Id of the owning user.
    fn owner_id(&self) -> &str;
}

impl Owned for video::Model {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for comment::Model {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for tweet::Model {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for playlist::Model {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// Succeeds iff `actor_id` owns `entity`.
pub fn authorize<E: Owned>(actor_id: &str, entity: &E) -> AppResult<()> {
    if entity.owner_id() == actor_id {
        return Ok(());
    }
    tracing::debug!(
        actor_id = %actor_id,
        entity_id = %entity.id(),
        collection = E::COLLECTION.as_str(),
        "Ownership check failed"
    );
    Err(AppError::Forbidden(format!(
        "You are not the owner of this {}",
        E::COLLECTION.label().to_lowercase()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tubeline_common::ErrorKind;

    fn tweet(owner: &str) -> tweet::Model {
        let now = Utc::now().fixed_offset();
        tweet::Model {
            id: "t1".to_string(),
            owner_id: owner.to_string(),
            content: "hello".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_owner_is_authorized() {
        assert!(authorize("u1", &tweet("u1")).is_ok());
    }

    #[test]
    fn test_other_actor_is_forbidden() {
        let err = authorize("u2", &tweet("u1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "You are not the owner of this tweet");
    }
}
