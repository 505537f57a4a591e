//! Toggle coordinator for likes and subscriptions.
//!
//! A toggle deletes the `(actor, target)` row if it exists and creates it
//! otherwise. The store's uniqueness constraint arbitrates concurrent
//! toggles: a lost create race means the row exists, a lost delete race
//! means it is gone. Neither is reported as an error.

use tubeline_common::{AppError, AppResult, ErrorKind, IdGenerator};
use tubeline_db::entities::like::{LikeTarget, TargetType};
use tubeline_db::entities::{like, subscription};
use tubeline_db::store::{Document, Filter, SharedCollection, Store};

use crate::aggregation::views::ToggleState;

/// Delete the document matching `filter`, or create `draft()` when none does.
pub async fn toggle<D: Document>(
    collection: &SharedCollection<D>,
    filter: &Filter,
    draft: impl FnOnce() -> D + Send,
) -> AppResult<ToggleState> {
    if collection.find_one(filter, Vec::new()).await?.is_some() {
        if collection.delete_one(filter).await?.is_none() {
            tracing::debug!(
                collection = D::COLLECTION.as_str(),
                "Toggle row already removed concurrently"
            );
        }
        return Ok(ToggleState { active: false });
    }

    match collection.create(draft()).await {
        Ok(_) => Ok(ToggleState { active: true }),
        Err(err) if err.kind() == ErrorKind::Conflict => {
            tracing::debug!(
                collection = D::COLLECTION.as_str(),
                "Toggle row created concurrently"
            );
            Ok(ToggleState { active: true })
        }
        Err(err) => Err(err),
    }
}

/// Likes and subscriptions.
#[derive(Clone)]
pub struct ToggleCoordinator {
    store: Store,
    id_gen: IdGenerator,
}

impl ToggleCoordinator {
    /// Create a coordinator over `store`.
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            store,
            id_gen: IdGenerator::new(),
        }
    }

    /// Like or unlike a video, comment or tweet.
    pub async fn like(&self, actor_id: &str, target: &LikeTarget) -> AppResult<ToggleState> {
        let target_type = target.target_type();
        let collection = target_type.collection();
        if self.store.get_row(collection, target.id()).await?.is_none() {
            return Err(AppError::not_found(collection.label()));
        }

        let filter = like_filter(actor_id, target_type, target.id());
        let state = toggle(&self.store.likes, &filter, || {
            let now = chrono::Utc::now().fixed_offset();
            like::Model {
                id: self.id_gen.generate(),
                liked_by_id: actor_id.to_string(),
                target_type,
                target_id: target.id().to_string(),
                created_at: now,
                updated_at: now,
            }
        })
        .await?;

        tracing::debug!(
            actor_id = %actor_id,
            target_type = target_type.as_str(),
            target_id = %target.id(),
            active = state.active,
            "Toggled like"
        );
        Ok(state)
    }

    /// Subscribe to or unsubscribe from a channel.
    pub async fn subscribe(&self, actor_id: &str, channel_id: &str) -> AppResult<ToggleState> {
        if actor_id == channel_id {
            return Err(AppError::invalid("You cannot subscribe to your own channel"));
        }
        if self.store.users.get(channel_id).await?.is_none() {
            return Err(AppError::not_found("Channel"));
        }

        let filter = Filter::all()
            .eq("subscriber_id", actor_id)
            .eq("channel_id", channel_id);
        let state = toggle(&self.store.subscriptions, &filter, || {
            let now = chrono::Utc::now().fixed_offset();
            subscription::Model {
                id: self.id_gen.generate(),
                subscriber_id: actor_id.to_string(),
                channel_id: channel_id.to_string(),
                created_at: now,
                updated_at: now,
            }
        })
        .await?;

        tracing::debug!(
            actor_id = %actor_id,
            channel_id = %channel_id,
            active = state.active,
            "Toggled subscription"
        );
        Ok(state)
    }
}

/// Filter selecting the like of `actor_id` on one target.
#[must_use]
pub fn like_filter(actor_id: &str, target_type: TargetType, target_id: &str) -> Filter {
    Filter::all()
        .eq("liked_by_id", actor_id)
        .eq("target_type", target_type.as_str())
        .eq("target_id", target_id)
}
