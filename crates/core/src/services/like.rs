//! Like service.

use tubeline_common::{AppResult, validate_id};
use tubeline_db::entities::like::{LikeTarget, TargetType};
use tubeline_db::store::{CollectionName, Filter, Store};

use crate::aggregation::views::{LikedVideo, ToggleState, owner};
use crate::aggregation::{Derive, Join, Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::pagination::{Page, PageRequest};
use crate::toggle::ToggleCoordinator;

/// Service for likes.
#[derive(Clone)]
pub struct LikeService {
    engine: QueryEngine,
    toggles: ToggleCoordinator,
}

impl LikeService {
    /// Create a new like service.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            engine: QueryEngine::new(store.clone()),
            toggles: ToggleCoordinator::new(store),
        }
    }

    /// Like or unlike any target.
    pub async fn toggle(&self, actor: &Actor, target: &LikeTarget) -> AppResult<ToggleState> {
        let label = target.target_type().collection().label();
        validate_id(label, target.id())?;
        self.toggles.like(&actor.id, target).await
    }

    pub async fn toggle_video_like(&self, actor: &Actor, video_id: &str) -> AppResult<ToggleState> {
        self.toggle(actor, &LikeTarget::Video(video_id.trim().to_string()))
            .await
    }

    pub async fn toggle_comment_like(
        &self,
        actor: &Actor,
        comment_id: &str,
    ) -> AppResult<ToggleState> {
        self.toggle(actor, &LikeTarget::Comment(comment_id.trim().to_string()))
            .await
    }

    pub async fn toggle_tweet_like(&self, actor: &Actor, tweet_id: &str) -> AppResult<ToggleState> {
        self.toggle(actor, &LikeTarget::Tweet(tweet_id.trim().to_string()))
            .await
    }

    /// Videos the actor liked, most recent like first.
    pub async fn liked_videos(
        &self,
        actor: &Actor,
        page: &PageRequest,
    ) -> AppResult<Page<LikedVideo>> {
        let video = Join::one("video", CollectionName::Videos, "target_id", "id")
            .join(owner())
            .project(&[
                "id",
                "title",
                "thumbnail",
                "duration_seconds",
                "views",
                "created_at",
                "owner",
            ]);
        let pipeline = Pipeline::new(CollectionName::Likes)
            .filter(
                Filter::all()
                    .eq("liked_by_id", actor.id.as_str())
                    .eq("target_type", TargetType::Video.as_str()),
            )
            .join(video)
            .derive(Derive::Copy {
                into: "liked_at",
                from: "created_at",
            })
            .project(&["liked_at", "video"]);
        self.engine.page(pipeline, page.window()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tubeline_common::ErrorKind;

    use super::*;
    use crate::services::fixtures::World;

    #[tokio::test]
    async fn test_liked_videos_newest_like_first() {
        let world = World::new();
        let (_, alice) = world.user("alice").await;
        let (_, bob) = world.user("bob").await;
        let first = world.video(&alice, "first").await;
        let second = world.video(&alice, "second").await;

        let likes = &world.services.likes;
        likes.toggle_video_like(&bob, &second.id).await.unwrap();
        likes.toggle_video_like(&bob, &first.id).await.unwrap();

        let page = likes.liked_videos(&bob, &PageRequest::default()).await.unwrap();
        assert_eq!(page.info.total_count, 2);
        let ids: Vec<_> = page
            .items
            .iter()
            .map(|liked| liked.video.as_ref().unwrap().id.clone())
            .collect();
        assert_eq!(ids, [first.id.clone(), second.id.clone()]);
        assert_eq!(
            page.items[0].video.as_ref().unwrap().owner.as_ref().unwrap().username,
            "alice"
        );
        assert!(page.items[0].liked_at > page.items[1].liked_at);
    }

    #[tokio::test]
    async fn test_unlike_removes_from_liked_videos() {
        let world = World::new();
        let (_, alice) = world.user("alice").await;
        let video = world.video(&alice, "v").await;
        let likes = &world.services.likes;

        assert!(likes.toggle_video_like(&alice, &video.id).await.unwrap().active);
        assert!(!likes.toggle_video_like(&alice, &video.id).await.unwrap().active);
        let page = likes.liked_videos(&alice, &PageRequest::default()).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.info.total_pages, 0);
    }

    #[tokio::test]
    async fn test_like_unknown_targets() {
        let world = World::new();
        let (_, alice) = world.user("alice").await;
        let missing = tubeline_common::IdGenerator::new().generate();

        let err = world
            .services
            .likes
            .toggle_comment_like(&alice, &missing)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = world
            .services
            .likes
            .toggle_tweet_like(&alice, "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
