//! Comment service.

use serde::Deserialize;
use tubeline_common::{AppError, AppResult, IdGenerator, SharedMediaStore, validate_id};
use tubeline_db::entities::comment;
use tubeline_db::entities::like::TargetType;
use tubeline_db::store::{CollectionName, Filter, Patch, Store};
use validator::Validate;

use super::load_owned;
use crate::aggregation::views::{CommentView, is_liked, likes_count, owner};
use crate::aggregation::{Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::cascade::CascadeManager;
use crate::pagination::{Page, PageRequest};

/// Comment text.
#[derive(Debug, Deserialize, Validate)]
pub struct CommentInput {
    #[validate(
        length(min = 1, max = 2000, message = "Content is required"),
        custom(function = "crate::services::not_blank")
    )]
    pub content: String,
}

/// Service for comments on videos.
#[derive(Clone)]
pub struct CommentService {
    store: Store,
    engine: QueryEngine,
    cascade: CascadeManager,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub fn new(store: Store, media: SharedMediaStore) -> Self {
        Self {
            engine: QueryEngine::new(store.clone()),
            cascade: CascadeManager::new(store.clone(), media),
            store,
            id_gen: IdGenerator::new(),
        }
    }

    /// Comments on a video, newest first.
    pub async fn list_comments(
        &self,
        video_id: &str,
        actor: Option<&Actor>,
        page: &PageRequest,
    ) -> AppResult<Page<CommentView>> {
        let video_id = validate_id("Video", video_id)?;
        if self.store.videos.get(video_id).await?.is_none() {
            return Err(AppError::not_found("Video"));
        }

        let pipeline = Pipeline::new(CollectionName::Comments)
            .filter(Filter::all().eq("video_id", video_id))
            .join(owner())
            .derive(likes_count(TargetType::Comment))
            .derive(is_liked(TargetType::Comment, actor.map(|a| a.id.as_str())))
            .project(&[
                "id",
                "video_id",
                "content",
                "likes_count",
                "is_liked",
                "created_at",
                "owner",
            ]);
        self.engine.page(pipeline, page.window()).await
    }

    /// Comment on a video.
    pub async fn add_comment(
        &self,
        actor: &Actor,
        video_id: &str,
        input: CommentInput,
    ) -> AppResult<comment::Model> {
        input.validate()?;
        let video_id = validate_id("Video", video_id)?;
        if self.store.videos.get(video_id).await?.is_none() {
            return Err(AppError::not_found("Video"));
        }

        let now = chrono::Utc::now().fixed_offset();
        let comment = self
            .store
            .comments
            .create(comment::Model {
                id: self.id_gen.generate(),
                video_id: video_id.to_string(),
                owner_id: actor.id.clone(),
                content: input.content.trim().to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(comment_id = %comment.id, video_id = %video_id, "Added comment");
        Ok(comment)
    }

    /// Replace a comment's text.
    pub async fn update_comment(
        &self,
        actor: &Actor,
        comment_id: &str,
        input: CommentInput,
    ) -> AppResult<comment::Model> {
        input.validate()?;
        let comment = load_owned(&self.store.comments, comment_id, &actor.id).await?;
        self.store
            .comments
            .update(&comment.id, Patch::new().set("content", input.content.trim()))
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))
    }

    /// Delete a comment and its likes.
    pub async fn delete_comment(&self, actor: &Actor, comment_id: &str) -> AppResult<()> {
        let comment = load_owned(&self.store.comments, comment_id, &actor.id).await?;
        self.cascade.delete_comment(&comment.id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tubeline_common::ErrorKind;

    use super::*;
    use crate::services::fixtures::World;

    fn text(content: &str) -> CommentInput {
        CommentInput {
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_comment_feed() {
        let world = World::new();
        let (_, alice) = world.user("alice").await;
        let (_, bob) = world.user("bob").await;
        let video = world.video(&alice, "v").await;
        let comments = &world.services.comments;

        let first = comments.add_comment(&bob, &video.id, text("  first  ")).await.unwrap();
        assert_eq!(first.content, "first");
        comments.add_comment(&alice, &video.id, text("second")).await.unwrap();
        world.services.likes.toggle_comment_like(&alice, &first.id).await.unwrap();

        let page = comments
            .list_comments(&video.id, Some(&alice), &PageRequest::new(1, 1))
            .await
            .unwrap();
        assert_eq!(page.info.total_count, 2);
        assert!(page.info.has_next);
        assert_eq!(page.items[0].content, "second");

        let page = comments
            .list_comments(&video.id, Some(&alice), &PageRequest::new(2, 1))
            .await
            .unwrap();
        let item = &page.items[0];
        assert_eq!(item.id, first.id);
        assert_eq!(item.likes_count, 1);
        assert!(item.is_liked);
        assert_eq!(item.owner.as_ref().unwrap().username, "bob");
    }

    #[tokio::test]
    async fn test_blank_comment_and_missing_video() {
        let world = World::new();
        let (_, alice) = world.user("alice").await;
        let video = world.video(&alice, "v").await;
        let comments = &world.services.comments;

        let err = comments.add_comment(&alice, &video.id, text(" \t ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let ghost = tubeline_common::IdGenerator::new().generate();
        let err = comments.add_comment(&alice, &ghost, text("hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(world.store.comments.count(&Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_comment_ownership() {
        let world = World::new();
        let (_, alice) = world.user("alice").await;
        let (_, bob) = world.user("bob").await;
        let video = world.video(&alice, "v").await;
        let comments = &world.services.comments;
        let comment = comments.add_comment(&bob, &video.id, text("mine")).await.unwrap();

        let err = comments
            .update_comment(&alice, &comment.id, text("edited"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = comments.delete_comment(&alice, &comment.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let edited = comments
            .update_comment(&bob, &comment.id, text("edited"))
            .await
            .unwrap();
        assert_eq!(edited.content, "edited");
        comments.delete_comment(&bob, &comment.id).await.unwrap();
        assert!(world.store.comments.get(&comment.id).await.unwrap().is_none());
    }
}
