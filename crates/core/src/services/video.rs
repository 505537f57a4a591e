//! Video service.

use serde::Deserialize;
use tubeline_common::{
    AppError, AppResult, IdGenerator, MediaUpload, SharedMediaStore, validate_id,
};
use tubeline_db::entities::like::TargetType;
use tubeline_db::entities::video;
use tubeline_db::store::{CollectionName, Filter, Patch, Store};
use validator::Validate;

use super::{load_owned, sort_key, trimmed};
use crate::aggregation::views::{
    PublishState, VideoDetail, VideoSummary, is_liked, is_subscribed, likes_count, owner,
    subscribers_count,
};
use crate::aggregation::{Join, Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::cascade::CascadeManager;
use crate::pagination::{HARD_CAP, Page, resolve};

/// Fields a feed may sort on.
pub const FEED_SORT_FIELDS: &[&str] = &[
    "created_at",
    "views",
    "duration_seconds",
    "title",
    "likes_count",
];

const SUMMARY_FIELDS: &[&str] = &[
    "id",
    "title",
    "description",
    "thumbnail",
    "video_file",
    "duration_seconds",
    "views",
    "is_published",
    "likes_count",
    "created_at",
    "owner",
];

const DETAIL_FIELDS: &[&str] = &[
    "id",
    "title",
    "description",
    "thumbnail",
    "video_file",
    "duration_seconds",
    "views",
    "is_published",
    "likes_count",
    "is_liked",
    "created_at",
    "owner",
];

/// Feed parameters, all optional and all raw.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoFeedQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

/// Input for publishing a video.
#[derive(Debug, Deserialize, Validate)]
pub struct PublishVideoInput {
    #[validate(
        length(min = 1, max = 200, message = "Title is required"),
        custom(function = "crate::services::not_blank")
    )]
    pub title: String,
    #[validate(
        length(min = 1, max = 5000, message = "Description is required"),
        custom(function = "crate::services::not_blank")
    )]
    pub description: String,
    #[validate(range(min = 0))]
    pub duration_seconds: i64,
}

/// Input for updating a video.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateVideoInput {
    #[validate(length(min = 1, max = 200), custom(function = "crate::services::not_blank"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000), custom(function = "crate::services::not_blank"))]
    pub description: Option<String>,
}

/// Service for videos.
#[derive(Clone)]
pub struct VideoService {
    store: Store,
    engine: QueryEngine,
    media: SharedMediaStore,
    cascade: CascadeManager,
    id_gen: IdGenerator,
}

impl VideoService {
    /// Create a new video service.
    #[must_use]
    pub fn new(store: Store, media: SharedMediaStore) -> Self {
        Self {
            engine: QueryEngine::new(store.clone()),
            cascade: CascadeManager::new(store.clone(), media.clone()),
            store,
            media,
            id_gen: IdGenerator::new(),
        }
    }

    /// Published videos, optionally of one user and matching a search text.
    pub async fn list_videos(&self, query: &VideoFeedQuery) -> AppResult<Page<VideoSummary>> {
        let window = resolve(query.page.as_deref(), query.limit.as_deref(), HARD_CAP);

        let mut filter = Filter::all().eq("is_published", true);
        if let Some(user_id) = trimmed(query.user_id.as_deref()) {
            filter = filter.eq("owner_id", validate_id("User", user_id)?);
        }
        if let Some(text) = trimmed(query.query.as_deref()) {
            filter = filter.search(vec!["title", "description"], text);
        }
        let sort = sort_key(
            query.sort_by.as_deref(),
            query.sort_type.as_deref(),
            FEED_SORT_FIELDS,
        );

        let pipeline = Pipeline::new(CollectionName::Videos)
            .filter(filter)
            .join(owner())
            .derive(likes_count(TargetType::Video))
            .project(SUMMARY_FIELDS)
            .sort(vec![sort]);
        self.engine.page(pipeline, window).await
    }

    /// A video's detail page.
    ///
    /// Counts the view and, for a signed-in viewer, moves the video to the end
    /// of their watch history. Unpublished videos are visible to their owner
    /// only.
    pub async fn get_video(&self, video_id: &str, actor: Option<&Actor>) -> AppResult<VideoDetail> {
        let video_id = validate_id("Video", video_id)?;
        let viewer = actor.map(|a| a.id.as_str());

        let channel = Join::one("owner", CollectionName::Users, "owner_id", "id")
            .derive(subscribers_count("id"))
            .derive(is_subscribed("id", viewer))
            .project(&[
                "id",
                "username",
                "fullname",
                "avatar",
                "subscribers_count",
                "is_subscribed",
            ]);
        let pipeline = Pipeline::new(CollectionName::Videos)
            .filter(Filter::all().eq("id", video_id))
            .join(channel)
            .derive(likes_count(TargetType::Video))
            .derive(is_liked(TargetType::Video, viewer))
            .project(DETAIL_FIELDS);

        let mut detail: VideoDetail = self
            .engine
            .first(pipeline)
            .await?
            .ok_or_else(|| AppError::not_found("Video"))?;
        if !detail.is_published {
            let owner_id = detail.owner.as_ref().map(|o| o.id.as_str());
            if owner_id.is_none() || owner_id != viewer {
                return Err(AppError::not_found("Video"));
            }
        }

        let counted = self
            .store
            .videos
            .update(video_id, Patch::new().increment("views", 1))
            .await?
            .ok_or_else(|| AppError::not_found("Video"))?;
        detail.views = counted.views;

        if let Some(viewer) = viewer {
            self.store
                .users
                .update(
                    viewer,
                    Patch::new()
                        .pull("watch_history", video_id)
                        .add_to_set("watch_history", video_id),
                )
                .await?;
        }
        Ok(detail)
    }

    /// Upload a new video.
    pub async fn publish_video(
        &self,
        actor: &Actor,
        input: PublishVideoInput,
        video_file: MediaUpload,
        thumbnail: MediaUpload,
    ) -> AppResult<video::Model> {
        input.validate()?;
        if video_file.data.is_empty() {
            return Err(AppError::invalid("Video file is required"));
        }
        if thumbnail.data.is_empty() {
            return Err(AppError::invalid("Thumbnail is required"));
        }

        let file = self.media.store(&video_file).await?;
        let thumb = match self.media.store(&thumbnail).await {
            Ok(thumb) => thumb,
            Err(err) => {
                self.cascade.purge(file.as_str()).await;
                return Err(err);
            }
        };

        let now = chrono::Utc::now().fixed_offset();
        let model = video::Model {
            id: self.id_gen.generate(),
            owner_id: actor.id.clone(),
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            video_file: file.into_string(),
            thumbnail: thumb.into_string(),
            duration_seconds: input.duration_seconds,
            views: 0,
            is_published: true,
            created_at: now,
            updated_at: now,
        };
        let (file_url, thumb_url) = (model.video_file.clone(), model.thumbnail.clone());

        match self.store.videos.create(model).await {
            Ok(video) => {
                tracing::info!(video_id = %video.id, owner_id = %actor.id, "Published video");
                Ok(video)
            }
            Err(err) => {
                self.cascade.purge(&file_url).await;
                self.cascade.purge(&thumb_url).await;
                Err(err)
            }
        }
    }

    /// Change title, description or thumbnail.
    pub async fn update_video(
        &self,
        actor: &Actor,
        video_id: &str,
        input: UpdateVideoInput,
        thumbnail: Option<MediaUpload>,
    ) -> AppResult<video::Model> {
        input.validate()?;
        if input.title.is_none() && input.description.is_none() && thumbnail.is_none() {
            return Err(AppError::invalid(
                "Title, description or thumbnail is required",
            ));
        }
        let video = load_owned(&self.store.videos, video_id, &actor.id).await?;

        let new_thumb = match &thumbnail {
            Some(upload) => Some(self.media.store(upload).await?),
            None => None,
        };

        let mut patch = Patch::new();
        if let Some(title) = &input.title {
            patch = patch.set("title", title.trim());
        }
        if let Some(description) = &input.description {
            patch = patch.set("description", description.trim());
        }
        if let Some(thumb) = &new_thumb {
            patch = patch.set("thumbnail", thumb.as_str());
        }

        let updated = match self.store.videos.update(&video.id, patch).await {
            Ok(Some(updated)) => updated,
            result => {
                if let Some(thumb) = &new_thumb {
                    self.cascade.purge(thumb.as_str()).await;
                }
                return result.and_then(|missing| {
                    missing.ok_or_else(|| AppError::not_found("Video"))
                });
            }
        };

        if new_thumb.is_some() {
            self.cascade.purge(&video.thumbnail).await;
        }
        tracing::info!(video_id = %updated.id, "Updated video");
        Ok(updated)
    }

    /// Flip the publish flag.
    pub async fn toggle_publish(&self, actor: &Actor, video_id: &str) -> AppResult<PublishState> {
        let video = load_owned(&self.store.videos, video_id, &actor.id).await?;
        let updated = self
            .store
            .videos
            .update(
                &video.id,
                Patch::new().set("is_published", !video.is_published),
            )
            .await?
            .ok_or_else(|| AppError::not_found("Video"))?;

        tracing::info!(
            video_id = %updated.id,
            is_published = updated.is_published,
            "Toggled publish status"
        );
        Ok(PublishState {
            id: updated.id,
            title: updated.title,
            is_published: updated.is_published,
        })
    }

    /// Delete a video with everything that depends on it.
    pub async fn delete_video(&self, actor: &Actor, video_id: &str) -> AppResult<()> {
        let video = load_owned(&self.store.videos, video_id, &actor.id).await?;
        self.cascade.delete_video(&video).await
    }
}
