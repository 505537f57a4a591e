//! Playlist service.

use serde::Deserialize;
use tubeline_common::{AppError, AppResult, IdGenerator, validate_id};
use tubeline_db::entities::{IdList, playlist};
use tubeline_db::store::{CollectionName, Filter, Patch, Store};
use validator::Validate;

use super::load_owned;
use crate::aggregation::views::{PlaylistDetail, PlaylistSummary, owner};
use crate::aggregation::{Derive, Join, Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::pagination::{Page, PageRequest};

/// Input for creating a playlist.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePlaylistInput {
    #[validate(
        length(min = 1, max = 128, message = "Name is required"),
        custom(function = "crate::services::not_blank")
    )]
    pub name: String,
    #[validate(
        length(min = 1, max = 2048, message = "Description is required"),
        custom(function = "crate::services::not_blank")
    )]
    pub description: String,
}

/// Input for renaming or redescribing a playlist.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePlaylistInput {
    #[validate(length(min = 1, max = 128), custom(function = "crate::services::not_blank"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 2048), custom(function = "crate::services::not_blank"))]
    pub description: Option<String>,
}

/// Service for playlists.
#[derive(Clone)]
pub struct PlaylistService {
    store: Store,
    engine: QueryEngine,
    id_gen: IdGenerator,
}

impl PlaylistService {
    /// Create a new playlist service.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            engine: QueryEngine::new(store.clone()),
            store,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create an empty playlist.
    pub async fn create_playlist(
        &self,
        actor: &Actor,
        input: CreatePlaylistInput,
    ) -> AppResult<playlist::Model> {
        input.validate()?;
        let now = chrono::Utc::now().fixed_offset();
        let playlist = self
            .store
            .playlists
            .create(playlist::Model {
                id: self.id_gen.generate(),
                owner_id: actor.id.clone(),
                name: input.name.trim().to_string(),
                description: input.description.trim().to_string(),
                videos: IdList::default(),
                created_at: now,
                updated_at: now,
            })
            .await?;
        tracing::info!(playlist_id = %playlist.id, owner_id = %actor.id, "Created playlist");
        Ok(playlist)
    }

    /// A playlist with its videos, their owners and totals.
    pub async fn get_playlist(&self, playlist_id: &str) -> AppResult<PlaylistDetail> {
        let playlist_id = validate_id("Playlist", playlist_id)?;
        let videos = Join::many("videos", CollectionName::Videos, "videos", "id")
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
        let pipeline = Pipeline::new(CollectionName::Playlists)
            .filter(Filter::all().eq("id", playlist_id))
            .join(owner())
            .join(videos)
            .derive(Derive::Size {
                into: "videos_count",
                from: "videos",
            })
            .derive(Derive::Sum {
                into: "total_duration",
                from: "videos",
                field: "duration_seconds",
            })
            .derive(Derive::Sum {
                into: "total_views",
                from: "videos",
                field: "views",
            });
        self.engine
            .first(pipeline)
            .await?
            .ok_or_else(|| AppError::not_found("Playlist"))
    }

    /// A user's playlists, newest first.
    pub async fn list_user_playlists(
        &self,
        user_id: &str,
        page: &PageRequest,
    ) -> AppResult<Page<PlaylistSummary>> {
        let user_id = validate_id("User", user_id)?;
        if self.store.users.get(user_id).await?.is_none() {
            return Err(AppError::not_found("User"));
        }

        let pipeline = Pipeline::new(CollectionName::Playlists)
            .filter(Filter::all().eq("owner_id", user_id))
            .join(owner())
            .join(
                Join::many("video_rows", CollectionName::Videos, "videos", "id")
                    .project(&["thumbnail"]),
            )
            .derive(Derive::Size {
                into: "videos_count",
                from: "video_rows",
            })
            .derive(Derive::First {
                into: "thumbnail",
                from: "video_rows",
                field: "thumbnail",
            })
            .project(&[
                "id",
                "name",
                "description",
                "videos_count",
                "thumbnail",
                "created_at",
                "updated_at",
                "owner",
            ]);
        self.engine.page(pipeline, page.window()).await
    }

    /// Rename or redescribe a playlist.
    pub async fn update_playlist(
        &self,
        actor: &Actor,
        playlist_id: &str,
        input: UpdatePlaylistInput,
    ) -> AppResult<playlist::Model> {
        input.validate()?;
        if input.name.is_none() && input.description.is_none() {
            return Err(AppError::invalid("Name or description is required"));
        }
        let playlist = load_owned(&self.store.playlists, playlist_id, &actor.id).await?;

        let mut patch = Patch::new();
        if let Some(name) = &input.name {
            patch = patch.set("name", name.trim());
        }
        if let Some(description) = &input.description {
            patch = patch.set("description", description.trim());
        }
        self.store
            .playlists
            .update(&playlist.id, patch)
            .await?
            .ok_or_else(|| AppError::not_found("Playlist"))
    }

    /// Delete a playlist. Its videos are untouched.
    pub async fn delete_playlist(&self, actor: &Actor, playlist_id: &str) -> AppResult<()> {
        let playlist = load_owned(&self.store.playlists, playlist_id, &actor.id).await?;
        if !self.store.playlists.delete(&playlist.id).await? {
            return Err(AppError::not_found("Playlist"));
        }
        tracing::info!(playlist_id = %playlist.id, "Deleted playlist");
        Ok(())
    }

    /// Append a video.
    pub async fn add_video(
        &self,
        actor: &Actor,
        playlist_id: &str,
        video_id: &str,
    ) -> AppResult<playlist::Model> {
        let video_id = validate_id("Video", video_id)?;
        let playlist = load_owned(&self.store.playlists, playlist_id, &actor.id).await?;
        if self.store.videos.get(video_id).await?.is_none() {
            return Err(AppError::not_found("Video"));
        }
        if playlist.videos.contains(video_id) {
            return Err(AppError::invalid("Video is already in the playlist"));
        }

        let updated = self
            .store
            .playlists
            .update(&playlist.id, Patch::new().add_to_set("videos", video_id))
            .await?
            .ok_or_else(|| AppError::not_found("Playlist"))?;
        tracing::debug!(playlist_id = %updated.id, video_id = %video_id, "Added video to playlist");
        Ok(updated)
    }

    /// Remove a video.
    pub async fn remove_video(
        &self,
        actor: &Actor,
        playlist_id: &str,
        video_id: &str,
    ) -> AppResult<playlist::Model> {
        let video_id = validate_id("Video", video_id)?;
        let playlist = load_owned(&self.store.playlists, playlist_id, &actor.id).await?;

        // Membership is re-checked by the write, so only one of two racing removals counts.
        let member = Filter::all()
            .eq("id", playlist.id.as_str())
            .contains("videos", video_id);
        let pulled = self
            .store
            .playlists
            .update_many(&member, Patch::new().pull("videos", video_id))
            .await?;
        if pulled == 0 {
            return Err(AppError::invalid("Video is not in the playlist"));
        }
        let updated = self.store.playlists.fetch(&playlist.id).await?;
        tracing::debug!(
            playlist_id = %updated.id,
            video_id = %video_id,
            "Removed video from playlist"
        );
        Ok(updated)
    }
}
