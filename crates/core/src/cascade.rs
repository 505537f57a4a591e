//! Cascading deletes.
//!
//! Dependents go first, the parent last, all inside one store transaction:
//! a failing step rolls back the steps before it. Media files are purged
//! only after the transaction commits.

use tubeline_common::{AppError, AppResult, MediaRef, SharedMediaStore};
use tubeline_db::entities::like::TargetType;
use tubeline_db::entities::video;
use tubeline_db::store::{Filter, FindOptions, Patch, Store};

/// Deletes videos, comments and tweets together with everything hanging
/// off them.
#[derive(Clone)]
pub struct CascadeManager {
    store: Store,
    media: SharedMediaStore,
}

impl CascadeManager {
    /// Create a manager over `store`, purging video media from `media`.
    #[must_use]
    pub fn new(store: Store, media: SharedMediaStore) -> Self {
        Self { store, media }
    }

    /// Delete a video, its comments, every like on either, and its
    /// references from playlists and watch histories.
    pub async fn delete_video(&self, video: &video::Model) -> AppResult<()> {
        let removed = self
            .store
            .transaction(|store| async move { remove_video(&store, video).await })
            .await?;

        tracing::info!(
            video_id = %video.id,
            comments = removed.comments,
            comment_likes = removed.comment_likes,
            video_likes = removed.video_likes,
            playlists = removed.playlists,
            histories = removed.histories,
            "Deleted video"
        );

        self.purge(&video.video_file).await;
        self.purge(&video.thumbnail).await;
        Ok(())
    }

    /// Delete a comment and its likes.
    pub async fn delete_comment(&self, comment_id: &str) -> AppResult<()> {
        let likes = self
            .store
            .transaction(|store| async move {
                let likes = store
                    .likes
                    .delete_many(&likes_on(TargetType::Comment, comment_id))
                    .await?;
                if !store.comments.delete(comment_id).await? {
                    return Err(AppError::not_found("Comment"));
                }
                Ok(likes)
            })
            .await?;
        tracing::info!(comment_id = %comment_id, likes, "Deleted comment");
        Ok(())
    }

    /// Delete a tweet and its likes.
    pub async fn delete_tweet(&self, tweet_id: &str) -> AppResult<()> {
        let likes = self
            .store
            .transaction(|store| async move {
                let likes = store
                    .likes
                    .delete_many(&likes_on(TargetType::Tweet, tweet_id))
                    .await?;
                if !store.tweets.delete(tweet_id).await? {
                    return Err(AppError::not_found("Tweet"));
                }
                Ok(likes)
            })
            .await?;
        tracing::info!(tweet_id = %tweet_id, likes, "Deleted tweet");
        Ok(())
    }

    /// Best-effort media removal.
    pub async fn purge(&self, url: &str) {
        if url.is_empty() {
            return;
        }
        if let Err(err) = self.media.remove(&MediaRef::new(url)).await {
            tracing::warn!(url = %url, error = %err, "Failed to remove media");
        }
    }
}

/// Rows removed or rewritten by a video delete.
struct VideoRemoval {
    comments: u64,
    comment_likes: u64,
    video_likes: u64,
    playlists: u64,
    histories: u64,
}

async fn remove_video(store: &Store, video: &video::Model) -> AppResult<VideoRemoval> {
    let by_video = Filter::all().eq("video_id", video.id.as_str());
    let comment_ids: Vec<String> = store
        .comments
        .find(&by_video, &FindOptions::default())
        .await?
        .into_iter()
        .map(|comment| comment.id)
        .collect();

    let comment_likes = if comment_ids.is_empty() {
        0
    } else {
        let filter = Filter::all()
            .eq("target_type", TargetType::Comment.as_str())
            .is_in("target_id", comment_ids.iter().map(String::as_str));
        store.likes.delete_many(&filter).await?
    };
    let comments = store.comments.delete_many(&by_video).await?;
    let video_likes = store
        .likes
        .delete_many(&likes_on(TargetType::Video, &video.id))
        .await?;

    let playlists = store
        .playlists
        .update_many(
            &Filter::all().contains("videos", video.id.as_str()),
            Patch::new().pull("videos", video.id.as_str()),
        )
        .await?;
    let histories = store
        .users
        .update_many(
            &Filter::all().contains("watch_history", video.id.as_str()),
            Patch::new().pull("watch_history", video.id.as_str()),
        )
        .await?;

    if !store.videos.delete(&video.id).await? {
        return Err(AppError::not_found("Video"));
    }
    Ok(VideoRemoval {
        comments,
        comment_likes,
        video_likes,
        playlists,
        histories,
    })
}

fn likes_on(target_type: TargetType, target_id: &str) -> Filter {
    Filter::all()
        .eq("target_type", target_type.as_str())
        .eq("target_id", target_id)
}
