//! Reusable pipeline fragments and the typed rows they produce.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tubeline_db::entities::like::TargetType;
use tubeline_db::store::{CollectionName, Filter};

use super::pipeline::{Derive, Join};

/// Fields of a user exposed next to content they own.
pub const OWNER_FIELDS: &[&str] = &["id", "username", "fullname", "avatar"];

/// Replace `owner_id` with the owner's public fields.
#[must_use]
pub fn owner() -> Join {
    Join::one("owner", CollectionName::Users, "owner_id", "id").project(OWNER_FIELDS)
}

/// Number of likes on each row, as `likes_count`.
#[must_use]
pub fn likes_count(target: TargetType) -> Derive {
    Derive::Count {
        into: "likes_count",
        collection: CollectionName::Likes,
        foreign: "target_id",
        local: "id",
        filter: Filter::all().eq("target_type", target.as_str()),
    }
}

/// Whether `actor` liked each row, as `is_liked`.
#[must_use]
pub fn is_liked(target: TargetType, actor: Option<&str>) -> Derive {
    Derive::Exists {
        into: "is_liked",
        collection: CollectionName::Likes,
        foreign: "target_id",
        local: "id",
        filter: Filter::all().eq("target_type", target.as_str()),
        actor_field: "liked_by_id",
        actor: actor.map(str::to_string),
    }
}

/// Number of comments on each video row, as `comments_count`.
#[must_use]
pub fn comments_count() -> Derive {
    Derive::Count {
        into: "comments_count",
        collection: CollectionName::Comments,
        foreign: "video_id",
        local: "id",
        filter: Filter::all(),
    }
}

/// Number of subscribers of the channel at `local`.
#[must_use]
pub fn subscribers_count(local: &'static str) -> Derive {
    Derive::Count {
        into: "subscribers_count",
        collection: CollectionName::Subscriptions,
        foreign: "channel_id",
        local,
        filter: Filter::all(),
    }
}

/// Whether `viewer` subscribes to the channel at `local`.
#[must_use]
pub fn is_subscribed(local: &'static str, viewer: Option<&str>) -> Derive {
    Derive::Exists {
        into: "is_subscribed",
        collection: CollectionName::Subscriptions,
        foreign: "channel_id",
        local,
        filter: Filter::all(),
        actor_field: "subscriber_id",
        actor: viewer.map(str::to_string),
    }
}

/// Number of videos uploaded by the user at `local`.
#[must_use]
pub fn videos_count(local: &'static str) -> Derive {
    Derive::Count {
        into: "videos_count",
        collection: CollectionName::Videos,
        foreign: "owner_id",
        local,
        filter: Filter::all(),
    }
}

/// Public fields of a content owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub avatar: String,
}

/// A video in a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub video_file: String,
    pub duration_seconds: i64,
    pub views: i64,
    pub is_published: bool,
    pub likes_count: u64,
    pub created_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// Owner of a video on its detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOwner {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub avatar: String,
    pub subscribers_count: u64,
    pub is_subscribed: bool,
}

/// A single video with everything its page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetail {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub video_file: String,
    pub duration_seconds: i64,
    pub views: i64,
    pub is_published: bool,
    pub likes_count: u64,
    pub is_liked: bool,
    pub created_at: DateTime<FixedOffset>,
    pub owner: Option<ChannelOwner>,
}

/// A comment under a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: String,
    pub video_id: String,
    pub content: String,
    pub likes_count: u64,
    pub is_liked: bool,
    pub created_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// A tweet in a user's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetView {
    pub id: String,
    pub content: String,
    pub likes_count: u64,
    pub is_liked: bool,
    pub created_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// A video the actor liked.
///
/// `video` is `None` when the video no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedVideo {
    pub liked_at: DateTime<FixedOffset>,
    pub video: Option<LikedVideoInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedVideoInfo {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration_seconds: i64,
    pub views: i64,
    pub created_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// A user as listed among subscribers or subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCard {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub avatar: String,
    pub subscribers_count: u64,
    pub is_subscribed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos_count: Option<u64>,
}

/// One subscriber of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberView {
    pub subscribed_at: DateTime<FixedOffset>,
    pub subscriber: Option<ChannelCard>,
}

/// One channel a user subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedChannelView {
    pub subscribed_at: DateTime<FixedOffset>,
    pub channel: Option<ChannelCard>,
}

/// A playlist in a user's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub videos_count: u64,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// A video inside a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistVideo {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration_seconds: i64,
    pub views: i64,
    pub created_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// A playlist with its videos and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDetail {
    pub id: String,
    pub name: String,
    pub description: String,
    pub videos: Vec<PlaylistVideo>,
    pub videos_count: u64,
    pub total_duration: i64,
    pub total_views: i64,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// Totals for a channel's dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub total_videos: u64,
    pub total_views: i64,
    pub total_subscribers: u64,
    pub total_likes: i64,
}

/// One of the channel's own videos on its dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardVideo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub duration_seconds: i64,
    pub views: i64,
    pub is_published: bool,
    pub likes_count: u64,
    pub comments_count: u64,
    pub created_at: DateTime<FixedOffset>,
}

/// A channel page header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProfile {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscribers_count: u64,
    pub channels_subscribed_to_count: u64,
    pub is_subscribed: bool,
}

/// A video in a watch history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryVideo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub duration_seconds: i64,
    pub views: i64,
    pub created_at: DateTime<FixedOffset>,
    pub owner: Option<OwnerSummary>,
}

/// Result of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    pub active: bool,
}

/// Result of flipping a video's publish flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishState {
    pub id: String,
    pub title: String,
    pub is_published: bool,
}
