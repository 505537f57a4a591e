//! Channel dashboard.

use serde::Deserialize;
use tubeline_common::{AppError, AppResult};
use tubeline_db::entities::like::TargetType;
use tubeline_db::store::{CollectionName, Filter, Store};

use super::sort_key;
use crate::aggregation::views::{
    ChannelStats, DashboardVideo, comments_count, likes_count, subscribers_count,
};
use crate::aggregation::{Derive, Join, Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::pagination::{HARD_CAP, Page, resolve};

/// Fields the dashboard video list may sort on.
pub const DASHBOARD_SORT_FIELDS: &[&str] = &[
    "created_at",
    "views",
    "duration_seconds",
    "title",
    "likes_count",
    "comments_count",
];

/// Dashboard list parameters, all optional and all raw.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
}

/// Service for a channel owner's dashboard.
#[derive(Clone)]
pub struct DashboardService {
    engine: QueryEngine,
}

impl DashboardService {
    /// Create a new dashboard service.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            engine: QueryEngine::new(store),
        }
    }

    /// Totals across the actor's channel.
    pub async fn channel_stats(&self, actor: &Actor) -> AppResult<ChannelStats> {
        let videos = Join::many("videos", CollectionName::Videos, "id", "owner_id")
            .derive(likes_count(TargetType::Video))
            .project(&["views", "likes_count"]);
        let pipeline = Pipeline::new(CollectionName::Users)
            .filter(Filter::all().eq("id", actor.id.as_str()))
            .join(videos)
            .derive(subscribers_count("id"))
            .derive(Derive::Size {
                into: "total_videos",
                from: "videos",
            })
            .derive(Derive::Sum {
                into: "total_views",
                from: "videos",
                field: "views",
            })
            .derive(Derive::Sum {
                into: "total_likes",
                from: "videos",
                field: "likes_count",
            })
            .derive(Derive::Copy {
                into: "total_subscribers",
                from: "subscribers_count",
            })
            .project(&[
                "total_videos",
                "total_views",
                "total_subscribers",
                "total_likes",
            ]);
        self.engine
            .first(pipeline)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// The actor's own videos, published or not.
    pub async fn channel_videos(
        &self,
        actor: &Actor,
        query: &DashboardQuery,
    ) -> AppResult<Page<DashboardVideo>> {
        let window = resolve(query.page.as_deref(), query.limit.as_deref(), HARD_CAP);
        let sort = sort_key(
            query.sort_by.as_deref(),
            query.sort_type.as_deref(),
            DASHBOARD_SORT_FIELDS,
        );
        let pipeline = Pipeline::new(CollectionName::Videos)
            .filter(Filter::all().eq("owner_id", actor.id.as_str()))
            .derive(likes_count(TargetType::Video))
            .derive(comments_count())
            .project(&[
                "id",
                "title",
                "description",
                "thumbnail",
                "duration_seconds",
                "views",
                "is_published",
                "likes_count",
                "comments_count",
                "created_at",
            ])
            .sort(vec![sort]);
        self.engine.page(pipeline, window).await
    }
}
