//! Subscription service.

use tubeline_common::{AppError, AppResult, validate_id};
use tubeline_db::store::{CollectionName, Filter, Store};

use crate::aggregation::views::{
    SubscribedChannelView, SubscriberView, ToggleState, is_subscribed, subscribers_count,
    videos_count,
};
use crate::aggregation::{Derive, Join, Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::pagination::{Page, PageRequest};
use crate::toggle::ToggleCoordinator;

const CARD_FIELDS: &[&str] = &[
    "id",
    "username",
    "fullname",
    "avatar",
    "subscribers_count",
    "is_subscribed",
    "videos_count",
];

/// Service for channel subscriptions.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Store,
    engine: QueryEngine,
    toggles: ToggleCoordinator,
}

impl SubscriptionService {
    /// Create a new subscription service.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            engine: QueryEngine::new(store.clone()),
            toggles: ToggleCoordinator::new(store.clone()),
            store,
        }
    }

    /// Subscribe to or unsubscribe from a channel.
    pub async fn toggle_subscription(
        &self,
        actor: &Actor,
        channel_id: &str,
    ) -> AppResult<ToggleState> {
        let channel_id = validate_id("Channel", channel_id)?;
        self.toggles.subscribe(&actor.id, channel_id).await
    }

    /// Users subscribed to a channel, newest subscription first.
    ///
    /// `is_subscribed` on each subscriber is relative to `viewer`.
    pub async fn subscribers(
        &self,
        channel_id: &str,
        viewer: Option<&Actor>,
        page: &PageRequest,
    ) -> AppResult<Page<SubscriberView>> {
        let channel_id = self.existing_user("Channel", channel_id).await?;
        let viewer = viewer.map(|a| a.id.as_str());

        let subscriber = Join::one("subscriber", CollectionName::Users, "subscriber_id", "id")
            .derive(subscribers_count("id"))
            .derive(is_subscribed("id", viewer))
            .project(CARD_FIELDS);
        let pipeline = Pipeline::new(CollectionName::Subscriptions)
            .filter(Filter::all().eq("channel_id", channel_id))
            .join(subscriber)
            .derive(Derive::Copy {
                into: "subscribed_at",
                from: "created_at",
            })
            .project(&["subscribed_at", "subscriber"]);
        self.engine.page(pipeline, page.window()).await
    }

    /// Channels a user subscribes to, newest subscription first.
    pub async fn subscribed_channels(
        &self,
        user_id: &str,
        viewer: Option<&Actor>,
        page: &PageRequest,
    ) -> AppResult<Page<SubscribedChannelView>> {
        let user_id = self.existing_user("User", user_id).await?;
        let viewer = viewer.map(|a| a.id.as_str());

        let channel = Join::one("channel", CollectionName::Users, "channel_id", "id")
            .derive(subscribers_count("id"))
            .derive(videos_count("id"))
            .derive(is_subscribed("id", viewer))
            .project(CARD_FIELDS);
        let pipeline = Pipeline::new(CollectionName::Subscriptions)
            .filter(Filter::all().eq("subscriber_id", user_id))
            .join(channel)
            .derive(Derive::Copy {
                into: "subscribed_at",
                from: "created_at",
            })
            .project(&["subscribed_at", "channel"]);
        self.engine.page(pipeline, page.window()).await
    }

    async fn existing_user<'a>(&self, label: &str, raw: &'a str) -> AppResult<&'a str> {
        let id = validate_id(label, raw)?;
        if self.store.users.get(id).await?.is_none() {
            return Err(AppError::not_found(label));
        }
        Ok(id)
    }
}
