//! Content-graph consistency layer for tubeline.
//!
//! The building blocks, leaves first:
//!
//! - [`guard`]: ownership checks for mutations
//! - [`pagination`]: page windows and page metadata
//! - [`aggregation`]: declarative read pipelines and their interpreter
//! - [`toggle`]: idempotent like and subscription toggles
//! - [`cascade`]: ordered deletes of dependents
//!
//! [`services`] combines them into the operation catalogue, and [`Services`]
//! wires every service over one store and one media store.

pub mod aggregation;
pub mod auth;
pub mod cascade;
pub mod guard;
pub mod pagination;
pub mod services;
pub mod toggle;

pub use auth::{Actor, AuthVerifier, Credentials, StaticTokenVerifier, require_actor};
pub use cascade::CascadeManager;
pub use pagination::{Page, PageInfo, PageRequest, PageWindow};
pub use services::*;
pub use toggle::ToggleCoordinator;

use tubeline_common::SharedMediaStore;
use tubeline_db::store::Store;

/// Every service, sharing one store and one media store.
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub videos: VideoService,
    pub comments: CommentService,
    pub tweets: TweetService,
    pub likes: LikeService,
    pub subscriptions: SubscriptionService,
    pub playlists: PlaylistService,
    pub dashboard: DashboardService,
}

impl Services {
    /// Wire all services.
    #[must_use]
    pub fn new(store: Store, media: SharedMediaStore) -> Self {
        Self {
            users: UserService::new(store.clone(), media.clone()),
            videos: VideoService::new(store.clone(), media.clone()),
            comments: CommentService::new(store.clone(), media.clone()),
            tweets: TweetService::new(store.clone(), media),
            likes: LikeService::new(store.clone()),
            subscriptions: SubscriptionService::new(store.clone()),
            playlists: PlaylistService::new(store.clone()),
            dashboard: DashboardService::new(store),
        }
    }
}
