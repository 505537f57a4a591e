//! Entity services.
//!
//! Each service is the operation surface for one area of the content graph.
//! Reads go through the [`QueryEngine`](crate::aggregation::QueryEngine);
//! writes load the entity, pass the ownership guard and then hit the store,
//! the toggle coordinator or the cascade manager.

#![allow(missing_docs)]

pub mod comment;
pub mod dashboard;
pub mod like;
pub mod playlist;
pub mod subscription;
pub mod tweet;
pub mod user;
pub mod video;

pub use comment::{CommentInput, CommentService};
pub use dashboard::{DashboardQuery, DashboardService};
pub use like::LikeService;
pub use playlist::{CreatePlaylistInput, PlaylistService, UpdatePlaylistInput};
pub use subscription::SubscriptionService;
pub use tweet::{TweetInput, TweetService};
pub use user::{RegisterInput, UpdateAccountInput, UserService};
pub use video::{PublishVideoInput, UpdateVideoInput, VideoFeedQuery, VideoService};

use tubeline_common::{AppResult, validate_id};
use tubeline_db::store::{SharedCollection, SortDirection, SortKey};
use validator::ValidationError;

use crate::guard::{Owned, authorize};

/// Rejects strings that are empty after trimming.
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

/// Load an entity by caller-supplied id and check `actor_id` owns it.
pub(crate) async fn load_owned<E: Owned>(
    collection: &SharedCollection<E>,
    raw_id: &str,
    actor_id: &str,
) -> AppResult<E> {
    let id = validate_id(E::COLLECTION.label(), raw_id)?;
    let entity = collection.fetch(id).await?;
    authorize(actor_id, &entity)?;
    Ok(entity)
}

/// Resolve caller sort parameters against an allow-list of fields.
///
/// Unknown or missing fields fall back to `created_at`.
pub(crate) fn sort_key(
    sort_by: Option<&str>,
    sort_type: Option<&str>,
    allowed: &[&'static str],
) -> SortKey {
    let field = sort_by
        .map(str::trim)
        .and_then(|raw| allowed.iter().copied().find(|field| *field == raw))
        .unwrap_or("created_at");
    SortKey {
        field,
        direction: SortDirection::parse(sort_type),
    }
}

/// Trimmed text, or `None` when blank.
pub(crate) fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Service-level test wiring over the in-memory store.

    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use tubeline_common::{InMemoryMediaStore, MediaUpload};
    use tubeline_db::entities::{user, video};
    use tubeline_db::store::Store;

    use super::{PublishVideoInput, RegisterInput};
    use crate::Services;
    use crate::auth::Actor;

    pub struct World {
        pub store: Store,
        pub media: Arc<InMemoryMediaStore>,
        pub services: Services,
    }

    impl World {
        pub fn new() -> Self {
            let store = Store::in_memory();
            let media = Arc::new(InMemoryMediaStore::new());
            let services = Services::new(store.clone(), media.clone());
            Self {
                store,
                media,
                services,
            }
        }

        pub async fn user(&self, username: &str) -> (user::Model, Actor) {
            let user = self
                .services
                .users
                .register(
                    RegisterInput {
                        fullname: username.to_uppercase(),
                        email: format!("{username}@example.com"),
                        username: username.to_string(),
                    },
                    upload("avatar.png"),
                    None,
                )
                .await
                .unwrap();
            let actor = Actor::new(user.id.clone());
            (user, actor)
        }

        pub async fn video(&self, owner: &Actor, title: &str) -> video::Model {
            self.services
                .videos
                .publish_video(
                    owner,
                    PublishVideoInput {
                        title: title.to_string(),
                        description: format!("about {title}"),
                        duration_seconds: 60,
                    },
                    upload("clip.mp4"),
                    upload("thumb.jpg"),
                )
                .await
                .unwrap()
        }
    }

    pub fn upload(name: &str) -> MediaUpload {
        MediaUpload::new(name, vec![1, 2, 3])
    }
}
