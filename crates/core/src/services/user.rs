//! User service.

use serde::Deserialize;
use tubeline_common::{
    AppError, AppResult, ErrorKind, IdGenerator, MediaUpload, SharedMediaStore, validate_id,
};
use tubeline_db::entities::{IdList, user};
use tubeline_db::store::{CollectionName, Filter, Patch, Store};
use validator::Validate;

use crate::aggregation::views::{
    ChannelProfile, HistoryVideo, is_subscribed, owner, subscribers_count,
};
use crate::aggregation::{Derive, Join, Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::cascade::CascadeManager;

/// Input for registering a new user.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(
        length(min = 1, max = 256, message = "Full name is required"),
        custom(function = "crate::services::not_blank")
    )]
    pub fullname: String,

    #[validate(email(message = "Email is invalid"))]
    pub email: String,

    #[validate(
        length(min = 1, max = 128, message = "Username is required"),
        custom(function = "crate::services::not_blank")
    )]
    pub username: String,
}

/// Input for updating account details.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAccountInput {
    #[validate(length(min = 1, max = 256), custom(function = "crate::services::not_blank"))]
    pub fullname: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    store: Store,
    engine: QueryEngine,
    media: SharedMediaStore,
    cascade: CascadeManager,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
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

    /// Register a new user.
    ///
    /// Username and email are stored lowercased. The avatar is required.
    pub async fn register(
        &self,
        input: RegisterInput,
        avatar: MediaUpload,
        cover_image: Option<MediaUpload>,
    ) -> AppResult<user::Model> {
        input.validate()?;
        if avatar.data.is_empty() {
            return Err(AppError::invalid("Avatar is required"));
        }
        let username = input.username.trim().to_lowercase();
        let email = input.email.trim().to_lowercase();

        for (field, value) in [("username", &username), ("email", &email)] {
            let filter = Filter::all().eq(field, value.as_str());
            if self.store.users.count(&filter).await? > 0 {
                return Err(AppError::Conflict(
                    "User with this email or username already exists".to_string(),
                ));
            }
        }

        let avatar = self.media.store(&avatar).await?;
        let cover = match &cover_image {
            Some(upload) => match self.media.store(upload).await {
                Ok(cover) => Some(cover),
                Err(err) => {
                    self.cascade.purge(avatar.as_str()).await;
                    return Err(err);
                }
            },
            None => None,
        };

        let now = chrono::Utc::now().fixed_offset();
        let model = user::Model {
            id: self.id_gen.generate(),
            username,
            email,
            fullname: input.fullname.trim().to_string(),
            avatar: avatar.as_str().to_string(),
            cover_image: cover.as_ref().map(|c| c.as_str().to_string()),
            watch_history: IdList::default(),
            created_at: now,
            updated_at: now,
        };

        match self.store.users.create(model).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, username = %user.username, "Registered user");
                Ok(user)
            }
            Err(err) => {
                self.cascade.purge(avatar.as_str()).await;
                if let Some(cover) = &cover {
                    self.cascade.purge(cover.as_str()).await;
                }
                if err.kind() == ErrorKind::Conflict {
                    return Err(AppError::Conflict(
                        "User with this email or username already exists".to_string(),
                    ));
                }
                Err(err)
            }
        }
    }

    /// Get a user by ID.
    pub async fn get_user(&self, user_id: &str) -> AppResult<user::Model> {
        let user_id = validate_id("User", user_id)?;
        self.store.users.fetch(user_id).await
    }

    /// Change full name or email.
    pub async fn update_account(
        &self,
        actor: &Actor,
        input: UpdateAccountInput,
    ) -> AppResult<user::Model> {
        input.validate()?;
        let mut patch = Patch::new();
        if let Some(fullname) = &input.fullname {
            patch = patch.set("fullname", fullname.trim());
        }
        if let Some(email) = &input.email {
            patch = patch.set("email", email.trim().to_lowercase());
        }
        if patch.is_empty() {
            return Err(AppError::invalid("Full name or email is required"));
        }

        self.store
            .users
            .update(&actor.id, patch)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// Replace the avatar.
    pub async fn update_avatar(&self, actor: &Actor, avatar: MediaUpload) -> AppResult<user::Model> {
        if avatar.data.is_empty() {
            return Err(AppError::invalid("Avatar file is missing"));
        }
        self.replace_image(actor, "avatar", &avatar).await
    }

    /// Replace the cover image.
    pub async fn update_cover_image(
        &self,
        actor: &Actor,
        cover_image: MediaUpload,
    ) -> AppResult<user::Model> {
        if cover_image.data.is_empty() {
            return Err(AppError::invalid("Cover image file is missing"));
        }
        self.replace_image(actor, "cover_image", &cover_image).await
    }

    async fn replace_image(
        &self,
        actor: &Actor,
        field: &'static str,
        upload: &MediaUpload,
    ) -> AppResult<user::Model> {
        let current = self.store.users.fetch(&actor.id).await?;
        let stored = self.media.store(upload).await?;

        let updated = match self
            .store
            .users
            .update(&actor.id, Patch::new().set(field, stored.as_str()))
            .await
        {
            Ok(Some(updated)) => updated,
            result => {
                self.cascade.purge(stored.as_str()).await;
                return result.and_then(|missing| missing.ok_or_else(|| AppError::not_found("User")));
            }
        };

        let previous = match field {
            "avatar" => Some(current.avatar),
            _ => current.cover_image,
        };
        if let Some(previous) = previous {
            self.cascade.purge(&previous).await;
        }
        tracing::info!(user_id = %actor.id, field, "Replaced user image");
        Ok(updated)
    }

    /// A channel page header looked up by username.
    pub async fn channel_profile(
        &self,
        username: &str,
        viewer: Option<&Actor>,
    ) -> AppResult<ChannelProfile> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(AppError::invalid("Username is required"));
        }

        let pipeline = Pipeline::new(CollectionName::Users)
            .filter(Filter::all().eq("username", username))
            .derive(subscribers_count("id"))
            .derive(Derive::Count {
                into: "channels_subscribed_to_count",
                collection: CollectionName::Subscriptions,
                foreign: "subscriber_id",
                local: "id",
                filter: Filter::all(),
            })
            .derive(is_subscribed("id", viewer.map(|a| a.id.as_str())))
            .project(&[
                "id",
                "username",
                "fullname",
                "email",
                "avatar",
                "cover_image",
                "subscribers_count",
                "channels_subscribed_to_count",
                "is_subscribed",
            ]);
        self.engine
            .first(pipeline)
            .await?
            .ok_or_else(|| AppError::not_found("Channel"))
    }

    /// The actor's watch history, most recently watched first.
    pub async fn watch_history(&self, actor: &Actor) -> AppResult<Vec<HistoryVideo>> {
        let videos = Join::many("watch_history", CollectionName::Videos, "watch_history", "id")
            .join(owner())
            .project(&[
                "id",
                "title",
                "description",
                "thumbnail",
                "duration_seconds",
                "views",
                "created_at",
                "owner",
            ]);
        let pipeline = Pipeline::new(CollectionName::Users)
            .filter(Filter::all().eq("id", actor.id.as_str()))
            .join(videos)
            .project(&["watch_history"]);

        let row: WatchHistoryRow = self
            .engine
            .first(pipeline)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        let mut videos = row.watch_history;
        videos.reverse();
        Ok(videos)
    }
}

#[derive(Deserialize)]
struct WatchHistoryRow {
    watch_history: Vec<HistoryVideo>,
}
