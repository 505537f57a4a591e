//! Tweet service.

use serde::Deserialize;
use tubeline_common::{AppError, AppResult, IdGenerator, SharedMediaStore, validate_id};
use tubeline_db::entities::like::TargetType;
use tubeline_db::entities::tweet;
use tubeline_db::store::{CollectionName, Filter, Patch, Store};
use validator::{Validate, ValidationError};

use super::load_owned;
use crate::aggregation::views::{TweetView, is_liked, likes_count, owner};
use crate::aggregation::{Pipeline, QueryEngine};
use crate::auth::Actor;
use crate::cascade::CascadeManager;
use crate::pagination::{Page, PageRequest};

/// Tweet text.
#[derive(Debug, Deserialize, Validate)]
pub struct TweetInput {
    #[validate(custom(function = "tweet_length"))]
    pub content: String,
}

/// Measures the stored form: trimmed, in characters.
fn tweet_length(value: &str) -> Result<(), ValidationError> {
    let chars = value.trim().chars().count();
    if chars == 0 || chars > tweet::MAX_CONTENT_CHARS {
        let message = format!("Content must be 1 to {} characters", tweet::MAX_CONTENT_CHARS);
        return Err(ValidationError::new("length").with_message(message.into()));
    }
    Ok(())
}

impl TweetInput {
    fn content(&self) -> AppResult<String> {
        self.validate()?;
        Ok(self.content.trim().to_string())
    }
}

/// Service for tweets.
#[derive(Clone)]
pub struct TweetService {
    store: Store,
    engine: QueryEngine,
    cascade: CascadeManager,
    id_gen: IdGenerator,
}

impl TweetService {
    /// Create a new tweet service.
    #[must_use]
    pub fn new(store: Store, media: SharedMediaStore) -> Self {
        Self {
            engine: QueryEngine::new(store.clone()),
            cascade: CascadeManager::new(store.clone(), media),
            store,
            id_gen: IdGenerator::new(),
        }
    }

    /// Post a tweet.
    pub async fn create_tweet(&self, actor: &Actor, input: TweetInput) -> AppResult<tweet::Model> {
        let content = input.content()?;
        let now = chrono::Utc::now().fixed_offset();
        let tweet = self
            .store
            .tweets
            .create(tweet::Model {
                id: self.id_gen.generate(),
                owner_id: actor.id.clone(),
                content,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tracing::info!(tweet_id = %tweet.id, owner_id = %actor.id, "Created tweet");
        Ok(tweet)
    }

    /// A user's tweets, newest first.
    pub async fn list_user_tweets(
        &self,
        user_id: &str,
        actor: Option<&Actor>,
        page: &PageRequest,
    ) -> AppResult<Page<TweetView>> {
        let user_id = validate_id("User", user_id)?;
        if self.store.users.get(user_id).await?.is_none() {
            return Err(AppError::not_found("User"));
        }

        let pipeline = Pipeline::new(CollectionName::Tweets)
            .filter(Filter::all().eq("owner_id", user_id))
            .join(owner())
            .derive(likes_count(TargetType::Tweet))
            .derive(is_liked(TargetType::Tweet, actor.map(|a| a.id.as_str())))
            .project(&[
                "id",
                "content",
                "likes_count",
                "is_liked",
                "created_at",
                "owner",
            ]);
        self.engine.page(pipeline, page.window()).await
    }

    /// Replace a tweet's text.
    pub async fn update_tweet(
        &self,
        actor: &Actor,
        tweet_id: &str,
        input: TweetInput,
    ) -> AppResult<tweet::Model> {
        let content = input.content()?;
        let tweet = load_owned(&self.store.tweets, tweet_id, &actor.id).await?;
        self.store
            .tweets
            .update(&tweet.id, Patch::new().set("content", content))
            .await?
            .ok_or_else(|| AppError::not_found("Tweet"))
    }

    /// Delete a tweet and its likes.
    pub async fn delete_tweet(&self, actor: &Actor, tweet_id: &str) -> AppResult<()> {
        let tweet = load_owned(&self.store.tweets, tweet_id, &actor.id).await?;
        self.cascade.delete_tweet(&tweet.id).await
    }
}
