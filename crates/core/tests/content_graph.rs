//! End-to-end behavior of the content graph over the in-memory store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Barrier;
use tubeline_common::{AppResult, ErrorKind, IdGenerator, InMemoryMediaStore, MediaUpload};
use tubeline_core::pagination::{HARD_CAP, resolve};
use tubeline_core::toggle::toggle;
use tubeline_core::{
    Actor, CommentInput, CreatePlaylistInput, PageRequest, PublishVideoInput, RegisterInput,
    Services, TweetInput, UpdatePlaylistInput, UpdateVideoInput, VideoFeedQuery,
};
use tubeline_db::entities::{subscription, user, video};
use tubeline_db::store::{
    Collection, Filter, FindOptions, MemoryCollection, MonotonicClock, Patch, SharedCollection,
    Store,
};

struct World {
    store: Store,
    services: Services,
}

impl World {
    fn new() -> Self {
        let store = Store::in_memory();
        let media = Arc::new(InMemoryMediaStore::new());
        Self {
            services: Services::new(store.clone(), media),
            store,
        }
    }

    async fn user(&self, username: &str) -> (user::Model, Actor) {
        let user = self
            .services
            .users
            .register(
                RegisterInput {
                    fullname: username.to_string(),
                    email: format!("{username}@example.com"),
                    username: username.to_string(),
                },
                MediaUpload::new("avatar.png", vec![1]),
                None,
            )
            .await
            .unwrap();
        let actor = Actor::new(user.id.clone());
        (user, actor)
    }

    async fn video(&self, owner: &Actor, title: &str) -> video::Model {
        self.services
            .videos
            .publish_video(
                owner,
                PublishVideoInput {
                    title: title.to_string(),
                    description: "description".to_string(),
                    duration_seconds: 42,
                },
                MediaUpload::new("clip.mp4", vec![1, 2]),
                MediaUpload::new("thumb.jpg", vec![3]),
            )
            .await
            .unwrap()
    }
}

/// Subscriptions whose lookups wait for every racer before answering, so all
/// of them observe the relation as absent.
struct LockstepLookups {
    inner: MemoryCollection<subscription::Model>,
    barrier: Barrier,
}

#[async_trait]
impl Collection<subscription::Model> for LockstepLookups {
    async fn get(&self, id: &str) -> AppResult<Option<subscription::Model>> {
        self.inner.get(id).await
    }
    async fn create(&self, doc: subscription::Model) -> AppResult<subscription::Model> {
        self.inner.create(doc).await
    }
    async fn update(&self, id: &str, patch: Patch) -> AppResult<Option<subscription::Model>> {
        self.inner.update(id, patch).await
    }
    async fn update_many(&self, filter: &Filter, patch: Patch) -> AppResult<u64> {
        self.inner.update_many(filter, patch).await
    }
    async fn delete(&self, id: &str) -> AppResult<bool> {
        self.inner.delete(id).await
    }
    async fn delete_one(&self, filter: &Filter) -> AppResult<Option<subscription::Model>> {
        self.inner.delete_one(filter).await
    }
    async fn delete_many(&self, filter: &Filter) -> AppResult<u64> {
        self.inner.delete_many(filter).await
    }
    async fn count(&self, filter: &Filter) -> AppResult<u64> {
        self.inner.count(filter).await
    }
    async fn find(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> AppResult<Vec<subscription::Model>> {
        let found = self.inner.find(filter, options).await?;
        self.barrier.wait().await;
        Ok(found)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_from_inactive_leave_one_row() {
    const RACERS: usize = 8;
    let subscriptions: SharedCollection<subscription::Model> = Arc::new(LockstepLookups {
        inner: MemoryCollection::new(Arc::new(MonotonicClock::default())),
        barrier: Barrier::new(RACERS),
    });
    let filter = Filter::all()
        .eq("subscriber_id", "subscriber")
        .eq("channel_id", "channel");

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let subscriptions = subscriptions.clone();
            let filter = filter.clone();
            tokio::spawn(async move {
                toggle(&subscriptions, &filter, || {
                    let now = chrono::Utc::now().fixed_offset();
                    subscription::Model {
                        id: IdGenerator::new().generate(),
                        subscriber_id: "subscriber".to_string(),
                        channel_id: "channel".to_string(),
                        created_at: now,
                        updated_at: now,
                    }
                })
                .await
            })
        })
        .collect();

    let states: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(subscriptions.count(&Filter::all()).await.unwrap(), 1);
    assert!(states.iter().all(|state| state.active));
}

#[tokio::test]
async fn test_toggles_are_their_own_inverse() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;
    let (_, bob) = world.user("bob").await;
    let video = world.video(&alice, "clip").await;
    let tweet = world
        .services
        .tweets
        .create_tweet(
            &alice,
            TweetInput {
                content: "hi".to_string(),
            },
        )
        .await
        .unwrap();

    let likes = &world.services.likes;
    assert!(likes.toggle_video_like(&bob, &video.id).await.unwrap().active);
    assert!(likes.toggle_tweet_like(&bob, &tweet.id).await.unwrap().active);
    assert!(!likes.toggle_video_like(&bob, &video.id).await.unwrap().active);
    assert!(!likes.toggle_tweet_like(&bob, &tweet.id).await.unwrap().active);
    assert_eq!(world.store.likes.count(&Filter::all()).await.unwrap(), 0);

    let subs = &world.services.subscriptions;
    assert!(subs.toggle_subscription(&bob, &alice.id).await.unwrap().active);
    assert!(!subs.toggle_subscription(&bob, &alice.id).await.unwrap().active);
    assert_eq!(world.store.subscriptions.count(&Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_deleting_a_video_removes_its_comments_and_likes() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;
    let (_, bob) = world.user("bob").await;
    let (_, carol) = world.user("carol").await;
    let doomed = world.video(&alice, "doomed").await;
    let kept = world.video(&alice, "kept").await;

    let likes = &world.services.likes;
    for actor in [&alice, &bob, &carol] {
        likes.toggle_video_like(actor, &doomed.id).await.unwrap();
    }
    likes.toggle_video_like(&bob, &kept.id).await.unwrap();

    let comments = &world.services.comments;
    let mut comment_ids = Vec::new();
    for (actor, text) in [(&bob, "first"), (&carol, "second")] {
        let comment = comments
            .add_comment(
                actor,
                &doomed.id,
                CommentInput {
                    content: text.to_string(),
                },
            )
            .await
            .unwrap();
        likes.toggle_comment_like(&alice, &comment.id).await.unwrap();
        comment_ids.push(comment.id);
    }

    world.services.videos.delete_video(&alice, &doomed.id).await.unwrap();

    let referencing = Filter::all().is_in(
        "target_id",
        comment_ids
            .iter()
            .map(String::as_str)
            .chain([doomed.id.as_str()]),
    );
    assert_eq!(world.store.likes.count(&referencing).await.unwrap(), 0);
    let on_video = Filter::all().eq("video_id", doomed.id.as_str());
    assert_eq!(world.store.comments.count(&on_video).await.unwrap(), 0);
    assert_eq!(world.store.likes.count(&Filter::all()).await.unwrap(), 1);
    assert!(world.store.videos.get(&kept.id).await.unwrap().is_some());
}

#[test]
fn test_pagination_is_bounded() {
    for (page, limit, expected) in [
        (Some("1"), Some("500"), (1, 0, 50)),
        (Some("0"), Some("10"), (1, 0, 10)),
        (Some("-4"), None, (1, 0, 10)),
        (Some("3"), Some("7"), (3, 14, 7)),
        (Some("two"), Some("0"), (1, 0, 1)),
    ] {
        let window = resolve(page, limit, HARD_CAP);
        assert_eq!((window.page, window.skip, window.limit), expected);
    }
}

#[tokio::test]
async fn test_oversized_page_requests_are_capped() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;
    world.video(&alice, "only").await;

    let query = VideoFeedQuery {
        limit: Some("1000".to_string()),
        ..VideoFeedQuery::default()
    };
    let page = world.services.videos.list_videos(&query).await.unwrap();
    assert_eq!(page.info.limit, 50);
    assert_eq!(page.info.total_pages, 1);
    assert!(!page.info.has_next);
}

#[tokio::test]
async fn test_strangers_cannot_mutate_owned_entities() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;
    let (_, mallory) = world.user("mallory").await;
    let video = world.video(&alice, "clip").await;
    let comment = world
        .services
        .comments
        .add_comment(
            &alice,
            &video.id,
            CommentInput {
                content: "mine".to_string(),
            },
        )
        .await
        .unwrap();
    let tweet = world
        .services
        .tweets
        .create_tweet(
            &alice,
            TweetInput {
                content: "mine".to_string(),
            },
        )
        .await
        .unwrap();
    let playlist = world
        .services
        .playlists
        .create_playlist(
            &alice,
            CreatePlaylistInput {
                name: "mine".to_string(),
                description: "mine".to_string(),
            },
        )
        .await
        .unwrap();

    let s = &world.services;
    let results = [
        s.videos
            .update_video(
                &mallory,
                &video.id,
                UpdateVideoInput {
                    title: Some("x".to_string()),
                    description: None,
                },
                None,
            )
            .await
            .map(drop),
        s.videos.toggle_publish(&mallory, &video.id).await.map(drop),
        s.videos.delete_video(&mallory, &video.id).await,
        s.comments
            .update_comment(
                &mallory,
                &comment.id,
                CommentInput {
                    content: "x".to_string(),
                },
            )
            .await
            .map(drop),
        s.comments.delete_comment(&mallory, &comment.id).await,
        s.tweets
            .update_tweet(
                &mallory,
                &tweet.id,
                TweetInput {
                    content: "x".to_string(),
                },
            )
            .await
            .map(drop),
        s.tweets.delete_tweet(&mallory, &tweet.id).await,
        s.playlists
            .update_playlist(
                &mallory,
                &playlist.id,
                UpdatePlaylistInput {
                    name: Some("x".to_string()),
                    description: None,
                },
            )
            .await
            .map(drop),
        s.playlists
            .add_video(&mallory, &playlist.id, &video.id)
            .await
            .map(drop),
        s.playlists.delete_playlist(&mallory, &playlist.id).await,
    ];
    for result in results {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Forbidden);
    }

    assert_eq!(world.store.videos.fetch(&video.id).await.unwrap(), video);
    assert_eq!(world.store.comments.fetch(&comment.id).await.unwrap(), comment);
    assert_eq!(world.store.tweets.fetch(&tweet.id).await.unwrap(), tweet);
    assert_eq!(world.store.playlists.fetch(&playlist.id).await.unwrap(), playlist);
}

#[tokio::test]
async fn test_unliked_video_still_listed_with_zero_counts() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;
    let (_, bob) = world.user("bob").await;
    let quiet = world.video(&alice, "quiet").await;

    let page = world
        .services
        .videos
        .list_videos(&VideoFeedQuery::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, quiet.id);
    assert_eq!(page.items[0].likes_count, 0);

    for viewer in [None, Some(&bob)] {
        let detail = world.services.videos.get_video(&quiet.id, viewer).await.unwrap();
        assert_eq!(detail.likes_count, 0);
        assert!(!detail.is_liked);
    }
}

#[tokio::test]
async fn test_self_subscription_is_rejected() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;

    for _ in 0..2 {
        let err = world
            .services
            .subscriptions
            .toggle_subscription(&alice, &alice.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(world.store.subscriptions.count(&Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_removing_a_video_twice_from_a_playlist_fails() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;
    let v1 = world.video(&alice, "v1").await;
    let v2 = world.video(&alice, "v2").await;

    let playlists = &world.services.playlists;
    let playlist = playlists
        .create_playlist(
            &alice,
            CreatePlaylistInput {
                name: "P".to_string(),
                description: "two videos".to_string(),
            },
        )
        .await
        .unwrap();
    playlists.add_video(&alice, &playlist.id, &v1.id).await.unwrap();
    playlists.add_video(&alice, &playlist.id, &v2.id).await.unwrap();

    let after = playlists.remove_video(&alice, &playlist.id, &v1.id).await.unwrap();
    assert_eq!(after.videos.0, [v2.id.clone()]);

    let err = playlists
        .remove_video(&alice, &playlist.id, &v1.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("not in the playlist"));

    let detail = playlists.get_playlist(&playlist.id).await.unwrap();
    assert_eq!(detail.videos.len(), 1);
    assert_eq!(detail.videos[0].id, v2.id);
}

#[tokio::test]
async fn test_liked_videos_forget_deleted_videos() {
    let world = World::new();
    let (_, alice) = world.user("alice").await;
    let (_, bob) = world.user("bob").await;
    let video = world.video(&alice, "gone soon").await;
    world.services.likes.toggle_video_like(&bob, &video.id).await.unwrap();

    world.services.videos.delete_video(&alice, &video.id).await.unwrap();
    let page = world
        .services
        .likes
        .liked_videos(&bob, &PageRequest::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.info.total_count, 0);
}
