//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `tubeline_test`)
//!   `TEST_DB_PASSWORD` (default: `tubeline_test`)
//!   `TEST_DB_NAME` (default: `tubeline_test`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;
use tubeline_common::ErrorKind;
use tubeline_db::entities::{IdList, like, playlist, user, video};
use tubeline_db::store::{Collection, Filter, FindOptions, Patch, SortKey, Store};
use tubeline_db::test_utils::{TestDatabase, TestDbConfig};

async fn store() -> Store {
    let db = TestDatabase::new().await.unwrap();
    Store::connect(Arc::new(db.into_connection()))
}

fn user(id: &str, username: &str) -> user::Model {
    let now = Utc::now().fixed_offset();
    user::Model {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        fullname: username.to_string(),
        avatar: "memory://avatar".to_string(),
        cover_image: None,
        watch_history: IdList::default(),
        created_at: now,
        updated_at: now,
    }
}

fn video(id: &str, owner: &str, title: &str) -> video::Model {
    let now = Utc::now().fixed_offset();
    video::Model {
        id: id.to_string(),
        owner_id: owner.to_string(),
        title: title.to_string(),
        description: "about rust".to_string(),
        video_file: "memory://file".to_string(),
        thumbnail: "memory://thumb".to_string(),
        duration_seconds: 10,
        views: 0,
        is_published: true,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_unique_username_is_conflict() {
    let store = store().await;
    store.users.create(user("u1", "alice")).await.unwrap();

    let mut dup = user("u2", "alice");
    dup.email = "other@example.com".to_string();
    let err = store.users.create(dup).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_duplicate_like_is_conflict() {
    let store = store().await;
    store.users.create(user("u1", "alice")).await.unwrap();
    let now = Utc::now().fixed_offset();
    let like = |id: &str| like::Model {
        id: id.to_string(),
        liked_by_id: "u1".to_string(),
        target_type: like::TargetType::Video,
        target_id: "v1".to_string(),
        created_at: now,
        updated_at: now,
    };

    store.likes.create(like("l1")).await.unwrap();
    let err = store.likes.create(like("l2")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_search_sort_and_increment() {
    let store = store().await;
    store.users.create(user("u1", "alice")).await.unwrap();
    store.videos.create(video("v1", "u1", "Learning Rust")).await.unwrap();
    store.videos.create(video("v2", "u1", "Cooking")).await.unwrap();

    store
        .videos
        .update("v2", Patch::new().increment("views", 5))
        .await
        .unwrap();

    let found = store
        .videos
        .find(
            &Filter::all().search(vec!["title"], "RUST"),
            &FindOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "v1");

    let by_views = store
        .videos
        .find(
            &Filter::all(),
            &FindOptions::sorted(vec![SortKey::desc("views")]),
        )
        .await
        .unwrap();
    assert_eq!(by_views[0].id, "v2");
    assert_eq!(by_views[0].views, 5);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_pull_from_jsonb_array() {
    let store = store().await;
    store.users.create(user("u1", "alice")).await.unwrap();
    let now = Utc::now().fixed_offset();
    store
        .playlists
        .create(playlist::Model {
            id: "p1".to_string(),
            owner_id: "u1".to_string(),
            name: "Mix".to_string(),
            description: String::new(),
            videos: IdList(vec!["v1".to_string(), "v2".to_string()]),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let touched = store
        .playlists
        .update_many(
            &Filter::all().contains("videos", "v1"),
            Patch::new().pull("videos", "v1"),
        )
        .await
        .unwrap();
    assert_eq!(touched, 1);
    let playlist = store.playlists.fetch("p1").await.unwrap();
    assert_eq!(playlist.videos.0, ["v2"]);
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(config.database_url().starts_with("postgres://"));
}
