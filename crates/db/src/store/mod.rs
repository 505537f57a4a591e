//! Entity store.
//!
//! Every persisted record type implements [`Document`] and lives in a
//! [`Collection`]. Two backends exist: [`SeaOrmCollection`] for PostgreSQL
//! and [`MemoryCollection`] for tests and embedded use. Both enforce the same
//! uniqueness rules and report violations as [`AppError::Conflict`].

mod memory;
mod query;
mod sea;

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tubeline_common::{AppError, AppResult};

pub use memory::{MemoryCollection, MonotonicClock};
pub use query::{
    Condition, FieldOp, Filter, FindOptions, Patch, Row, SortDirection, SortKey, compare_values,
    sort_rows,
};
pub use sea::SeaOrmCollection;

use crate::entities::{comment, like, playlist, subscription, tweet, user, video};

/// Names of the stored collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    Users,
    Videos,
    Comments,
    Tweets,
    Likes,
    Subscriptions,
    Playlists,
}

impl CollectionName {
    /// Human label used in "not found" messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Users => "User",
            Self::Videos => "Video",
            Self::Comments => "Comment",
            Self::Tweets => "Tweet",
            Self::Likes => "Like",
            Self::Subscriptions => "Subscription",
            Self::Playlists => "Playlist",
        }
    }

    /// Table name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "user",
            Self::Videos => "video",
            Self::Comments => "comment",
            Self::Tweets => "tweet",
            Self::Likes => "like",
            Self::Subscriptions => "subscription",
            Self::Playlists => "playlist",
        }
    }
}

/// A value that must be unique across a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
    name: &'static str,
    value: String,
}

impl UniqueKey {
    /// Build a key from its component parts.
    #[must_use]
    pub fn new<const N: usize>(name: &'static str, parts: [&str; N]) -> Self {
        Self {
            name,
            value: parts.join("\u{1f}"),
        }
    }

    /// Constraint name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// A record stored in a [`Collection`].
///
/// The serde representation uses the column names, so a serialized
/// document is also the row the query values in this module talk about.
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection the document lives in.
    const COLLECTION: CollectionName;

    /// Primary identifier.
    fn id(&self) -> &str;

    /// Uniqueness constraints this document participates in.
    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }

    /// Set both timestamps on insert.
    fn stamp_created(&mut self, now: DateTimeWithTimeZone);
}

/// Typed access to one collection.
#[async_trait]
pub trait Collection<D: Document>: Send + Sync {
    /// Look up by id.
    async fn get(&self, id: &str) -> AppResult<Option<D>>;

    /// Look up by id; a miss is [`AppError::NotFound`].
    async fn fetch(&self, id: &str) -> AppResult<D> {
        self.get(id)
            .await?
            .ok_or_else(|| AppError::not_found(D::COLLECTION.label()))
    }

    /// Insert a new document. Stamps `created_at` and `updated_at`.
    async fn create(&self, doc: D) -> AppResult<D>;

    /// Atomically apply `patch` and refresh `updated_at`.
    ///
    /// Returns `None` when no document has the id.
    async fn update(&self, id: &str, patch: Patch) -> AppResult<Option<D>>;

    /// Apply `patch` to every matching document. Returns the number updated.
    async fn update_many(&self, filter: &Filter, patch: Patch) -> AppResult<u64>;

    /// Delete by id. Returns whether a document was removed.
    async fn delete(&self, id: &str) -> AppResult<bool>;

    /// Delete the first matching document and return it.
    ///
    /// Of two concurrent callers matching the same single document, exactly
    /// one receives it.
    async fn delete_one(&self, filter: &Filter) -> AppResult<Option<D>>;

    /// Delete every matching document. Returns the number removed.
    async fn delete_many(&self, filter: &Filter) -> AppResult<u64>;

    /// Count matching documents.
    async fn count(&self, filter: &Filter) -> AppResult<u64>;

    /// Find matching documents.
    ///
    /// Ties on the sort keys break on `id` in the direction of the first key.
    async fn find(&self, filter: &Filter, options: &FindOptions) -> AppResult<Vec<D>>;

    /// First matching document under `sort`.
    async fn find_one(&self, filter: &Filter, sort: Vec<SortKey>) -> AppResult<Option<D>> {
        let options = FindOptions::sorted(sort).window(0, 1);
        Ok(self.find(filter, &options).await?.into_iter().next())
    }
}

/// Shared handle to a collection.
pub type SharedCollection<D> = Arc<dyn Collection<D>>;

/// Where a [`Store`]'s collections keep their documents.
#[derive(Clone)]
enum Backend {
    Postgres(Arc<DatabaseConnection>),
    Memory,
    /// Collections bound to an open database transaction.
    Transaction,
}

/// All collections of one store.
#[derive(Clone)]
pub struct Store {
    pub users: SharedCollection<user::Model>,
    pub videos: SharedCollection<video::Model>,
    pub comments: SharedCollection<comment::Model>,
    pub tweets: SharedCollection<tweet::Model>,
    pub likes: SharedCollection<like::Model>,
    pub subscriptions: SharedCollection<subscription::Model>,
    pub playlists: SharedCollection<playlist::Model>,
    backend: Backend,
}

impl Store {
    /// PostgreSQL-backed store.
    #[must_use]
    pub fn connect(db: Arc<DatabaseConnection>) -> Self {
        Self::over(db.clone(), Backend::Postgres(db))
    }

    fn over<C>(conn: Arc<C>, backend: Backend) -> Self
    where
        C: ConnectionTrait + TransactionTrait + Send + Sync + 'static,
    {
        Self {
            users: Arc::new(SeaOrmCollection::<user::Entity, C>::within(conn.clone())),
            videos: Arc::new(SeaOrmCollection::<video::Entity, C>::within(conn.clone())),
            comments: Arc::new(SeaOrmCollection::<comment::Entity, C>::within(conn.clone())),
            tweets: Arc::new(SeaOrmCollection::<tweet::Entity, C>::within(conn.clone())),
            likes: Arc::new(SeaOrmCollection::<like::Entity, C>::within(conn.clone())),
            subscriptions: Arc::new(SeaOrmCollection::<subscription::Entity, C>::within(
                conn.clone(),
            )),
            playlists: Arc::new(SeaOrmCollection::<playlist::Entity, C>::within(conn)),
            backend,
        }
    }

    /// In-process store. All collections share one creation clock.
    #[must_use]
    pub fn in_memory() -> Self {
        let clock = Arc::new(MonotonicClock::default());
        Self {
            users: Arc::new(MemoryCollection::new(clock.clone())),
            videos: Arc::new(MemoryCollection::new(clock.clone())),
            comments: Arc::new(MemoryCollection::new(clock.clone())),
            tweets: Arc::new(MemoryCollection::new(clock.clone())),
            likes: Arc::new(MemoryCollection::new(clock.clone())),
            subscriptions: Arc::new(MemoryCollection::new(clock.clone())),
            playlists: Arc::new(MemoryCollection::new(clock)),
            backend: Backend::Memory,
        }
    }

    /// Run `work` so that its writes apply all together or not at all.
    ///
    /// On PostgreSQL `work` gets a store whose collections share one database
    /// transaction, committed when `work` succeeds. In memory `work` gets a
    /// handle to this store while its writes are journaled, and an error
    /// undoes them. The in-memory variant does not isolate `work` from
    /// concurrent writers. A nested call joins the enclosing transaction.
    ///
    /// `work` must not keep the store it is handed beyond its own future.
    pub async fn transaction<T, F, Fut>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match &self.backend {
            Backend::Postgres(db) => {
                let txn = Arc::new(db.begin().await?);
                let result = work(Self::over(txn.clone(), Backend::Transaction)).await;

                let Ok(txn) = Arc::try_unwrap(txn) else {
                    // The last handle rolls back when it drops.
                    return result.and(Err(AppError::Internal(
                        "transaction outlived its scope".to_string(),
                    )));
                };
                match result {
                    Ok(value) => {
                        txn.commit().await?;
                        Ok(value)
                    }
                    Err(err) => {
                        if let Err(rollback) = txn.rollback().await {
                            tracing::error!(error = %rollback, "Transaction rollback failed");
                        }
                        Err(err)
                    }
                }
            }
            Backend::Memory if !memory::in_transaction() => {
                let journal = Arc::new(memory::Journal::default());
                let result = journal.record(work(self.clone())).await;
                if result.is_err() {
                    journal.rollback().await;
                }
                result
            }
            Backend::Memory | Backend::Transaction => work(self.clone()).await,
        }
    }

    /// Find matching documents of `collection` as rows.
    pub async fn find_rows(
        &self,
        collection: CollectionName,
        filter: &Filter,
        options: &FindOptions,
    ) -> AppResult<Vec<Row>> {
        match collection {
            CollectionName::Users => to_rows(self.users.find(filter, options).await?),
            CollectionName::Videos => to_rows(self.videos.find(filter, options).await?),
            CollectionName::Comments => to_rows(self.comments.find(filter, options).await?),
            CollectionName::Tweets => to_rows(self.tweets.find(filter, options).await?),
            CollectionName::Likes => to_rows(self.likes.find(filter, options).await?),
            CollectionName::Subscriptions => {
                to_rows(self.subscriptions.find(filter, options).await?)
            }
            CollectionName::Playlists => to_rows(self.playlists.find(filter, options).await?),
        }
    }

    /// Look up one document of `collection` by id as a row.
    pub async fn get_row(&self, collection: CollectionName, id: &str) -> AppResult<Option<Row>> {
        let filter = Filter::all().eq("id", id);
        let options = FindOptions::default().window(0, 1);
        Ok(self
            .find_rows(collection, &filter, &options)
            .await?
            .into_iter()
            .next())
    }

    /// Count matching documents of `collection`.
    pub async fn count_rows(&self, collection: CollectionName, filter: &Filter) -> AppResult<u64> {
        match collection {
            CollectionName::Users => self.users.count(filter).await,
            CollectionName::Videos => self.videos.count(filter).await,
            CollectionName::Comments => self.comments.count(filter).await,
            CollectionName::Tweets => self.tweets.count(filter).await,
            CollectionName::Likes => self.likes.count(filter).await,
            CollectionName::Subscriptions => self.subscriptions.count(filter).await,
            CollectionName::Playlists => self.playlists.count(filter).await,
        }
    }
}

/// Serialize a document into a row.
pub fn to_row<D: Serialize>(doc: &D) -> AppResult<Row> {
    match serde_json::to_value(doc)? {
        serde_json::Value::Object(row) => Ok(row),
        _ => Err(AppError::Internal(
            "document did not serialize to an object".to_string(),
        )),
    }
}

fn to_rows<D: Serialize>(docs: Vec<D>) -> AppResult<Vec<Row>> {
    docs.iter().map(to_row).collect()
}

/// Deserialize a row back into a document.
pub fn from_row<D: DeserializeOwned>(row: Row) -> AppResult<D> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;
    use crate::entities::{IdList, user};

    fn user(id: &str, username: &str) -> user::Model {
        let now = chrono::Utc::now().fixed_offset();
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

    #[test]
    fn test_unique_key_parts_do_not_collide() {
        let a = UniqueKey::new("pair", ["ab", "c"]);
        let b = UniqueKey::new("pair", ["a", "bc"]);
        assert_ne!(a, b);
        assert_eq!(a.name(), "pair");
    }

    #[tokio::test]
    async fn test_row_access_by_collection_name() {
        let store = Store::in_memory();
        store.users.create(user("u1", "alice")).await.unwrap();
        store.users.create(user("u2", "bob")).await.unwrap();

        let row = store
            .get_row(CollectionName::Users, "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["username"], "alice");
        assert!(row["watch_history"].is_array());

        let count = store
            .count_rows(CollectionName::Users, &Filter::all().eq("username", "bob"))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(
            store
                .get_row(CollectionName::Videos, "u1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_memory_transaction_rolls_back_on_error() {
        let store = Store::in_memory();
        store.users.create(user("u1", "alice")).await.unwrap();

        let result: AppResult<()> = store
            .transaction(|store| async move {
                store.users.create(user("u2", "bob")).await?;
                store
                    .users
                    .update("u1", Patch::new().set("fullname", "Alice A."))
                    .await?;
                store.users.delete("u1").await?;
                Err(AppError::Database("disk full".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert!(store.users.get("u2").await.unwrap().is_none());
        let alice = store.users.fetch("u1").await.unwrap();
        assert_eq!(alice.fullname, "alice");
    }

    #[tokio::test]
    async fn test_memory_transaction_commits_and_nests() {
        let store = Store::in_memory();

        let created = store
            .transaction(|store| async move {
                store.users.create(user("u1", "alice")).await?;
                let inner: AppResult<()> = store
                    .transaction(|store| async move {
                        store.users.create(user("u2", "bob")).await?;
                        Err(AppError::Database("inner".to_string()))
                    })
                    .await;
                assert!(inner.is_err());
                store.count_rows(CollectionName::Users, &Filter::all()).await
            })
            .await
            .unwrap();

        // The inner scope joined the outer one, which succeeded.
        assert_eq!(created, 2);
        assert_eq!(store.users.count(&Filter::all()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_postgres_transaction_wraps_statements() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 2,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                ])
                .into_connection(),
        );
        let store = Store::connect(db.clone());

        let removed = store
            .transaction(|store| async move {
                let likes = store.likes.delete_many(&Filter::all().eq("target_id", "c1")).await?;
                let comments = store.comments.delete_many(&Filter::all().eq("id", "c1")).await?;
                Ok(likes + comments)
            })
            .await
            .unwrap();
        assert_eq!(removed, 3);

        drop(store);
        let log = Arc::try_unwrap(db).ok().unwrap().into_transaction_log();
        assert_eq!(log.len(), 1);
        let rendered = format!("{log:?}");
        assert_eq!(rendered.matches("DELETE FROM").count(), 2);
        assert!(rendered.contains("COMMIT"));
    }

    #[tokio::test]
    async fn test_postgres_transaction_rolls_back_on_error() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let store = Store::connect(db.clone());

        let result: AppResult<()> = store
            .transaction(|_store| async move { Err(AppError::Database("boom".to_string())) })
            .await;
        assert!(result.is_err());

        drop(store);
        let log = Arc::try_unwrap(db).ok().unwrap().into_transaction_log();
        assert!(format!("{log:?}").contains("ROLLBACK"));
    }
}
