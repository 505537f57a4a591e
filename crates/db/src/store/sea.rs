//! PostgreSQL collection backend on sea-orm.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::extension::postgres::PgBinOper;
use sea_orm::sea_query::{Alias, Expr, Func};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IdenStatic, IntoActiveModel, Iterable, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use serde_json::Value;
use tubeline_common::{AppError, AppResult};

use super::query::{Condition, Filter, FindOptions, Patch, SortDirection};
use super::{Collection, Document, from_row, to_row};

/// Collection stored in the table of entity `E`.
///
/// `C` is the pool connection, or the open
/// [`DatabaseTransaction`](sea_orm::DatabaseTransaction) of a
/// [`Store::transaction`](super::Store::transaction) scope.
pub struct SeaOrmCollection<E, C = DatabaseConnection> {
    db: Arc<C>,
    entity: PhantomData<fn() -> E>,
}

impl<E: EntityTrait> SeaOrmCollection<E> {
    /// Create a collection over a shared connection.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self::within(db)
    }
}

impl<E: EntityTrait, C> SeaOrmCollection<E, C> {
    /// Create a collection whose statements run on `conn`.
    #[must_use]
    pub const fn within(conn: Arc<C>) -> Self {
        Self {
            db: conn,
            entity: PhantomData,
        }
    }
}

fn column<E: EntityTrait>(name: &str) -> AppResult<E::Column> {
    E::Column::iter()
        .find(|col| col.as_str() == name)
        .ok_or_else(|| {
            AppError::Internal(format!(
                "unknown column {}.{name}",
                E::default().table_name()
            ))
        })
}

fn column_expr<E: EntityTrait>(name: &str) -> AppResult<Expr> {
    Ok(Expr::col((E::default(), column::<E>(name)?)))
}

fn sea_value(value: &Value) -> AppResult<sea_orm::Value> {
    match value {
        Value::String(s) => Ok(s.clone().into()),
        Value::Bool(b) => Ok((*b).into()),
        Value::Number(n) => n
            .as_i64()
            .map(Into::into)
            .or_else(|| n.as_f64().map(Into::into))
            .ok_or_else(|| AppError::Internal(format!("unsupported number {n}"))),
        other => Err(AppError::Internal(format!(
            "unsupported filter value {other}"
        ))),
    }
}

/// Escape LIKE metacharacters; PostgreSQL's default escape is backslash.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn condition<E: EntityTrait>(filter: &Filter) -> AppResult<sea_orm::Condition> {
    let mut all = sea_orm::Condition::all();
    for cond in filter.conditions() {
        all = match cond {
            Condition::Eq(field, Value::Null) => all.add(column_expr::<E>(field)?.is_null()),
            Condition::Eq(field, value) => all.add(column_expr::<E>(field)?.eq(sea_value(value)?)),
            Condition::In(field, values) => {
                let values = values.iter().map(sea_value).collect::<AppResult<Vec<_>>>()?;
                all.add(column_expr::<E>(field)?.is_in(values))
            }
            Condition::Contains(field, value) => all.add(
                column_expr::<E>(field)?.binary(
                    PgBinOper::Contains,
                    Expr::val(Value::Array(vec![value.clone()])).cast_as(Alias::new("jsonb")),
                ),
            ),
            Condition::Search(fields, text) => {
                let pattern = like_pattern(text);
                let mut any = sea_orm::Condition::any();
                for field in fields {
                    any = any.add(
                        Expr::expr(Func::lower(column_expr::<E>(field)?)).like(pattern.clone()),
                    );
                }
                all.add(any)
            }
        };
    }
    Ok(all)
}

const fn order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

/// Mark the named fields of an active model as changed.
fn mark_set<E, A>(active: &mut A, fields: &[&str]) -> AppResult<()>
where
    E: EntityTrait,
    A: ActiveModelTrait<Entity = E>,
{
    for field in fields {
        let col = column::<E>(field)?;
        if let Some(value) = active.get(col).into_value() {
            active.set(col, value);
        }
    }
    Ok(())
}

impl<E, C> SeaOrmCollection<E, C>
where
    E: EntityTrait,
    E::Model: Document + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + Sync,
{
    fn id_filter(id: &str) -> Filter {
        Filter::all().eq("id", id)
    }

    /// Apply `patch` to a row already locked by the caller.
    async fn write_patch<Conn: ConnectionTrait>(
        conn: &Conn,
        current: E::Model,
        patch: &Patch,
    ) -> AppResult<E::Model> {
        let mut row = to_row(&current)?;
        patch.apply(&mut row)?;
        let next: E::Model = from_row(row)?;

        let mut active = next.into_active_model();
        mark_set::<E, _>(&mut active, &patch.fields())?;
        active.set(
            column::<E>("updated_at")?,
            Utc::now().fixed_offset().into(),
        );
        Ok(active.update(conn).await?)
    }
}

#[async_trait]
impl<E, C> Collection<E::Model> for SeaOrmCollection<E, C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync + 'static,
    E: EntityTrait,
    E::Model: Document + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + Sync,
{
    async fn get(&self, id: &str) -> AppResult<Option<E::Model>> {
        Ok(E::find()
            .filter(condition::<E>(&Self::id_filter(id))?)
            .one(self.db.as_ref())
            .await?)
    }

    async fn create(&self, mut doc: E::Model) -> AppResult<E::Model> {
        doc.stamp_created(Utc::now().fixed_offset());
        let mut active = doc.into_active_model();
        let columns: Vec<E::Column> = E::Column::iter().collect();
        let fields: Vec<&str> = columns.iter().map(|col| col.as_str()).collect();
        mark_set::<E, _>(&mut active, &fields)?;
        Ok(active.insert(self.db.as_ref()).await?)
    }

    async fn update(&self, id: &str, patch: Patch) -> AppResult<Option<E::Model>> {
        let txn = self.db.begin().await?;
        let current = E::find()
            .filter(condition::<E>(&Self::id_filter(id))?)
            .lock_exclusive()
            .one(&txn)
            .await?;
        let Some(current) = current else {
            txn.rollback().await?;
            return Ok(None);
        };
        let next = Self::write_patch(&txn, current, &patch).await?;
        txn.commit().await?;
        Ok(Some(next))
    }

    async fn update_many(&self, filter: &Filter, patch: Patch) -> AppResult<u64> {
        let txn = self.db.begin().await?;
        let rows = E::find()
            .filter(condition::<E>(filter)?)
            .lock_exclusive()
            .all(&txn)
            .await?;
        let count = rows.len() as u64;
        for current in rows {
            Self::write_patch(&txn, current, &patch).await?;
        }
        txn.commit().await?;
        Ok(count)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = E::delete_many()
            .filter(condition::<E>(&Self::id_filter(id))?)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_one(&self, filter: &Filter) -> AppResult<Option<E::Model>> {
        let Some(found) = E::find()
            .filter(condition::<E>(filter)?)
            .order_by(column::<E>("id")?, Order::Asc)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };
        // Whoever removes the row owns it; a concurrent caller sees zero rows.
        let result = E::delete_many()
            .filter(condition::<E>(&Self::id_filter(found.id()))?)
            .exec(self.db.as_ref())
            .await?;
        Ok((result.rows_affected > 0).then_some(found))
    }

    async fn delete_many(&self, filter: &Filter) -> AppResult<u64> {
        let result = E::delete_many()
            .filter(condition::<E>(filter)?)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn count(&self, filter: &Filter) -> AppResult<u64> {
        Ok(E::find()
            .filter(condition::<E>(filter)?)
            .count(self.db.as_ref())
            .await?)
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> AppResult<Vec<E::Model>> {
        let mut query = E::find().filter(condition::<E>(filter)?);
        for key in &options.sort {
            query = query.order_by(column::<E>(key.field)?, order(key.direction));
        }
        let tiebreak = options
            .sort
            .first()
            .map_or(SortDirection::Desc, |key| key.direction);
        query = query.order_by(column::<E>("id")?, order(tiebreak));

        if options.skip > 0 {
            query = query.offset(options.skip);
        }
        if let Some(limit) = options.limit {
            query = query.limit(limit);
        }
        Ok(query.all(self.db.as_ref()).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::{IdList, playlist, video};
    use crate::store::SortKey;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, QueryTrait};
    use tubeline_common::ErrorKind;

    fn create_test_video(id: &str, views: i64) -> video::Model {
        let now = Utc::now().fixed_offset();
        video::Model {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            title: "Title".to_string(),
            description: "Description".to_string(),
            video_file: "memory://file".to_string(),
            thumbnail: "memory://thumb".to_string(),
            duration_seconds: 42,
            views,
            is_published: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("Rust"), "%rust%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }

    #[test]
    fn test_unknown_column_is_internal_error() {
        let err = column::<video::Entity>("no_such_column").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert!(column::<video::Entity>("owner_id").is_ok());
    }

    #[test]
    fn test_condition_renders_search_and_membership() {
        let filter = Filter::all()
            .eq("is_published", true)
            .is_in("owner_id", ["u1", "u2"])
            .search(vec!["title", "description"], "Rust");
        let sql = video::Entity::find()
            .filter(condition::<video::Entity>(&filter).unwrap())
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""video"."is_published" = "#));
        assert!(sql.contains(r#""video"."owner_id" IN ("#));
        assert!(sql.contains(r#"LOWER("video"."title") LIKE"#));
        assert!(sql.contains(r#"LOWER("video"."description") LIKE"#));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn test_condition_renders_jsonb_containment() {
        let filter = Filter::all().contains("videos", "v1");
        let sql = playlist::Entity::find()
            .filter(condition::<playlist::Entity>(&filter).unwrap())
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""playlist"."videos" @>"#));
    }

    #[tokio::test]
    async fn test_get_returns_row() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_video("v1", 3)]])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        let found = videos.get("v1").await.unwrap().unwrap();
        assert_eq!(found.id, "v1");
        assert_eq!(found.views, 3);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<video::Model>::new()])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        let err = videos.fetch("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Video not found");
    }

    #[tokio::test]
    async fn test_update_increments_inside_transaction() {
        let before = create_test_video("v1", 3);
        let after = video::Model {
            views: 4,
            ..before.clone()
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[before]])
                .append_query_results([[after]])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        let updated = videos
            .update("v1", Patch::new().increment("views", 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.views, 4);
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<video::Model>::new()])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        assert!(videos.update("v1", Patch::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_affected_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        assert!(videos.delete("v1").await.unwrap());
        assert!(!videos.delete("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_one_loses_race() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_video("v1", 0)]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        let removed = videos
            .delete_one(&Filter::all().eq("owner_id", "u1"))
            .await
            .unwrap();
        assert!(removed.is_none());
    }

    #[tokio::test]
    async fn test_count_returns_correct_count() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(7))
                }]])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        let count = videos
            .count(&Filter::all().eq("owner_id", "u1"))
            .await
            .unwrap();
        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn test_find_orders_with_id_tiebreak() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_video("v2", 9), create_test_video("v1", 5)]])
                .into_connection(),
        );

        let videos = SeaOrmCollection::<video::Entity>::new(db);
        let options = FindOptions::sorted(vec![SortKey::desc("views")]).window(10, 5);
        let found = videos.find(&Filter::all(), &options).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "v2");
    }

    #[tokio::test]
    async fn test_create_inserts_every_column() {
        let playlist = playlist::Model {
            id: "p1".to_string(),
            owner_id: "u1".to_string(),
            name: "Mix".to_string(),
            description: "Best of".to_string(),
            videos: IdList::default(),
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[playlist.clone()]])
                .into_connection(),
        );

        let playlists = SeaOrmCollection::<playlist::Entity>::new(db);
        let created = playlists.create(playlist).await.unwrap();
        assert_eq!(created.id, "p1");
    }
}
