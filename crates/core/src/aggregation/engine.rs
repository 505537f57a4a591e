//! Pipeline interpreter over the entity store.

use std::collections::{BTreeMap, BTreeSet};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tubeline_common::AppResult;
use tubeline_db::store::{Filter, FindOptions, Row, SortKey, Store, from_row, sort_rows};

use super::pipeline::{Cardinality, Derive, Join, Parts, Pipeline, Stage};
use crate::pagination::{Page, PageWindow};

/// Runs [`Pipeline`]s.
///
/// When no sort key names a joined or derived field, filter, sort and window
/// go to the store and only the page is joined. Otherwise every match is
/// joined and sorted here. Both paths yield the same rows.
#[derive(Clone)]
pub struct QueryEngine {
    store: Store,
    pushdown: bool,
}

impl QueryEngine {
    /// Create an engine over `store`.
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self {
            store,
            pushdown: true,
        }
    }

    /// Always join every match before sorting.
    #[must_use]
    pub const fn without_pushdown(mut self) -> Self {
        self.pushdown = false;
        self
    }

    /// Run a pipeline.
    pub async fn run(&self, pipeline: &Pipeline) -> AppResult<Vec<Row>> {
        pipeline.validate()?;
        let parts = Parts::of(pipeline.stages());
        let default_sort = [SortKey::desc("created_at")];
        let sort = parts.sort.unwrap_or(&default_sort);

        let pushdown = self.pushdown && !parts.sorts_on_derived();
        tracing::debug!(
            source = pipeline.source().as_str(),
            pushdown,
            "Running aggregation pipeline"
        );

        let rows = if pushdown {
            let options = FindOptions {
                sort: sort.to_vec(),
                skip: parts.skip,
                limit: parts.limit,
            };
            let rows = self
                .store
                .find_rows(pipeline.source(), &parts.filter, &options)
                .await?;
            self.enrich(rows, &parts.enrich).await?
        } else {
            let rows = self
                .store
                .find_rows(pipeline.source(), &parts.filter, &FindOptions::default())
                .await?;
            let mut rows = self.enrich(rows, &parts.enrich).await?;
            sort_rows(&mut rows, sort);
            window(rows, parts.skip, parts.limit)
        };

        Ok(match parts.project {
            Some(fields) => rows.into_iter().map(|row| project(row, fields)).collect(),
            None => rows,
        })
    }

    /// Run a pipeline and decode every row.
    pub async fn collect<T: DeserializeOwned>(&self, pipeline: &Pipeline) -> AppResult<Vec<T>> {
        self.run(pipeline).await?.into_iter().map(from_row).collect()
    }

    /// Run a pipeline and decode the first row.
    pub async fn first<T: DeserializeOwned>(&self, pipeline: Pipeline) -> AppResult<Option<T>> {
        let pipeline = pipeline.limit(1);
        self.run(&pipeline)
            .await?
            .into_iter()
            .next()
            .map(from_row)
            .transpose()
    }

    /// Number of rows the pipeline's match stage selects.
    pub async fn count(&self, pipeline: &Pipeline) -> AppResult<u64> {
        pipeline.validate()?;
        let parts = Parts::of(pipeline.stages());
        self.store
            .count_rows(pipeline.source(), &parts.filter)
            .await
    }

    /// Run one page of a pipeline that has no skip or limit of its own.
    pub async fn page<T: DeserializeOwned>(
        &self,
        pipeline: Pipeline,
        window: PageWindow,
    ) -> AppResult<Page<T>> {
        let total = self.count(&pipeline).await?;
        let items = if window.skip >= total {
            Vec::new()
        } else {
            let pipeline = pipeline.skip(window.skip).limit(window.limit);
            self.collect(&pipeline).await?
        };
        Ok(Page::new(items, window, total))
    }

    fn enrich<'a>(
        &'a self,
        rows: Vec<Row>,
        stages: &'a [&'a Stage],
    ) -> BoxFuture<'a, AppResult<Vec<Row>>> {
        async move {
            let mut rows = rows;
            for stage in stages {
                match stage {
                    Stage::Join(join) => self.join(&mut rows, join).await?,
                    Stage::Derive(derive) => self.derive(&mut rows, derive).await?,
                    _ => {}
                }
            }
            Ok(rows)
        }
        .boxed()
    }

    async fn join(&self, rows: &mut [Row], join: &Join) -> AppResult<()> {
        let keys = local_keys(rows, join.local);
        let parts = Parts::of(&join.stages);

        let matches: Vec<(Value, Row)> = if keys.is_empty() {
            Vec::new()
        } else {
            let filter = parts
                .filter
                .clone()
                .and(Filter::all().is_in(join.foreign, keys));
            let default_sort = [SortKey::desc("created_at")];
            let sort = parts.sort.unwrap_or(&default_sort);
            let found = self
                .store
                .find_rows(join.collection, &filter, &FindOptions::sorted(sort.to_vec()))
                .await?;
            let found = self.enrich(found, &parts.enrich).await?;
            found
                .into_iter()
                .map(|row| {
                    let key = row.get(join.foreign).cloned().unwrap_or(Value::Null);
                    let row = match parts.project {
                        Some(fields) => project(row, fields),
                        None => row,
                    };
                    (key, row)
                })
                .collect()
        };

        for row in rows.iter_mut() {
            let local = row.get(join.local).cloned().unwrap_or(Value::Null);
            let joined = match (join.cardinality, &local) {
                (Cardinality::One, Value::Array(items)) => items
                    .iter()
                    .find_map(|item| matching(&matches, item).next())
                    .unwrap_or(Value::Null),
                (Cardinality::One, key) => matching(&matches, key).next().unwrap_or(Value::Null),
                (Cardinality::Many, Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .flat_map(|item| matching(&matches, item))
                        .collect(),
                ),
                (Cardinality::Many, key) => Value::Array(matching(&matches, key).collect()),
            };
            row.insert(join.into.to_string(), joined);
        }
        Ok(())
    }

    async fn derive(&self, rows: &mut [Row], derive: &Derive) -> AppResult<()> {
        match derive {
            Derive::Count {
                into,
                collection,
                foreign,
                local,
                filter,
            } => {
                let (foreign, local) = (*foreign, *local);
                let keys = local_keys(rows, local);
                let mut counts: BTreeMap<String, u64> = BTreeMap::new();
                if !keys.is_empty() {
                    let filter = filter.clone().and(Filter::all().is_in(foreign, keys));
                    let found = self
                        .store
                        .find_rows(*collection, &filter, &FindOptions::default())
                        .await?;
                    for key in found.iter().filter_map(|r| r.get(foreign)) {
                        *counts.entry(key_string(key)).or_default() += 1;
                    }
                }
                for row in rows.iter_mut() {
                    let count = row
                        .get(local)
                        .and_then(|key| counts.get(&key_string(key)).copied())
                        .unwrap_or(0);
                    row.insert((*into).to_string(), Value::from(count));
                }
            }
            Derive::Exists {
                into,
                collection,
                foreign,
                local,
                filter,
                actor_field,
                actor,
            } => {
                let (foreign, local) = (*foreign, *local);
                let keys = local_keys(rows, local);
                let mut present: BTreeSet<String> = BTreeSet::new();
                match actor {
                    Some(actor) if !keys.is_empty() => {
                        let filter = filter
                            .clone()
                            .eq(*actor_field, actor.as_str())
                            .and(Filter::all().is_in(foreign, keys));
                        let found = self
                            .store
                            .find_rows(*collection, &filter, &FindOptions::default())
                            .await?;
                        present.extend(found.iter().filter_map(|r| r.get(foreign)).map(key_string));
                    }
                    _ => {}
                }
                for row in rows.iter_mut() {
                    let flag = row
                        .get(local)
                        .is_some_and(|key| present.contains(&key_string(key)));
                    row.insert((*into).to_string(), Value::Bool(flag));
                }
            }
            Derive::Sum { into, from, field } => {
                for row in rows.iter_mut() {
                    let total: i64 = objects(row, from)
                        .filter_map(|obj| obj.get(*field).and_then(Value::as_i64))
                        .sum();
                    row.insert((*into).to_string(), Value::from(total));
                }
            }
            Derive::Size { into, from } => {
                for row in rows.iter_mut() {
                    let size = row.get(*from).and_then(Value::as_array).map_or(0, Vec::len);
                    row.insert((*into).to_string(), Value::from(size));
                }
            }
            Derive::First { into, from, field } => {
                for row in rows.iter_mut() {
                    let value = objects(row, from)
                        .next()
                        .and_then(|obj| obj.get(*field).cloned())
                        .unwrap_or(Value::Null);
                    row.insert((*into).to_string(), value);
                }
            }
            Derive::Copy { into, from } => {
                for row in rows.iter_mut() {
                    let value = row.get(*from).cloned().unwrap_or(Value::Null);
                    row.insert((*into).to_string(), value);
                }
            }
        }
        Ok(())
    }
}

/// Distinct non-null values of `field` across rows, flattening arrays.
fn local_keys(rows: &[Row], field: &str) -> Vec<Value> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    let mut push = |value: &Value| {
        if !value.is_null() && seen.insert(key_string(value)) {
            keys.push(value.clone());
        }
    };
    for row in rows {
        match row.get(field) {
            Some(Value::Array(items)) => items.iter().for_each(&mut push),
            Some(value) => push(value),
            None => {}
        }
    }
    keys
}

fn matching<'m>(matches: &'m [(Value, Row)], key: &'m Value) -> impl Iterator<Item = Value> + 'm {
    matches
        .iter()
        .filter(move |(k, _)| k == key)
        .map(|(_, row)| Value::Object(row.clone()))
}

fn key_string(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToString::to_string)
}

fn objects<'a>(row: &'a Row, field: &str) -> impl Iterator<Item = &'a Row> + 'a {
    row.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn project(row: Row, fields: &[&'static str]) -> Row {
    let mut row = row;
    fields
        .iter()
        .filter_map(|field| row.remove(*field).map(|value| ((*field).to_string(), value)))
        .collect()
}

fn window(rows: Vec<Row>, skip: u64, limit: Option<u64>) -> Vec<Row> {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    let take = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(take).collect()
}
