//! In-process collection backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use sea_orm::prelude::DateTimeWithTimeZone;
use tokio::sync::RwLock;
use tubeline_common::{AppError, AppResult};

use super::query::{Filter, FindOptions, Patch, Row, sort_rows};
use super::{Collection, Document, from_row, to_row};

/// Wall clock that never returns the same instant twice.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    /// Current time, strictly later than any earlier result.
    pub fn now(&self) -> DateTimeWithTimeZone {
        let wall = Utc::now().timestamp_micros();
        let next = |last: i64| wall.max(last + 1);
        let previous = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
            .unwrap_or_else(|last| last);
        DateTime::from_timestamp_micros(next(previous))
            .unwrap_or_else(Utc::now)
            .fixed_offset()
    }
}

type Undo = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

tokio::task_local! {
    static JOURNAL: Arc<Journal>;
}

/// Undo log of one in-memory transaction.
///
/// Every write made by the task running the transaction records how to put
/// the touched document back. Rolling back replays the log newest first.
/// Writes from other tasks are neither recorded nor isolated from the
/// transaction.
#[derive(Default)]
pub(super) struct Journal {
    undo: Mutex<Vec<Undo>>,
}

impl Journal {
    fn push(&self, undo: Undo) {
        self.undo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(undo);
    }

    /// Run `work` with every memory write it makes recorded in `self`.
    pub(super) async fn record<T>(self: &Arc<Self>, work: impl Future<Output = T>) -> T {
        JOURNAL.scope(self.clone(), work).await
    }

    /// Undo every recorded write.
    pub(super) async fn rollback(&self) {
        let steps = std::mem::take(&mut *self.undo.lock().unwrap_or_else(PoisonError::into_inner));
        tracing::debug!(steps = steps.len(), "Rolling back in-memory transaction");
        for step in steps.into_iter().rev() {
            step().await;
        }
    }
}

/// Whether the current task runs inside an in-memory transaction.
pub(super) fn in_transaction() -> bool {
    JOURNAL.try_with(|_| ()).is_ok()
}

/// Collection held in a `BTreeMap` behind an async lock.
///
/// Every mutation runs under the write lock, so uniqueness checks and
/// read-modify-write patches are atomic.
pub struct MemoryCollection<D> {
    docs: Arc<RwLock<BTreeMap<String, D>>>,
    clock: Arc<MonotonicClock>,
}

impl<D: Document> MemoryCollection<D> {
    /// Create an empty collection stamping times from `clock`.
    #[must_use]
    pub fn new(clock: Arc<MonotonicClock>) -> Self {
        Self {
            docs: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
        }
    }

    /// Note in the running transaction, if any, that `id` held `previous`.
    fn journal(&self, id: &str, previous: Option<D>) {
        if !in_transaction() {
            return;
        }
        let docs = self.docs.clone();
        let id = id.to_string();
        let undo: Undo = Box::new(move || {
            async move {
                let mut docs = docs.write().await;
                match previous {
                    Some(doc) => docs.insert(id, doc),
                    None => docs.remove(&id),
                };
            }
            .boxed()
        });
        // Outside a transaction there is nothing to record.
        let _ = JOURNAL.try_with(|journal| journal.push(undo));
    }

    fn check_unique(docs: &BTreeMap<String, D>, candidate: &D) -> AppResult<()> {
        let keys = candidate.unique_keys();
        if keys.is_empty() {
            return Ok(());
        }
        let clash = docs
            .values()
            .filter(|other| other.id() != candidate.id())
            .flat_map(Document::unique_keys)
            .find(|key| keys.contains(key));
        match clash {
            Some(key) => {
                tracing::debug!(constraint = key.name(), "Unique constraint violation");
                Err(AppError::Conflict("Entity already exists".to_string()))
            }
            None => Ok(()),
        }
    }

    fn patched(&self, doc: &D, patch: &Patch) -> AppResult<D> {
        let mut row = to_row(doc)?;
        patch.apply(&mut row)?;
        row.insert(
            "updated_at".to_string(),
            serde_json::to_value(self.clock.now())?,
        );
        from_row(row)
    }

    fn matching(docs: &BTreeMap<String, D>, filter: &Filter) -> AppResult<Vec<(String, Row)>> {
        let mut out = Vec::new();
        for (id, doc) in docs {
            let row = to_row(doc)?;
            if filter.matches(&row) {
                out.push((id.clone(), row));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<D: Document> Collection<D> for MemoryCollection<D> {
    async fn get(&self, id: &str) -> AppResult<Option<D>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn create(&self, mut doc: D) -> AppResult<D> {
        let mut docs = self.docs.write().await;
        if docs.contains_key(doc.id()) {
            return Err(AppError::Conflict("Entity already exists".to_string()));
        }
        doc.stamp_created(self.clock.now());
        Self::check_unique(&docs, &doc)?;
        docs.insert(doc.id().to_string(), doc.clone());
        self.journal(doc.id(), None);
        Ok(doc)
    }

    async fn update(&self, id: &str, patch: Patch) -> AppResult<Option<D>> {
        let mut docs = self.docs.write().await;
        let Some(current) = docs.get(id) else {
            return Ok(None);
        };
        let next = self.patched(current, &patch)?;
        Self::check_unique(&docs, &next)?;
        if let Some(previous) = docs.insert(id.to_string(), next.clone()) {
            self.journal(id, Some(previous));
        }
        Ok(Some(next))
    }

    async fn update_many(&self, filter: &Filter, patch: Patch) -> AppResult<u64> {
        let mut docs = self.docs.write().await;
        let ids: Vec<String> = Self::matching(&docs, filter)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(current) = docs.get(id) {
                let next = self.patched(current, &patch)?;
                Self::check_unique(&docs, &next)?;
                updated.push(next);
            }
        }
        let count = updated.len() as u64;
        for doc in updated {
            let id = doc.id().to_string();
            if let Some(previous) = docs.insert(id.clone(), doc) {
                self.journal(&id, Some(previous));
            }
        }
        Ok(count)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let Some(removed) = self.docs.write().await.remove(id) else {
            return Ok(false);
        };
        self.journal(id, Some(removed));
        Ok(true)
    }

    async fn delete_one(&self, filter: &Filter) -> AppResult<Option<D>> {
        let mut docs = self.docs.write().await;
        let first = Self::matching(&docs, filter)?.into_iter().next();
        let removed = first.and_then(|(id, _)| docs.remove(&id));
        if let Some(doc) = &removed {
            self.journal(doc.id(), Some(doc.clone()));
        }
        Ok(removed)
    }

    async fn delete_many(&self, filter: &Filter) -> AppResult<u64> {
        let mut docs = self.docs.write().await;
        let matching = Self::matching(&docs, filter)?;
        for (id, _) in &matching {
            if let Some(previous) = docs.remove(id) {
                self.journal(id, Some(previous));
            }
        }
        Ok(matching.len() as u64)
    }

    async fn count(&self, filter: &Filter) -> AppResult<u64> {
        let docs = self.docs.read().await;
        Ok(Self::matching(&docs, filter)?.len() as u64)
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> AppResult<Vec<D>> {
        let mut rows: Vec<Row> = {
            let docs = self.docs.read().await;
            Self::matching(&docs, filter)?
                .into_iter()
                .map(|(_, row)| row)
                .collect()
        };
        sort_rows(&mut rows, &options.sort);

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let take = options
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        rows.into_iter().skip(skip).take(take).map(from_row).collect()
    }
}
