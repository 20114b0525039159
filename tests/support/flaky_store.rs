//! Document store wrapper that fails on demand.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::Value;
use serial_ledger::{
    DocRef, Document, DocumentStore, InMemoryDocumentStore, Order, Query, StoreError, Versioned,
    WriteBatch, WriteResult,
};

#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: InMemoryDocumentStore,
    unavailable_commits: Arc<AtomicU32>,
    conflicting_commits: Arc<AtomicU32>,
    fail_order_updates: Arc<AtomicBool>,
    commits_seen: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    /// The next `n` batch commits time out.
    pub fn fail_next_commits(&self, n: u32) {
        self.unavailable_commits.store(n, Ordering::SeqCst);
    }

    /// The next `n` batch commits lose a race.
    pub fn conflict_next_commits(&self, n: u32) {
        self.conflicting_commits.store(n, Ordering::SeqCst);
    }

    /// Single-document updates of orders fail until turned off.
    pub fn fail_order_updates(&self, fail: bool) {
        self.fail_order_updates.store(fail, Ordering::SeqCst);
    }

    pub fn commits_seen(&self) -> u32 {
        self.commits_seen.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DocumentStore for FlakyStore {
    fn get<D: Document>(&self, id: &str) -> Result<Option<Versioned<D>>, StoreError> {
        self.inner.get(id)
    }

    fn insert<D: Document>(&self, doc: &D) -> Result<Versioned<D>, StoreError> {
        self.inner.insert(doc)
    }

    fn upsert<D: Document>(&self, doc: &D) -> Result<Versioned<D>, StoreError> {
        self.inner.upsert(doc)
    }

    fn update<D: Document>(
        &self,
        doc: &D,
        expected_version: u64,
    ) -> Result<Versioned<D>, StoreError> {
        if D::COLLECTION == Order::COLLECTION && self.fail_order_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order update timed out".into()));
        }
        self.inner.update(doc, expected_version)
    }

    fn delete<D: Document>(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete::<D>(id)
    }

    fn find<D: Document>(
        &self,
        predicate: &dyn Fn(&D) -> bool,
    ) -> Result<Vec<Versioned<D>>, StoreError> {
        self.inner.find(predicate)
    }

    fn query<D: Document>(&self, query: &Query) -> Result<Vec<Versioned<D>>, StoreError> {
        self.inner.query(query)
    }

    fn read_raw(&self, doc: &DocRef) -> Result<Option<Versioned<Value>>, StoreError> {
        self.inner.read_raw(doc)
    }

    fn commit_batch(&self, batch: WriteBatch) -> Result<Vec<WriteResult>, StoreError> {
        self.commits_seen.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.unavailable_commits) {
            return Err(StoreError::Unavailable("commit timed out".into()));
        }
        if Self::take(&self.conflicting_commits) {
            let doc = batch
                .preconditions()
                .first()
                .map(|p| p.doc.clone())
                .unwrap_or_else(|| DocRef::new("unknown", "unknown"));
            return Err(StoreError::ConcurrencyConflict {
                collection: doc.collection().to_string(),
                id: doc.id().to_string(),
                expected: 0,
                actual: 1,
            });
        }
        self.inner.commit_batch(batch)
    }
}
