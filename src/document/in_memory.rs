//! InMemoryDocumentStore - HashMap-backed document store for testing and single-process use.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde_json::Value;
use tracing::{trace, warn};

use super::{
    decode, encode, DocRef, Document, DocumentStore, Query, StoreError, Subscribe, Subscription,
    Versioned, WriteBatch, WriteOp, WriteResult,
};

/// Internal stored representation of a document.
struct StoredDocument {
    data: Value,
    version: u64,
}

/// A live query. The channel holds at most one snapshot; `stale` shares it so
/// an unread snapshot can be replaced by a newer one.
struct Subscriber {
    id: u64,
    collection: String,
    query: Query,
    sender: Sender<Vec<Versioned<Value>>>,
    stale: Receiver<Vec<Versioned<Value>>>,
}

impl Subscriber {
    fn publish(&self, snapshot: Vec<Versioned<Value>>) -> bool {
        match self.sender.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(snapshot)) => {
                let _ = self.stale.try_recv();
                self.sender.try_send(snapshot).is_ok()
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[derive(Default)]
struct Storage {
    docs: HashMap<String, StoredDocument>,
    /// Last version of each deleted key. A re-created document continues from
    /// it, so a version read before the delete never matches again.
    tombstones: HashMap<String, u64>,
}
type Subscribers = Mutex<Vec<Subscriber>>;

/// In-memory document store backed by a HashMap.
///
/// Storage key is `"collection:id"`. Clone-friendly via Arc: clones share
/// documents and subscribers. Batches commit under the single write lock, so
/// every precondition check and write of a batch is one critical section.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    storage: Arc<RwLock<Storage>>,
    subscribers: Arc<Subscribers>,
    next_subscriber: Arc<AtomicU64>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Create a new empty document store.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(Storage::default())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let storage = self.read_storage()?;
        let prefix = format!("{}:", collection);
        Ok(storage
            .docs
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .count())
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> Result<usize, StoreError> {
        self.subscribers
            .lock()
            .map(|subs| subs.len())
            .map_err(|_| StoreError::Storage("subscriber list poisoned".into()))
    }

    fn read_storage(&self) -> Result<RwLockReadGuard<'_, Storage>, StoreError> {
        self.storage
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, Storage>, StoreError> {
        self.storage
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))
    }

    /// All documents of a collection ordered by id.
    fn collection_docs(storage: &Storage, collection: &str) -> Vec<Versioned<Value>> {
        let prefix = format!("{}:", collection);
        let mut entries: Vec<(&String, &StoredDocument)> = storage
            .docs
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(_, stored)| Versioned {
                data: stored.data.clone(),
                version: stored.version,
            })
            .collect()
    }

    fn apply(&self, batch: WriteBatch) -> Result<Vec<WriteResult>, StoreError> {
        let (preconditions, writes) = batch.into_parts();
        let touched: BTreeSet<String> = writes
            .iter()
            .map(|op| op.doc().collection().to_string())
            .collect();

        let results = {
            let mut storage = self.write_storage()?;

            for precondition in &preconditions {
                let actual = storage
                    .docs
                    .get(&precondition.doc.key())
                    .map(|stored| stored.version)
                    .unwrap_or(0);
                if actual != precondition.expected_version {
                    trace!(doc = %precondition.doc, expected = precondition.expected_version, actual, "precondition failed");
                    return Err(StoreError::conflict(
                        &precondition.doc,
                        precondition.expected_version,
                        actual,
                    ));
                }
            }

            let mut results = Vec::with_capacity(writes.len());
            for op in writes {
                match op {
                    WriteOp::Put { doc, data } => {
                        let key = doc.key();
                        let previous = storage.docs.get(&key).map(|stored| stored.version);
                        let base = match previous {
                            Some(version) => version,
                            None => storage.tombstones.remove(&key).unwrap_or(0),
                        };
                        let current = base + 1;
                        storage.docs.insert(key, StoredDocument { data, version: current });
                        results.push(WriteResult {
                            previous: previous.unwrap_or(0),
                            current,
                        });
                    }
                    WriteOp::Delete { doc } => {
                        let key = doc.key();
                        let removed = storage.docs.remove(&key);
                        let previous = match removed {
                            Some(stored) => {
                                storage.tombstones.insert(key, stored.version);
                                stored.version
                            }
                            None => 0,
                        };
                        results.push(WriteResult {
                            previous,
                            current: 0,
                        });
                    }
                }
            }
            results
        };

        if !touched.is_empty() {
            self.notify(&touched);
        }
        Ok(results)
    }

    /// Push fresh result sets to every subscriber of a touched collection and
    /// drop subscribers whose receiver is gone.
    fn notify(&self, touched: &BTreeSet<String>) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(subscribers) => subscribers,
            Err(_) => {
                warn!("subscriber list poisoned, skipping notification");
                return;
            }
        };
        if subscribers.is_empty() {
            return;
        }
        let storage = match self.storage.read() {
            Ok(storage) => storage,
            Err(_) => {
                warn!("storage lock poisoned, skipping notification");
                return;
            }
        };

        subscribers.retain(|subscriber| {
            if !touched.contains(&subscriber.collection) {
                return true;
            }
            let snapshot = subscriber
                .query
                .run(Self::collection_docs(&storage, &subscriber.collection));
            subscriber.publish(snapshot)
        });
    }
}

fn unsubscribe(subscribers: &Weak<Subscribers>, id: u64) {
    if let Some(subscribers) = subscribers.upgrade() {
        if let Ok(mut subscribers) = subscribers.lock() {
            subscribers.retain(|subscriber| subscriber.id != id);
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get<D: Document>(&self, id: &str) -> Result<Option<Versioned<D>>, StoreError> {
        self.read_raw(&DocRef::of::<D>(id))?
            .map(decode)
            .transpose()
    }

    fn insert<D: Document>(&self, doc: &D) -> Result<Versioned<D>, StoreError> {
        let doc_ref = DocRef::for_doc(doc);
        let batch = WriteBatch::new()
            .expect_absent(doc_ref.clone())
            .put(doc_ref, encode(doc)?);
        let results = self.apply(batch)?;

        Ok(Versioned {
            data: doc.clone(),
            version: results.first().map(|r| r.current).unwrap_or(1),
        })
    }

    fn upsert<D: Document>(&self, doc: &D) -> Result<Versioned<D>, StoreError> {
        let batch = WriteBatch::new().put_document(doc)?;
        let results = self.apply(batch)?;

        Ok(Versioned {
            data: doc.clone(),
            version: results.first().map(|r| r.current).unwrap_or(1),
        })
    }

    fn update<D: Document>(
        &self,
        doc: &D,
        expected_version: u64,
    ) -> Result<Versioned<D>, StoreError> {
        let doc_ref = DocRef::for_doc(doc);
        let batch = WriteBatch::new()
            .expect_version(doc_ref.clone(), expected_version)
            .put(doc_ref.clone(), encode(doc)?);

        let results = self.apply(batch).map_err(|err| match err {
            StoreError::ConcurrencyConflict { actual: 0, .. } if expected_version > 0 => {
                StoreError::not_found(&doc_ref)
            }
            other => other,
        })?;

        Ok(Versioned {
            data: doc.clone(),
            version: results
                .first()
                .map(|r| r.current)
                .unwrap_or(expected_version + 1),
        })
    }

    fn delete<D: Document>(&self, id: &str) -> Result<bool, StoreError> {
        let results = self.apply(WriteBatch::new().delete(DocRef::of::<D>(id)))?;
        Ok(results.first().map(|r| r.previous > 0).unwrap_or(false))
    }

    fn find<D: Document>(
        &self,
        predicate: &dyn Fn(&D) -> bool,
    ) -> Result<Vec<Versioned<D>>, StoreError> {
        let storage = self.read_storage()?;
        let mut results = Vec::new();

        for raw in Self::collection_docs(&storage, D::COLLECTION) {
            if let Ok(doc) = decode::<D>(raw) {
                if predicate(&doc.data) {
                    results.push(doc);
                }
            }
        }

        Ok(results)
    }

    fn query<D: Document>(&self, query: &Query) -> Result<Vec<Versioned<D>>, StoreError> {
        let docs = {
            let storage = self.read_storage()?;
            Self::collection_docs(&storage, D::COLLECTION)
        };
        query.run(docs).into_iter().map(decode).collect()
    }

    fn read_raw(&self, doc: &DocRef) -> Result<Option<Versioned<Value>>, StoreError> {
        let storage = self.read_storage()?;
        Ok(storage.docs.get(&doc.key()).map(|stored| Versioned {
            data: stored.data.clone(),
            version: stored.version,
        }))
    }

    fn commit_batch(&self, batch: WriteBatch) -> Result<Vec<WriteResult>, StoreError> {
        self.apply(batch)
    }
}

impl Subscribe for InMemoryDocumentStore {
    fn subscribe<D: Document>(&self, query: Query) -> Result<Subscription<D>, StoreError> {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = bounded(1);

        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| StoreError::Storage("subscriber list poisoned".into()))?;
        let initial = {
            let storage = self.read_storage()?;
            query.run(Self::collection_docs(&storage, D::COLLECTION))
        };
        let subscriber = Subscriber {
            id,
            collection: D::COLLECTION.to_string(),
            query,
            sender,
            stale: receiver.clone(),
        };
        subscriber.publish(initial);
        subscribers.push(subscriber);
        drop(subscribers);

        let weak = Arc::downgrade(&self.subscribers);
        Ok(Subscription::new(id, receiver, move || unsubscribe(&weak, id)))
    }
}
