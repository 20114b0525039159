//! Transactions - read-set + write-set committed as one `WriteBatch`.
//!
//! Every read records the version it observed (0 for absent). Writes are
//! staged locally and may only follow the reads. `commit` turns the recorded
//! versions into batch preconditions, so the store applies the writes only if
//! nothing the transaction read has changed in the meantime: first committer
//! wins, later committers get a `ConcurrencyConflict`.
//!
//! ## Example
//!
//! ```ignore
//! let unit_ids = run_transaction(&store, 5, |tx| {
//!     let claim = tx.read::<RegistryEntry>("sn-001")?;
//!     if claim.is_some() {
//!         return Err(MyError::Taken);
//!     }
//!     tx.create(&entry)?;
//!     tx.create(&unit)?;
//!     Ok(vec![unit.id.clone()])
//! })?;
//! ```

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::document::{
    decode, encode, DocRef, Document, DocumentStore, StoreError, Versioned, WriteBatch, WriteOp,
    WriteResult,
};

/// An open transaction over a document store.
pub struct Transaction<'s, S: ?Sized> {
    store: &'s S,
    reads: BTreeMap<DocRef, Option<Versioned<Value>>>,
    preconditions: BTreeMap<DocRef, u64>,
    writes: Vec<WriteOp>,
}

impl<'s, S: DocumentStore + ?Sized> Transaction<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            preconditions: BTreeMap::new(),
            writes: Vec::new(),
        }
    }

    /// Read a document and stamp its version into the read-set.
    pub fn read<D: Document>(&mut self, id: &str) -> Result<Option<Versioned<D>>, StoreError> {
        self.read_ref(DocRef::of::<D>(id))?.map(decode).transpose()
    }

    /// Read several documents of one collection, in the given order.
    pub fn read_many<D, I, K>(&mut self, ids: I) -> Result<Vec<Option<Versioned<D>>>, StoreError>
    where
        D: Document,
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        ids.into_iter()
            .map(|id| self.read::<D>(id.as_ref()))
            .collect()
    }

    /// Untyped read. Repeated reads of the same document return the first
    /// observation.
    pub fn read_ref(&mut self, doc: DocRef) -> Result<Option<Versioned<Value>>, StoreError> {
        if !self.writes.is_empty() {
            return Err(StoreError::InvalidTransaction("reads must precede writes"));
        }
        if let Some(cached) = self.reads.get(&doc) {
            return Ok(cached.clone());
        }

        let raw = self.store.read_raw(&doc)?;
        self.preconditions
            .insert(doc.clone(), raw.as_ref().map(|r| r.version).unwrap_or(0));
        self.reads.insert(doc, raw.clone());
        Ok(raw)
    }

    /// Stage the creation of a document; the commit fails if it exists.
    pub fn create<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let doc_ref = DocRef::for_doc(doc);
        self.ensure_unstaged(&doc_ref)?;
        match self.preconditions.get(&doc_ref) {
            Some(&actual) if actual != 0 => return Err(StoreError::conflict(&doc_ref, 0, actual)),
            _ => {
                self.preconditions.insert(doc_ref.clone(), 0);
            }
        }
        self.writes.push(WriteOp::Put {
            doc: doc_ref,
            data: encode(doc)?,
        });
        Ok(())
    }

    /// Stage a full replacement. If the document was read, the write is
    /// guarded by the version observed then.
    pub fn set<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let doc_ref = DocRef::for_doc(doc);
        self.ensure_unstaged(&doc_ref)?;
        self.writes.push(WriteOp::Put {
            doc: doc_ref,
            data: encode(doc)?,
        });
        Ok(())
    }

    /// Stage a delete.
    pub fn delete<D: Document>(&mut self, id: &str) -> Result<(), StoreError> {
        let doc_ref = DocRef::of::<D>(id);
        self.ensure_unstaged(&doc_ref)?;
        self.writes.push(WriteOp::Delete { doc: doc_ref });
        Ok(())
    }

    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Submit reads as preconditions and writes as one atomic batch.
    pub fn commit(self) -> Result<Vec<WriteResult>, StoreError> {
        if self.writes.is_empty() && self.preconditions.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = WriteBatch::new();
        for (doc, version) in self.preconditions {
            batch = batch.expect_version(doc, version);
        }
        for op in self.writes {
            batch = match op {
                WriteOp::Put { doc, data } => batch.put(doc, data),
                WriteOp::Delete { doc } => batch.delete(doc),
            };
        }
        self.store.commit_batch(batch)
    }

    fn ensure_unstaged(&self, doc: &DocRef) -> Result<(), StoreError> {
        if self.writes.iter().any(|op| op.doc() == doc) {
            return Err(StoreError::InvalidTransaction(
                "document written twice in one transaction",
            ));
        }
        Ok(())
    }
}

/// Run `body` in a transaction and commit it.
///
/// An `Err` from `body` aborts: nothing staged is written and the error is
/// returned as is. A commit conflict re-runs `body` against fresh reads, up to
/// `max_attempts` runs in total (at least one); after the last attempt the
/// conflict is returned. Other store errors are returned immediately.
pub fn run_transaction<S, T, E, F>(store: &S, max_attempts: u32, mut body: F) -> Result<T, E>
where
    S: DocumentStore + ?Sized,
    E: From<StoreError>,
    F: FnMut(&mut Transaction<'_, S>) -> Result<T, E>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let mut tx = Transaction::new(store);
        let value = body(&mut tx)?;
        match tx.commit() {
            Ok(_) => return Ok(value),
            Err(err) if err.is_conflict() && attempt < attempts => {
                debug!(attempt, max_attempts = attempts, error = %err, "transaction conflict, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
