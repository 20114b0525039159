//! DocumentStore - Abstract CRUD, query and atomic batch storage for documents.

use serde_json::Value;

use super::{DocRef, Document, Query, StoreError, Subscription, Versioned};

/// Expected version of a document at commit time. `0` means "must be absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub doc: DocRef,
    pub expected_version: u64,
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { doc: DocRef, data: Value },
    Delete { doc: DocRef },
}

impl WriteOp {
    pub fn doc(&self) -> &DocRef {
        match self {
            WriteOp::Put { doc, .. } | WriteOp::Delete { doc } => doc,
        }
    }
}

/// Outcome of one write inside a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// Version before the write, 0 if the document was absent.
    pub previous: u64,
    /// Version after the write, 0 if the document was deleted.
    pub current: u64,
}

/// Preconditions plus writes, applied all-or-nothing.
///
/// ## Example
///
/// ```ignore
/// let batch = WriteBatch::new()
///     .expect_absent(DocRef::of::<RegistryEntry>("sn-001"))
///     .put_document(&entry)?
///     .put_document(&unit)?;
/// store.commit_batch(batch)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    preconditions: Vec<Precondition>,
    writes: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `doc` to be at `version` when the batch commits.
    pub fn expect_version(mut self, doc: DocRef, version: u64) -> Self {
        self.preconditions.push(Precondition {
            doc,
            expected_version: version,
        });
        self
    }

    /// Require `doc` to not exist when the batch commits.
    pub fn expect_absent(self, doc: DocRef) -> Self {
        self.expect_version(doc, 0)
    }

    pub fn put(mut self, doc: DocRef, data: Value) -> Self {
        self.writes.push(WriteOp::Put { doc, data });
        self
    }

    pub fn put_document<D: Document>(self, doc: &D) -> Result<Self, StoreError> {
        let data = super::encode(doc)?;
        Ok(self.put(DocRef::for_doc(doc), data))
    }

    pub fn delete(mut self, doc: DocRef) -> Self {
        self.writes.push(WriteOp::Delete { doc });
        self
    }

    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    pub fn writes(&self) -> &[WriteOp] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<Precondition>, Vec<WriteOp>) {
        (self.preconditions, self.writes)
    }
}

/// Abstract document storage.
///
/// Single-document operations are atomic on their own. `commit_batch` is the
/// multi-document primitive transactions are built on: every precondition is
/// checked and every write applied under one critical section, or nothing is.
pub trait DocumentStore: Send + Sync {
    /// Get a document by id. Returns None if not found.
    fn get<D: Document>(&self, id: &str) -> Result<Option<Versioned<D>>, StoreError>;

    /// Insert a new document. Fails with a conflict if it already exists.
    fn insert<D: Document>(&self, doc: &D) -> Result<Versioned<D>, StoreError>;

    /// Insert or replace a document, no version check.
    fn upsert<D: Document>(&self, doc: &D) -> Result<Versioned<D>, StoreError>;

    /// Replace an existing document with optimistic concurrency control.
    fn update<D: Document>(&self, doc: &D, expected_version: u64)
        -> Result<Versioned<D>, StoreError>;

    /// Delete a document by id. Returns true if it existed.
    fn delete<D: Document>(&self, id: &str) -> Result<bool, StoreError>;

    /// Find documents matching a predicate, ordered by id.
    fn find<D: Document>(
        &self,
        predicate: &dyn Fn(&D) -> bool,
    ) -> Result<Vec<Versioned<D>>, StoreError>;

    /// Run a field query against `D`'s collection.
    fn query<D: Document>(&self, query: &Query) -> Result<Vec<Versioned<D>>, StoreError>;

    /// Read the raw JSON of a document and its version.
    fn read_raw(&self, doc: &DocRef) -> Result<Option<Versioned<Value>>, StoreError>;

    /// Atomically check every precondition and apply every write.
    fn commit_batch(&self, batch: WriteBatch) -> Result<Vec<WriteResult>, StoreError>;
}

/// Live queries.
pub trait Subscribe: Send + Sync {
    /// Subscribe to `query` over `D`'s collection. The handle receives the
    /// current result set immediately and a fresh one after every commit that
    /// touches the collection.
    fn subscribe<D: Document>(&self, query: Query) -> Result<Subscription<D>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_collects_preconditions_and_writes() {
        let batch = WriteBatch::new()
            .expect_absent(DocRef::new("serial_registry", "sn-1"))
            .expect_version(DocRef::new("orders", "o-1"), 3)
            .put(DocRef::new("serial_registry", "sn-1"), json!({"id": "sn-1"}))
            .delete(DocRef::new("units", "u-1"));

        assert_eq!(batch.preconditions().len(), 2);
        assert_eq!(batch.preconditions()[0].expected_version, 0);
        assert_eq!(batch.preconditions()[1].expected_version, 3);
        assert_eq!(batch.writes().len(), 2);
        assert_eq!(batch.writes()[1].doc(), &DocRef::new("units", "u-1"));
        assert!(!batch.is_empty());
    }

    #[test]
    fn empty_batch() {
        let batch = WriteBatch::new().expect_absent(DocRef::new("orders", "o-1"));
        assert!(batch.is_empty());
    }
}
