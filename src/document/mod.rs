//! Documents - typed records stored in collections of a document store.
//!
//! Every record the ledger persists (orders, units, registry entries,
//! warehouse records) is a `Document`: a serde-serializable struct with a
//! collection name and a string id.
//!
//! ## Example
//!
//! ```ignore
//! use serial_ledger::{Document, DocumentsExt, InMemoryDocumentStore};
//!
//! #[derive(Serialize, Deserialize, Clone, Document)]
//! #[document(collection = "clients")]
//! struct Client {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! let store = InMemoryDocumentStore::new();
//! store.documents::<Client>().upsert(&client)?;
//! let loaded = store.documents::<Client>().get("client-1")?;
//! ```

mod in_memory;
mod query;
mod repository;
mod store;
mod subscription;

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use thiserror::Error;

/// Trait for types that can be stored as documents.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The collection name for this document type (e.g., "orders", "units").
    const COLLECTION: &'static str;

    /// Returns the unique identifier of this document within its collection.
    fn id(&self) -> &str;
}

/// A versioned wrapper around document data for optimistic concurrency control.
///
/// Versions start at 1 on insert and increase by one on every write.
/// Version 0 stands for "absent" in preconditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Address of a single document: collection + id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef {
    collection: String,
    id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Reference to the document with `id` in `D`'s collection.
    pub fn of<D: Document>(id: &str) -> Self {
        Self::new(D::COLLECTION, id)
    }

    /// Reference to an existing document value.
    pub fn for_doc<D: Document>(doc: &D) -> Self {
        Self::new(D::COLLECTION, doc.id())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Storage key: "collection:id".
    pub(crate) fn key(&self) -> String {
        format!("{}:{}", self.collection, self.id)
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.id)
    }
}

/// Error type for document store and transaction operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict. `expected == 0` means the document was
    /// expected to be absent.
    #[error("concurrency conflict on {collection}:{id} (expected version {expected}, actual {actual})")]
    ConcurrencyConflict {
        collection: String,
        id: String,
        expected: u64,
        actual: u64,
    },
    /// Document not found.
    #[error("document not found: {collection}:{id}")]
    NotFound { collection: String, id: String },
    /// Serialization/deserialization error.
    #[error("document serialization error: {0}")]
    Serde(String),
    /// Storage-level error (poisoned locks, corrupted state).
    #[error("document storage error: {0}")]
    Storage(String),
    /// The backend could not be reached or timed out.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    /// A transaction was used in a way its contract forbids.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(&'static str),
}

impl StoreError {
    pub(crate) fn conflict(doc: &DocRef, expected: u64, actual: u64) -> Self {
        StoreError::ConcurrencyConflict {
            collection: doc.collection.clone(),
            id: doc.id.clone(),
            expected,
            actual,
        }
    }

    pub(crate) fn not_found(doc: &DocRef) -> Self {
        StoreError::NotFound {
            collection: doc.collection.clone(),
            id: doc.id.clone(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    /// Whether repeating the identical operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::Unavailable(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}

pub(crate) fn encode<D: Document>(doc: &D) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::to_value(doc)?)
}

pub(crate) fn decode<D: Document>(
    raw: Versioned<serde_json::Value>,
) -> Result<Versioned<D>, StoreError> {
    Ok(Versioned {
        data: serde_json::from_value(raw.data)?,
        version: raw.version,
    })
}

pub use in_memory::InMemoryDocumentStore;
pub use query::{Query, SortDirection};
pub use repository::{DocumentRepository, DocumentsExt};
pub use store::{DocumentStore, Precondition, Subscribe, WriteBatch, WriteOp, WriteResult};
pub use subscription::Subscription;
