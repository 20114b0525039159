//! DocumentRepository - one collection of a store, seen through its document type.

use std::marker::PhantomData;

use super::{Document, DocumentStore, Query, StoreError, Subscribe, Subscription, Versioned};

/// Typed view over the `D` collection of a store.
///
/// This is the plain get/set/subscribe surface the CRUD screens (clients,
/// materials, distributors) sit on.
pub struct DocumentRepository<'a, S, D> {
    store: &'a S,
    _marker: PhantomData<D>,
}

impl<'a, S: DocumentStore, D: Document> DocumentRepository<'a, S, D> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<Versioned<D>>, StoreError> {
        self.store.get(id)
    }

    /// Like `get`, but a missing document is `StoreError::NotFound`.
    pub fn require(&self, id: &str) -> Result<Versioned<D>, StoreError> {
        self.store.get(id)?.ok_or_else(|| StoreError::NotFound {
            collection: D::COLLECTION.to_string(),
            id: id.to_string(),
        })
    }

    pub fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get::<D>(id)?.is_some())
    }

    /// Fails with a conflict if the id is taken.
    pub fn insert(&self, doc: &D) -> Result<Versioned<D>, StoreError> {
        self.store.insert(doc)
    }

    /// Write without a version check.
    pub fn upsert(&self, doc: &D) -> Result<Versioned<D>, StoreError> {
        self.store.upsert(doc)
    }

    /// Replace the document if it is still at `expected_version`.
    pub fn update(&self, doc: &D, expected_version: u64) -> Result<Versioned<D>, StoreError> {
        self.store.update(doc, expected_version)
    }

    /// `true` if something was deleted.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete::<D>(id)
    }

    pub fn find(&self, predicate: &dyn Fn(&D) -> bool) -> Result<Vec<Versioned<D>>, StoreError> {
        self.store.find(predicate)
    }

    /// First match in storage order.
    pub fn find_one(
        &self,
        predicate: &dyn Fn(&D) -> bool,
    ) -> Result<Option<Versioned<D>>, StoreError> {
        Ok(self.store.find(predicate)?.into_iter().next())
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Versioned<D>>, StoreError> {
        self.store.query(query)
    }

    /// First result of `query`.
    pub fn first(&self, query: Query) -> Result<Option<Versioned<D>>, StoreError> {
        Ok(self.store.query(&query.limit(1))?.into_iter().next())
    }
}

impl<'a, S: DocumentStore + Subscribe, D: Document> DocumentRepository<'a, S, D> {
    /// Live view over `query`.
    pub fn subscribe(&self, query: Query) -> Result<Subscription<D>, StoreError> {
        self.store.subscribe(query)
    }
}

/// `store.documents::<D>()` on every store.
pub trait DocumentsExt: DocumentStore + Sized {
    fn documents<D: Document>(&self) -> DocumentRepository<'_, Self, D> {
        DocumentRepository::new(self)
    }
}

impl<S: DocumentStore> DocumentsExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{InMemoryDocumentStore, SortDirection};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Material {
        id: String,
        name: String,
        stock: u32,
    }

    impl Document for Material {
        const COLLECTION: &'static str = "materials";
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn material(id: &str, name: &str, stock: u32) -> Material {
        Material {
            id: id.into(),
            name: name.into(),
            stock,
        }
    }

    #[test]
    fn crud_through_typed_repository() {
        let store = InMemoryDocumentStore::new();
        let materials = store.documents::<Material>();

        materials.insert(&material("m-1", "Drill", 3)).unwrap();
        assert!(materials.exists("m-1").unwrap());

        let loaded = materials.require("m-1").unwrap();
        materials
            .update(&material("m-1", "Drill", 4), loaded.version)
            .unwrap();
        assert_eq!(materials.get("m-1").unwrap().unwrap().data.stock, 4);

        assert!(materials.delete("m-1").unwrap());
        assert!(matches!(
            materials.require("m-1").unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn find_one_and_first() {
        let store = InMemoryDocumentStore::new();
        let materials = store.documents::<Material>();
        materials.upsert(&material("m-1", "Drill", 3)).unwrap();
        materials.upsert(&material("m-2", "Saw", 9)).unwrap();

        let found = materials.find_one(&|m| m.stock > 5).unwrap().unwrap();
        assert_eq!(found.data.name, "Saw");

        let first = materials
            .first(Query::all().order_by("stock", SortDirection::Ascending))
            .unwrap()
            .unwrap();
        assert_eq!(first.data.id, "m-1");
    }
}
