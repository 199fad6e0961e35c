//! An in-process [`DocumentStore`], used by tests and when no remote is configured.
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::{Document, DocumentStore, Filter, StoreError, UpdateOutcome, merge_into, set_path};

/// Failure to inject into every operation until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    PermissionDenied,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RefCell<BTreeMap<String, BTreeMap<String, Document>>>,
    next_id: Cell<u64>,
    failure: Cell<Option<Failure>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following operation fail, or succeed again with `None`.
    pub fn set_failure(&self, failure: Option<Failure>) {
        self.failure.set(failure);
    }

    /// Direct access for out-of-band edits, as an administrator editing the database would do.
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .borrow()
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    pub fn put_document(&self, collection: &str, id: &str, document: Document) {
        self.collections
            .borrow_mut()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.failure.get() {
            None => Ok(()),
            Some(Failure::Unavailable) => {
                Err(StoreError::Unavailable("memory store is offline".to_string()))
            }
            Some(Failure::PermissionDenied) => Err(StoreError::PermissionDenied),
        }
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check()?;
        Ok(self.document(collection, id))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut collections = self.collections.borrow_mut();
        let documents = collections.entry(collection.to_string()).or_default();
        if merge {
            merge_into(documents.entry(id.to_string()).or_default(), fields);
        } else {
            documents.insert(id.to_string(), fields);
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
    ) -> Result<UpdateOutcome, StoreError> {
        self.check()?;
        let mut collections = self.collections.borrow_mut();
        let Some(document) = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
        else {
            return Ok(UpdateOutcome::Missing);
        };
        for (path, value) in fields {
            set_path(document, &path, value);
        }
        Ok(UpdateOutcome::Updated)
    }

    async fn add(&self, collection: &str, fields: Document) -> Result<String, StoreError> {
        self.check()?;
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let id = format!("doc-{id}");
        self.put_document(collection, &id, fields);
        Ok(id)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        self.check()?;
        Ok(self
            .collections
            .borrow()
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|(_, document)| filter.matches(document))
                    .map(|(id, document)| (id.clone(), document.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
