use super::{Document, DocumentCursor, DocumentStore, Query};
use crate::PatientResult;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-process document store. Documents are kept in id order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Writes replace whole documents, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Document>> {
        self.documents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Document>> {
        self.documents.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, id: &str) -> PatientResult<Option<Document>> {
        Ok(self.read().get(id).cloned())
    }

    fn exists(&self, id: &str) -> PatientResult<bool> {
        Ok(self.read().contains_key(id))
    }

    fn upsert(&self, id: &str, document: Document) -> PatientResult<()> {
        self.write().insert(id.to_owned(), document);
        Ok(())
    }

    fn stream(&self, query: &Query) -> PatientResult<DocumentCursor<'_>> {
        let snapshot: Vec<(String, Document)> = self
            .read()
            .iter()
            .filter(|(_, doc)| query.matches(doc))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();
        Ok(Box::new(query.evaluate(snapshot).into_iter().map(Ok)))
    }

    fn count(&self, query: &Query) -> PatientResult<u64> {
        let n = self
            .read()
            .values()
            .filter(|doc| query.matches(doc))
            .count();
        Ok(n as u64)
    }
}
