//! In-memory document table
//!
//! Documents are JSON objects grouped into named collections and
//! addressed by `collection:key`. All mutations for a given id are
//! serialized through the map's shard write lock, so concurrent
//! writers to the same document never interleave and readers never
//! observe a torn document. Operations on distinct ids proceed
//! concurrently.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Result, StorehouseError};

/// A single stored record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Composite id, `collection:key`
    pub id: String,
    pub collection: String,
    pub key: String,
    /// Schemaless JSON object payload
    pub value: Value,
    /// Principal that last wrote the document
    pub owner: String,
    /// Set at first creation, never updated
    pub created_at: DateTime<Utc>,
}

/// Compose a document id from collection and key.
///
/// Collection names may not contain `:` (enforced by [`DataStore::set`])
/// while keys may, so the id splits unambiguously on the first `:`.
pub fn document_id(collection: &str, key: &str) -> String {
    format!("{collection}:{key}")
}

/// Split a document id back into `(collection, key)`
pub fn parse_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(':')
}

/// Keyed document table with per-id mutation serialization
pub struct DataStore {
    documents: DashMap<String, Document>,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    /// Upsert a document. On create, `created_at` is stamped once; on
    /// update, `value` and `owner` are replaced whole and `created_at`
    /// is preserved. Returns the stored document.
    pub fn set(
        &self,
        collection: &str,
        key: &str,
        value: Map<String, Value>,
        owner: &str,
    ) -> Result<Document> {
        if collection.is_empty() || key.is_empty() {
            return Err(StorehouseError::InvalidDocument(
                "collection and key must be non-empty".into(),
            ));
        }
        if collection.contains(':') {
            return Err(StorehouseError::InvalidDocument(format!(
                "collection name may not contain ':': {collection}"
            )));
        }

        let id = document_id(collection, key);

        // The entry holds the shard write lock for the whole
        // read-modify-write, which is what serializes concurrent
        // mutations of the same id.
        let stored = match self.documents.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let doc = occupied.get_mut();
                doc.value = Value::Object(value);
                doc.owner = owner.to_string();
                doc.clone()
            }
            Entry::Vacant(vacant) => {
                let doc = Document {
                    id,
                    collection: collection.to_string(),
                    key: key.to_string(),
                    value: Value::Object(value),
                    owner: owner.to_string(),
                    created_at: Utc::now(),
                };
                vacant.insert(doc.clone());
                doc
            }
        };

        Ok(stored)
    }

    /// Fetch a document by id
    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents.get(id).map(|doc| doc.value().clone())
    }

    /// Remove a document by id. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        self.documents.remove(id).is_some()
    }

    /// Snapshot of every document in a collection, ordered by
    /// `(created_at, key)` so downstream stable sorts have a
    /// deterministic starting order.
    pub fn list(&self, collection: &str) -> Vec<Document> {
        let mut items: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| entry.collection == collection)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        items
    }

    /// Remove every document in a collection whose id is in `ids`,
    /// returning the documents actually removed.
    pub fn remove_many(&self, ids: &[String]) -> Vec<Document> {
        ids.iter()
            .filter_map(|id| self.documents.remove(id).map(|(_, doc)| doc))
            .collect()
    }

    /// Total number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
