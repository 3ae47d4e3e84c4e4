//! In-memory document store.
//!
//! Used for offline/local operation and tests. Batches are applied under a
//! single write lock, so readers never observe half of a batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::debug;

use placemark_core::{Document, DocumentQuery, DocumentStore, Error, Result, WriteBatch, WriteOp};

use crate::json::compare_values;

type Collection = BTreeMap<String, JsonValue>;

/// Document store kept in process memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    fail_commits: AtomicBool,
    commit_count: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail without applying anything.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successfully applied batches.
    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Insert a raw document outside any batch (fixtures).
    pub async fn insert_raw(&self, collection: &str, id: &str, data: JsonValue) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::Database("memory store: commit rejected".to_string()));
        }

        let mut collections = self.collections.write().await;
        let op_count = batch.ops().len();
        for op in batch.into_ops() {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        self.commit_count.fetch_add(1, Ordering::SeqCst);
        debug!(op_count, "memory_store: batch committed");
        Ok(())
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<Document> = docs
            .iter()
            .filter(|(_, data)| {
                query
                    .filters
                    .iter()
                    .all(|(field, expected)| data.get(field) == Some(expected))
            })
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some(field) = &query.order_by_desc {
            matches.sort_by(|a, b| compare_values(b.data.get(field), a.data.get(field)));
        }
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn batch_applies_all_writes() {
        let store = MemoryDocumentStore::new();
        let batch = WriteBatch::new()
            .set("reviews", "r1", json!({"placeId": "p1"}))
            .set("userReviews/u1/items", "r1", json!({"placeId": "p1"}));
        store.commit(batch).await.unwrap();

        assert!(store.get("reviews", "r1").await.unwrap().is_some());
        assert!(store.get("userReviews/u1/items", "r1").await.unwrap().is_some());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = MemoryDocumentStore::new();
        store.set_fail_commits(true);
        let batch = WriteBatch::new()
            .set("reviews", "r1", json!({}))
            .set("userReviews/u1/items", "r1", json!({}));

        assert!(store.commit(batch).await.is_err());
        assert_eq!(store.len("reviews").await, 0);
        assert_eq!(store.len("userReviews/u1/items").await, 0);
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryDocumentStore::new();
        store
            .insert_raw("reviews", "a", json!({"placeId": "p1", "createdAt": "2026-01-01"}))
            .await;
        store
            .insert_raw("reviews", "b", json!({"placeId": "p1", "createdAt": "2026-03-01"}))
            .await;
        store
            .insert_raw("reviews", "c", json!({"placeId": "p2", "createdAt": "2026-02-01"}))
            .await;
        store
            .insert_raw("reviews", "d", json!({"placeId": "p1", "createdAt": "2026-02-01"}))
            .await;

        let docs = store
            .query(
                DocumentQuery::collection("reviews")
                    .where_eq("placeId", json!("p1"))
                    .order_by_desc("createdAt")
                    .limit(2),
            )
            .await
            .unwrap();

        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[tokio::test]
    async fn delete_of_missing_document_is_noop() {
        let store = MemoryDocumentStore::new();
        store
            .commit(WriteBatch::new().delete("reviews", "missing"))
            .await
            .unwrap();
        assert!(store.get("reviews", "missing").await.unwrap().is_none());
    }
}
