// src/store/memory.rs
//! Process-local document store.
//!
//! Used for `STORE_BACKEND=memory` and throughout the tests. Queries return
//! documents in id order, which is this backend's "store default" ordering.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Document, DocumentStore, DocumentStream, Fields, StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document under a caller-chosen id.
    pub fn insert(&self, collection: &str, id: &str, fields: Fields) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Snapshot of a single document.
    pub fn snapshot(&self, collection: &str, id: &str) -> Option<Fields> {
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// Snapshot of a whole collection, ordered by id.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn query_in(
        &self,
        collection: &str,
        field: &str,
        values: &[&str],
        limit: usize,
    ) -> StoreResult<DocumentStream> {
        let docs: Vec<StoreResult<Document>> = self
            .collections
            .read()
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, f)| {
                        f.get(field)
                            .and_then(|v| v.as_str())
                            .is_some_and(|s| values.contains(&s))
                    })
                    .take(limit)
                    .map(|(id, f)| {
                        Ok(Document {
                            id: id.clone(),
                            fields: f.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(docs)))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let mut guard = self.collections.write();
        let doc = guard
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        doc.extend(fields);
        Ok(())
    }

    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.insert(collection, &id, fields);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Fields>> {
        Ok(self.snapshot(collection, id))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldValue;
    use futures::StreamExt;

    fn doc(status: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("status".into(), FieldValue::from(status));
        f.insert("link".into(), FieldValue::from("https://example.com"));
        f
    }

    #[tokio::test]
    async fn query_filters_by_status_and_respects_limit() {
        let store = InMemoryStore::new();
        store.insert("c", "a", doc("pending"));
        store.insert("c", "b", doc("scraper_ok"));
        store.insert("c", "c", doc("reprocess"));
        store.insert("c", "d", doc("pending"));

        let ids: Vec<String> = store
            .query_in("c", "status", &["pending", "reprocess"], 2)
            .await
            .unwrap()
            .map(|d| d.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn update_merges_fields_and_rejects_unknown_ids() {
        let store = InMemoryStore::new();
        store.insert("c", "a", doc("pending"));

        let mut patch = Fields::new();
        patch.insert("status".into(), FieldValue::from("scraper_ok"));
        store.update("c", "a", patch.clone()).await.unwrap();

        let snap = store.snapshot("c", "a").unwrap();
        assert_eq!(snap.get("status"), Some(&FieldValue::from("scraper_ok")));
        assert_eq!(
            snap.get("link"),
            Some(&FieldValue::from("https://example.com"))
        );

        let err = store.update("c", "missing", patch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn create_generates_distinct_ids() {
        let store = InMemoryStore::new();
        let a = store.create("logs", Fields::new()).await.unwrap();
        let b = store.create("logs", Fields::new()).await.unwrap();
        assert_ne!(a, b);
        assert!(store.get("logs", &a).await.unwrap().is_some());
    }
}
