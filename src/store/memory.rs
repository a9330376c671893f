//! In-memory document store, the injectable fake for tests and demos.
//!
//! Watchers are re-evaluated on every mutation of their collection and only
//! receive a snapshot when the matching set actually changed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    eval_query, merge_shallow, resolve_server_timestamps, Document, DocumentStore, Query,
    StoreError, Subscription, SubscriptionHandle,
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    docs: Mutex<HashMap<String, Vec<Document>>>,
    watchers: Mutex<Vec<Watcher>>,
    denied: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
}

struct Watcher {
    collection: String,
    query: Query,
    tx: mpsc::UnboundedSender<Vec<Document>>,
    token: CancellationToken,
    last: Vec<Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a security rule denying all access to a collection, the way
    /// a misconfigured backend would.
    pub fn deny(&self, collection: &str) {
        self.inner
            .denied
            .lock()
            .expect("denied lock")
            .insert(collection.to_string());
    }

    pub fn allow(&self, collection: &str) {
        self.inner
            .denied
            .lock()
            .expect("denied lock")
            .remove(collection);
    }

    /// Simulates an unreachable backend for a collection; every operation on
    /// it answers with a database error rather than a permission one.
    pub fn fail(&self, collection: &str) {
        self.inner
            .failing
            .lock()
            .expect("failing lock")
            .insert(collection.to_string());
    }

    /// Number of documents currently held in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.inner
            .docs
            .lock()
            .expect("docs lock")
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn check_access(&self, collection: &str) -> Result<(), StoreError> {
        if self
            .inner
            .denied
            .lock()
            .expect("denied lock")
            .contains(collection)
        {
            return Err(StoreError::PermissionDenied);
        }
        if self
            .inner
            .failing
            .lock()
            .expect("failing lock")
            .contains(collection)
        {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn collection_snapshot(&self, collection: &str) -> Vec<Document> {
        self.inner
            .docs
            .lock()
            .expect("docs lock")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Pushes fresh snapshots to every live watcher of `collection` whose
    /// matching set changed. Dead or cancelled watchers are dropped here.
    fn notify(&self, collection: &str) {
        let docs = self.collection_snapshot(collection);
        let mut watchers = self.inner.watchers.lock().expect("watchers lock");
        watchers.retain_mut(|watcher| {
            if watcher.collection != collection {
                return true;
            }
            if watcher.token.is_cancelled() {
                return false;
            }
            let snapshot = eval_query(&docs, &watcher.query);
            if snapshot == watcher.last {
                return true;
            }
            watcher.last = snapshot.clone();
            watcher.tx.send(snapshot).is_ok()
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, mut data: Value) -> Result<String, StoreError> {
        self.check_access(collection)?;
        resolve_server_timestamps(&mut data, Utc::now());
        let id = Uuid::new_v4().to_string();
        self.inner
            .docs
            .lock()
            .expect("docs lock")
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                data,
            });
        self.notify(collection);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_access(collection)?;
        Ok(self
            .collection_snapshot(collection)
            .into_iter()
            .find(|doc| doc.id == id))
    }

    async fn upsert_merge(
        &self,
        collection: &str,
        id: &str,
        mut data: Value,
    ) -> Result<(), StoreError> {
        self.check_access(collection)?;
        resolve_server_timestamps(&mut data, Utc::now());
        {
            let mut docs = self.inner.docs.lock().expect("docs lock");
            let docs = docs.entry(collection.to_string()).or_default();
            match docs.iter_mut().find(|doc| doc.id == id) {
                Some(doc) => merge_shallow(&mut doc.data, data),
                None => docs.push(Document {
                    id: id.to_string(),
                    data,
                }),
            }
        }
        self.notify(collection);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Value) -> Result<(), StoreError> {
        self.check_access(collection)?;
        resolve_server_timestamps(&mut patch, Utc::now());
        {
            let mut docs = self.inner.docs.lock().expect("docs lock");
            let doc = docs
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            merge_shallow(&mut doc.data, patch);
        }
        self.notify(collection);
        Ok(())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>, StoreError> {
        self.check_access(collection)?;
        Ok(eval_query(&self.collection_snapshot(collection), &query))
    }

    async fn subscribe(
        &self,
        collection: &str,
        query: Query,
    ) -> Result<Subscription, StoreError> {
        self.check_access(collection)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let snapshot = eval_query(&self.collection_snapshot(collection), &query);
        let _ = tx.send(snapshot.clone());
        self.inner
            .watchers
            .lock()
            .expect("watchers lock")
            .push(Watcher {
                collection: collection.to_string(),
                query,
                tx,
                token: token.clone(),
                last: snapshot,
            });
        Ok(Subscription::new(rx, SubscriptionHandle::new(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::encode_timestamp;
    use serde_json::json;

    fn doc(user: &str, seconds: u32) -> Value {
        json!({
            "userId": user,
            "createdAt": format!("2026-08-30T12:00:{seconds:02}.000000Z"),
        })
    }

    #[tokio::test]
    async fn insert_assigns_nonempty_id_and_resolves_timestamps() {
        let store = MemoryStore::new();
        let id = store
            .insert("sos-alerts", json!({ "createdAt": super::super::SERVER_TIMESTAMP }))
            .await
            .unwrap();
        assert!(!id.is_empty());
        let stored = store.get("sos-alerts", &id).await.unwrap().unwrap();
        let created = stored.data["createdAt"].as_str().unwrap();
        assert_ne!(created, super::super::SERVER_TIMESTAMP);
        // stamp must parse back as a timestamp
        let parsed: chrono::DateTime<chrono::Utc> = created.parse().unwrap();
        assert_eq!(encode_timestamp(parsed), created);
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store.insert("sos-alerts", doc("u1", i)).await.unwrap();
        }
        store.insert("sos-alerts", doc("u2", 9)).await.unwrap();

        let out = store
            .query(
                "sos-alerts",
                Query::new()
                    .filter_eq("userId", json!("u1"))
                    .order_desc("createdAt")
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].data["createdAt"], json!("2026-08-30T12:00:03.000000Z"));
        assert_eq!(out[1].data["createdAt"], json!("2026-08-30T12:00:02.000000Z"));
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_snapshot_then_changes_only() {
        let store = MemoryStore::new();
        store.insert("alerts", doc("u1", 0)).await.unwrap();

        let mut sub = store
            .subscribe("alerts", Query::new().filter_eq("userId", json!("u1")))
            .await
            .unwrap();
        let first = sub.next().await.unwrap();
        assert_eq!(first.len(), 1);

        // a non-matching insert changes nothing; a matching one fires
        store.insert("alerts", doc("u2", 1)).await.unwrap();
        store.insert("alerts", doc("u1", 2)).await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_watcher_receives_nothing_further() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("alerts", Query::new()).await.unwrap();
        assert!(sub.next().await.unwrap().is_empty());

        let handle = sub.handle();
        handle.cancel();
        handle.cancel(); // idempotent
        store.insert("alerts", doc("u1", 0)).await.unwrap();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn denied_collection_maps_to_permission_denied() {
        let store = MemoryStore::new();
        store.deny("sos-alerts");
        let err = store.insert("sos-alerts", doc("u1", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied));
        assert_eq!(store.count("sos-alerts"), 0);

        store.allow("sos-alerts");
        store.insert("sos-alerts", doc("u1", 0)).await.unwrap();
        assert_eq!(store.count("sos-alerts"), 1);
    }

    #[tokio::test]
    async fn failing_collection_surfaces_a_database_error() {
        let store = MemoryStore::new();
        store.fail("sos-alerts");
        let err = store.insert("sos-alerts", doc("u1", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(matches!(
            store.subscribe("sos-alerts", Query::new()).await,
            Err(StoreError::Database(_))
        ));
        assert_eq!(store.count("sos-alerts"), 0);
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("sos-alerts", "nope", json!({"status": "done"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn upsert_merge_layers_fields() {
        let store = MemoryStore::new();
        store
            .upsert_merge("users", "u1", json!({"name": "Ada", "phone": "1"}))
            .await
            .unwrap();
        store
            .upsert_merge("users", "u1", json!({"phone": "2", "city": "Goa"}))
            .await
            .unwrap();
        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], json!("Ada"));
        assert_eq!(doc.data["phone"], json!("2"));
        assert_eq!(doc.data["city"], json!("Goa"));
    }
}
