//! User profile upserts with shallow-merge semantics.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::fallback::FallbackStore;
use crate::models::UserProfile;
use crate::store::{collections, DocumentStore, StoreError, SERVER_TIMESTAMP};

pub struct UserClient {
    store: Arc<dyn DocumentStore>,
    fallback: Arc<FallbackStore>,
}

impl UserClient {
    pub fn new(store: Arc<dyn DocumentStore>, fallback: Arc<FallbackStore>) -> Self {
        Self { store, fallback }
    }

    /// Layers the given fields onto the stored profile and stamps
    /// `lastUpdated`. A permission-denied store answer degrades to the
    /// local mirror.
    pub async fn upsert(&self, user_id: &str, mut fields: Value) -> Result<(), StoreError> {
        if let Some(map) = fields.as_object_mut() {
            map.insert("lastUpdated".to_string(), json!(SERVER_TIMESTAMP));
        }
        match self
            .store
            .upsert_merge(collections::USERS, user_id, fields.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::PermissionDenied) => {
                warn!("store denied profile write for {}, mirroring locally", user_id);
                // the sentinel is meaningless locally; the mirror stamps itself
                if let Some(map) = fields.as_object_mut() {
                    map.remove("lastUpdated");
                }
                self.fallback.save_user(user_id, fields).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let doc = self.store.get(collections::USERS, user_id).await?;
        doc.map(|doc| doc.decode().map_err(StoreError::Encoding))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn upsert_layers_fields_and_stamps_last_updated() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let client = UserClient::new(
            Arc::new(store),
            Arc::new(FallbackStore::new(dir.path())),
        );

        client
            .upsert("u1", json!({"name": "Ada", "phone": "1"}))
            .await
            .unwrap();
        client.upsert("u1", json!({"phone": "2"})).await.unwrap();

        let profile = client.get("u1").await.unwrap().unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.fields["name"], json!("Ada"));
        assert_eq!(profile.fields["phone"], json!("2"));
    }

    #[tokio::test]
    async fn denied_upsert_lands_in_local_mirror() {
        let store = MemoryStore::new();
        store.deny(collections::USERS);
        let dir = tempfile::tempdir().unwrap();
        let fallback = Arc::new(FallbackStore::new(dir.path()));
        let client = UserClient::new(Arc::new(store), fallback.clone());

        client.upsert("u1", json!({"name": "Ada"})).await.unwrap();

        let mirrored = fallback.load_user("u1").await.unwrap().unwrap();
        assert_eq!(mirrored["name"], json!("Ada"));
        assert!(mirrored["lastUpdated"].is_string());
    }
}
