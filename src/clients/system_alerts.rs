//! Broadcast "active danger" alerts: operator-authored notices streamed to
//! every nearby client.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::Feed;
use crate::models::system_alert::{DEFAULT_DURATION_SECS, DEFAULT_RADIUS_METERS};
use crate::models::{NewSystemAlert, Severity, SystemAlert};
use crate::store::{collections, DocumentStore, Query, StoreError, SERVER_TIMESTAMP};

pub struct SystemAlertClient {
    store: Arc<dyn DocumentStore>,
}

impl SystemAlertClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Publishes a broadcast alert, active immediately. `expiresAt` is only
    /// written when the caller supplies one; otherwise clearing is left to
    /// the external deactivation process. Unlike SOS reports there is no
    /// local fallback here: an operator must see a failed publish.
    pub async fn create(&self, alert: NewSystemAlert) -> Result<String, StoreError> {
        let mut doc = json!({
            "title": alert.title,
            "message": alert.message,
            "severity": alert.severity.unwrap_or(Severity::Medium),
            "location": alert.location,
            "radius": alert.radius.unwrap_or(DEFAULT_RADIUS_METERS),
            "duration": alert.duration.unwrap_or(DEFAULT_DURATION_SECS),
            "createdAt": SERVER_TIMESTAMP,
            "isActive": true,
        });
        let fields = doc.as_object_mut().expect("system alert is an object");
        if let Some(kind) = alert.alert_type {
            fields.insert("type".to_string(), Value::String(kind));
        }
        if let Some(expires_at) = alert.expires_at {
            fields.insert(
                "expiresAt".to_string(),
                Value::String(crate::store::encode_timestamp(expires_at)),
            );
        }

        let id = self.store.insert(collections::SYSTEM_ALERTS, doc).await?;
        info!("system alert created: {}", id);
        Ok(id)
    }

    /// Live feed of every active alert, newest first, uncapped.
    pub async fn subscribe_active(&self) -> Result<Feed<SystemAlert>, StoreError> {
        let sub = self
            .store
            .subscribe(
                collections::SYSTEM_ALERTS,
                Query::new()
                    .filter_eq("isActive", json!(true))
                    .order_desc("createdAt"),
            )
            .await?;
        Ok(Feed::new(sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use crate::store::MemoryStore;

    fn notice(title: &str) -> NewSystemAlert {
        NewSystemAlert {
            title: title.to_string(),
            message: "leave the area".to_string(),
            severity: None,
            alert_type: Some("fire".to_string()),
            location: GeoPoint {
                latitude: 1.0,
                longitude: 2.0,
                address: None,
            },
            radius: None,
            duration: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn create_applies_documented_defaults() {
        let store = MemoryStore::new();
        let client = SystemAlertClient::new(Arc::new(store.clone()));

        let id = client.create(notice("Evacuation")).await.unwrap();
        let doc = store
            .get(collections::SYSTEM_ALERTS, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.data["severity"], json!("medium"));
        assert_eq!(doc.data["radius"], json!(DEFAULT_RADIUS_METERS));
        assert_eq!(doc.data["duration"], json!(DEFAULT_DURATION_SECS));
        assert_eq!(doc.data["isActive"], json!(true));
        assert!(doc.data.get("expiresAt").is_none());
        assert!(doc.data["createdAt"].is_string());
    }

    #[tokio::test]
    async fn explicit_expiry_is_written_when_supplied() {
        let store = MemoryStore::new();
        let client = SystemAlertClient::new(Arc::new(store.clone()));

        let expires_at = "2026-08-30T18:00:00Z".parse().unwrap();
        let mut alert = notice("Storm");
        alert.expires_at = Some(expires_at);
        alert.severity = Some(Severity::High);

        let id = client.create(alert).await.unwrap();
        let doc = store
            .get(collections::SYSTEM_ALERTS, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.data["severity"], json!("high"));
        assert_eq!(
            doc.data["expiresAt"],
            json!(crate::store::encode_timestamp(expires_at))
        );
    }

    #[tokio::test]
    async fn active_feed_tracks_only_active_alerts() {
        let store = MemoryStore::new();
        let client = SystemAlertClient::new(Arc::new(store.clone()));

        let id = client.create(notice("Fire")).await.unwrap();
        let mut feed = client.subscribe_active().await.unwrap();
        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "Fire");
        assert_eq!(snapshot[0].alert_type.as_deref(), Some("fire"));

        // external deactivation flips the flag; the feed reflects it
        store
            .update(collections::SYSTEM_ALERTS, &id, json!({"isActive": false}))
            .await
            .unwrap();
        let snapshot = feed.next().await.unwrap();
        assert!(snapshot.is_empty());
    }
}
