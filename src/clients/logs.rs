//! Append-only log clients. No read/update/delete surface by design.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::fallback::local_id;
use crate::models::logs::{
    ANALYSIS_STATUS_COMPLETED, NOTIFICATION_STATUS_SENT, NOTIFICATION_TYPE_GENERAL,
};
use crate::models::{NewAnalysisLog, NewNotificationLog};
use crate::store::{collections, DocumentStore, StoreError, SERVER_TIMESTAMP};

pub struct AnalysisLogClient {
    store: Arc<dyn DocumentStore>,
}

impl AnalysisLogClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, log: NewAnalysisLog) -> Result<String, StoreError> {
        let doc = json!({
            "reportId": log.report_id,
            "videoUrl": log.video_url,
            "analysis": log.analysis,
            "analyzedAt": SERVER_TIMESTAMP,
            "status": log.status.unwrap_or_else(|| ANALYSIS_STATUS_COMPLETED.to_string()),
        });
        let id = self.store.insert(collections::ANALYSIS_LOGS, doc).await?;
        info!("analysis log created: {}", id);
        Ok(id)
    }
}

pub struct NotificationLogClient {
    store: Arc<dyn DocumentStore>,
}

impl NotificationLogClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Appends a dispatch record. Fails fast without a report reference.
    /// A permission-denied store answer is a soft success with a synthetic
    /// id: failing to log a notification must never block its delivery.
    pub async fn append(&self, log: NewNotificationLog) -> Result<String, StoreError> {
        if log.report_id.trim().is_empty() {
            return Err(StoreError::MissingField("reportId"));
        }

        let mut doc = json!({
            "reportId": log.report_id,
            "type": log.kind.unwrap_or_else(|| NOTIFICATION_TYPE_GENERAL.to_string()),
            "emergencyServices": log.emergency_services,
            "publicRecipients": log.public_recipients,
            "sentAt": SERVER_TIMESTAMP,
            "status": log.status.unwrap_or_else(|| NOTIFICATION_STATUS_SENT.to_string()),
        });
        let fields = doc.as_object_mut().expect("notification log is an object");
        if let Some(user_id) = log.user_id {
            fields.insert("userId".to_string(), Value::String(user_id));
        }
        if let Some(message) = log.message {
            fields.insert("message".to_string(), Value::String(message));
        }
        if let Some(metadata) = log.metadata {
            fields.insert("metadata".to_string(), metadata);
        }

        match self.store.insert(collections::NOTIFICATION_LOGS, doc).await {
            Ok(id) => {
                info!("notification log created: {}", id);
                Ok(id)
            }
            Err(StoreError::PermissionDenied) => {
                warn!("store denied notification log write, continuing without it");
                Ok(local_id("log"))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationLogEntry;
    use crate::store::MemoryStore;

    fn dispatch(report: &str) -> NewNotificationLog {
        NewNotificationLog {
            report_id: report.to_string(),
            emergency_services: vec!["fire-dept".to_string()],
            public_recipients: vec!["u2".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn notification_without_report_id_fails_before_store_call() {
        let store = MemoryStore::new();
        let client = NotificationLogClient::new(Arc::new(store.clone()));

        let err = client.append(dispatch(" ")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingField("reportId")));
        assert_eq!(store.count(collections::NOTIFICATION_LOGS), 0);
    }

    #[tokio::test]
    async fn notification_defaults_type_status_and_timestamps() {
        let store = MemoryStore::new();
        let client = NotificationLogClient::new(Arc::new(store.clone()));

        let id = client.append(dispatch("r1")).await.unwrap();
        let doc = store
            .get(collections::NOTIFICATION_LOGS, &id)
            .await
            .unwrap()
            .unwrap();
        let entry: NotificationLogEntry = doc.decode().unwrap();
        assert_eq!(entry.kind, NOTIFICATION_TYPE_GENERAL);
        assert_eq!(entry.status, NOTIFICATION_STATUS_SENT);
        assert_eq!(entry.emergency_services, vec!["fire-dept".to_string()]);
        assert!(entry.user_id.is_none());
    }

    #[tokio::test]
    async fn notification_permission_denied_is_soft_success() {
        let store = MemoryStore::new();
        store.deny(collections::NOTIFICATION_LOGS);
        let client = NotificationLogClient::new(Arc::new(store.clone()));

        let id = client.append(dispatch("r1")).await.unwrap();
        assert!(id.starts_with("local_log_"));
        assert_eq!(store.count(collections::NOTIFICATION_LOGS), 0);
    }

    #[tokio::test]
    async fn analysis_log_records_payload_with_defaulted_status() {
        let store = MemoryStore::new();
        let client = AnalysisLogClient::new(Arc::new(store.clone()));

        let id = client
            .append(NewAnalysisLog {
                report_id: "r1".to_string(),
                video_url: Some("https://cdn/v.mp4".to_string()),
                analysis: json!({"isEmergency": true}),
                status: None,
            })
            .await
            .unwrap();

        let doc = store
            .get(collections::ANALYSIS_LOGS, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.data["status"], json!(ANALYSIS_STATUS_COMPLETED));
        assert_eq!(doc.data["analysis"], json!({"isEmergency": true}));
        assert!(doc.data["analyzedAt"].is_string());
    }
}
