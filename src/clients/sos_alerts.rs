//! SOS alert lifecycle: create, list, live-subscribe, analysis attachment
//! and the downstream triage queries.
//!
//! The reporting path never silently loses a user-submitted emergency: a
//! permission-denied answer from the store degrades to the local mirror
//! instead of failing the report.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::{decode_batch, Feed};
use crate::fallback::{local_id, FallbackStore};
use crate::models::sos_alert::{DEFAULT_ANALYZER_VERSION, STATUS_PENDING};
use crate::models::{AnalysisVerdict, NewSosAlert, SosAlert};
use crate::store::{
    collections, Document, DocumentStore, Query, StoreError, Subscription, SERVER_TIMESTAMP,
};

/// Live feeds deliver at most this many records per snapshot.
const SUBSCRIPTION_CAP: usize = 20;
const DEFAULT_ADDRESS: &str = "Address not available";

pub struct SosAlertClient {
    store: Arc<dyn DocumentStore>,
    fallback: Arc<FallbackStore>,
}

impl SosAlertClient {
    pub fn new(store: Arc<dyn DocumentStore>, fallback: Arc<FallbackStore>) -> Self {
        Self { store, fallback }
    }

    /// Files a new report and returns its id. Status starts as `pending`
    /// and every analysis-derived field starts absent. A permission-denied
    /// store answer falls back to the local mirror and mints a
    /// `local_sos_*` id; any other failure propagates unchanged.
    pub async fn create(&self, alert: NewSosAlert) -> Result<String, StoreError> {
        if alert.user_id.trim().is_empty() {
            return Err(StoreError::MissingField("userId"));
        }
        if alert.message.trim().is_empty() {
            return Err(StoreError::MissingField("message"));
        }

        let doc = json!({
            "userId": alert.user_id.clone(),
            "message": alert.message.clone(),
            "videoUrl": alert.video_url.clone(),
            "location": {
                "latitude": alert.location.latitude,
                "longitude": alert.location.longitude,
                "address": alert.location.address.clone()
                    .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            },
            "createdAt": SERVER_TIMESTAMP,
            "status": STATUS_PENDING,
            "analysis": null,
            "isEmergency": null,
            "primaryService": null,
            "analysisConfidence": null,
            "lastUpdated": SERVER_TIMESTAMP,
            "adminReview": null,
        });

        match self.store.insert(collections::SOS_ALERTS, doc).await {
            Ok(id) => {
                info!("SOS alert created: {}", id);
                Ok(id)
            }
            Err(StoreError::PermissionDenied) => {
                warn!("store denied SOS alert write, mirroring locally");
                let now = Utc::now();
                let record = SosAlert {
                    id: local_id("sos"),
                    user_id: alert.user_id,
                    message: alert.message,
                    video_url: alert.video_url,
                    location: alert.location,
                    created_at: now,
                    status: STATUS_PENDING.to_string(),
                    analysis: None,
                    is_emergency: None,
                    primary_service: None,
                    analysis_confidence: None,
                    last_updated: now,
                    admin_review: None,
                };
                self.fallback.push_alert(record).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<SosAlert>, StoreError> {
        let doc = self.store.get(collections::SOS_ALERTS, id).await?;
        doc.map(|doc| doc.decode().map_err(StoreError::Encoding))
            .transpose()
    }

    /// Up to `limit` alerts for the user, newest first.
    pub async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<SosAlert>, StoreError> {
        let docs = self
            .store
            .query(
                collections::SOS_ALERTS,
                Query::new()
                    .filter_eq("userId", json!(user_id))
                    .order_desc("createdAt")
                    .limit(limit),
            )
            .await?;
        Ok(decode_batch(docs))
    }

    /// Live feed of the user's alerts, newest first, capped at 20. A
    /// permission-denied store answer degrades to one snapshot of the local
    /// mirror; any other subscribe failure yields one empty snapshot.
    pub async fn subscribe(&self, user_id: &str) -> Feed<SosAlert> {
        let query = Query::new()
            .filter_eq("userId", json!(user_id))
            .order_desc("createdAt")
            .limit(SUBSCRIPTION_CAP);
        match self.store.subscribe(collections::SOS_ALERTS, query).await {
            Ok(sub) => Feed::new(sub),
            Err(StoreError::PermissionDenied) => {
                warn!("store denied SOS alert feed, serving local mirror once");
                let docs = match self.fallback.alerts_for_user(user_id).await {
                    Ok(alerts) => alerts
                        .into_iter()
                        .filter_map(|alert| {
                            let id = alert.id.clone();
                            serde_json::to_value(alert)
                                .ok()
                                .map(|data| Document { id, data })
                        })
                        .collect(),
                    Err(err) => {
                        warn!("local mirror read failed: {}", err);
                        Vec::new()
                    }
                };
                Feed::new(Subscription::single_snapshot(docs))
            }
            Err(err) => {
                warn!("SOS alert subscription failed: {}", err);
                Feed::new(Subscription::single_snapshot(Vec::new()))
            }
        }
    }

    /// Atomically writes the nested analysis object, its three convenience
    /// mirrors and `lastUpdated`. No other field is touched.
    pub async fn update_with_analysis(
        &self,
        alert_id: &str,
        verdict: AnalysisVerdict,
    ) -> Result<(), StoreError> {
        let patch = json!({
            "analysis": {
                "isEmergency": verdict.is_emergency,
                "reason": verdict.reason,
                "primaryService": verdict.primary_service.clone(),
                "confidence": verdict.confidence,
                "analyzedAt": SERVER_TIMESTAMP,
                "videoUrl": verdict.video_url,
                "analyzerVersion": verdict
                    .analyzer_version
                    .unwrap_or_else(|| DEFAULT_ANALYZER_VERSION.to_string()),
                "error": false,
                "errorMessage": null,
            },
            "isEmergency": verdict.is_emergency,
            "primaryService": verdict.primary_service,
            "analysisConfidence": verdict.confidence,
            "lastUpdated": SERVER_TIMESTAMP,
        });
        self.store
            .update(collections::SOS_ALERTS, alert_id, patch)
            .await?;
        info!("SOS alert {} updated with analysis", alert_id);
        Ok(())
    }

    /// Alerts the analyzer flagged as real emergencies, newest first.
    pub async fn emergencies(&self, limit: usize) -> Result<Vec<SosAlert>, StoreError> {
        self.query_alerts(Query::new().filter_eq("isEmergency", json!(true)).limit(limit))
            .await
    }

    /// Alerts with a video still waiting for analysis, newest first.
    pub async fn awaiting_analysis(&self, limit: usize) -> Result<Vec<SosAlert>, StoreError> {
        self.query_alerts(
            Query::new()
                .filter_is_null("analysis")
                .filter_not_null("videoUrl")
                .limit(limit),
        )
        .await
    }

    /// Alerts classified for the given primary service, newest first.
    pub async fn by_service(
        &self,
        service: &str,
        limit: usize,
    ) -> Result<Vec<SosAlert>, StoreError> {
        self.query_alerts(
            Query::new()
                .filter_eq("primaryService", json!(service))
                .limit(limit),
        )
        .await
    }

    async fn query_alerts(&self, query: Query) -> Result<Vec<SosAlert>, StoreError> {
        let docs = self
            .store
            .query(collections::SOS_ALERTS, query.order_desc("createdAt"))
            .await?;
        Ok(decode_batch(docs))
    }
}
