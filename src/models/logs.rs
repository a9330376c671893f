//! Append-only log records: analysis results and notification dispatches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ANALYSIS_STATUS_COMPLETED: &str = "completed";
pub const NOTIFICATION_STATUS_SENT: &str = "sent";
pub const NOTIFICATION_TYPE_GENERAL: &str = "general";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisLogEntry {
    pub id: String,
    pub report_id: String,
    #[serde(default)]
    pub video_url: Option<String>,
    pub analysis: Value,
    pub analyzed_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct NewAnalysisLog {
    pub report_id: String,
    pub video_url: Option<String>,
    pub analysis: Value,
    pub status: Option<String>,
}

/// Record of one dispatch action. `report_id` is mandatory; creation fails
/// before any store call without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLogEntry {
    pub id: String,
    pub report_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub emergency_services: Vec<String>,
    pub public_recipients: Vec<String>,
    pub sent_at: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct NewNotificationLog {
    pub report_id: String,
    pub kind: Option<String>,
    pub emergency_services: Vec<String>,
    pub public_recipients: Vec<String>,
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub message: Option<String>,
    pub metadata: Option<Value>,
}
