use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status assigned to every freshly reported alert.
pub const STATUS_PENDING: &str = "pending";

/// Written into the analysis record when the analyzer does not identify
/// itself.
pub const DEFAULT_ANALYZER_VERSION: &str = "video-analyzer-v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// AI classification attached to an alert after its video is analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub is_emergency: bool,
    pub reason: String,
    pub primary_service: String,
    pub confidence: f64,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default)]
    pub video_url: Option<String>,
    pub analyzer_version: String,
    pub error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// A user-submitted emergency report as stored in the `sos-alerts`
/// collection. The three convenience fields mirror the nested analysis and
/// are only ever written together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosAlert {
    pub id: String,
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub video_url: Option<String>,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub is_emergency: Option<bool>,
    #[serde(default)]
    pub primary_service: Option<String>,
    #[serde(default)]
    pub analysis_confidence: Option<f64>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub admin_review: Option<Value>,
}

/// Caller-supplied fields for a new report.
#[derive(Debug, Clone)]
pub struct NewSosAlert {
    pub user_id: String,
    pub message: String,
    pub video_url: Option<String>,
    pub location: GeoPoint,
}

/// Analyzer verdict handed to `update_with_analysis`.
#[derive(Debug, Clone)]
pub struct AnalysisVerdict {
    pub is_emergency: bool,
    pub reason: String,
    pub primary_service: String,
    pub confidence: f64,
    pub video_url: Option<String>,
    pub analyzer_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alert_decodes_from_wire_document() {
        let wire = json!({
            "id": "abc",
            "userId": "u1",
            "message": "Fire on 5th floor",
            "videoUrl": null,
            "location": { "latitude": 1.0, "longitude": 2.0, "address": "5th Ave" },
            "createdAt": "2026-08-30T10:00:00.000000Z",
            "status": "pending",
            "analysis": null,
            "isEmergency": null,
            "primaryService": null,
            "analysisConfidence": null,
            "lastUpdated": "2026-08-30T10:00:00.000000Z",
            "adminReview": null
        });
        let alert: SosAlert = serde_json::from_value(wire).unwrap();
        assert_eq!(alert.user_id, "u1");
        assert_eq!(alert.status, STATUS_PENDING);
        assert!(alert.analysis.is_none());
        assert!(alert.is_emergency.is_none());
        assert_eq!(alert.location.address.as_deref(), Some("5th Ave"));
    }

    #[test]
    fn analysis_result_uses_camel_case_on_the_wire() {
        let result = AnalysisResult {
            is_emergency: true,
            reason: "visible flames".into(),
            primary_service: "fire".into(),
            confidence: 0.92,
            analyzed_at: "2026-08-30T10:05:00Z".parse().unwrap(),
            video_url: Some("https://cdn/sos.mp4".into()),
            analyzer_version: DEFAULT_ANALYZER_VERSION.into(),
            error: false,
            error_message: None,
        };
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["isEmergency"], json!(true));
        assert_eq!(wire["primaryService"], json!("fire"));
        assert_eq!(wire["analyzerVersion"], json!(DEFAULT_ANALYZER_VERSION));
    }
}
