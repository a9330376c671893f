use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GeoPoint;

pub const DEFAULT_RADIUS_METERS: f64 = 1000.0;
pub const DEFAULT_DURATION_SECS: u64 = 60;

/// Broadcast severity. Anything unrecognized on the wire lands on `Unknown`
/// and is rendered with the fail-safe high-severity styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

/// A location-scoped danger notice, distinct from a user-submitted SOS
/// alert. Created active; deactivation happens outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAlert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, rename = "type")]
    pub alert_type: Option<String>,
    pub location: GeoPoint,
    pub radius: f64,
    pub duration: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewSystemAlert {
    pub title: String,
    pub message: String,
    pub severity: Option<Severity>,
    pub alert_type: Option<String>,
    pub location: GeoPoint,
    pub radius: Option<f64>,
    pub duration: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_known_levels() {
        assert_eq!(
            serde_json::from_str::<Severity>("\"high\"").unwrap(),
            Severity::High
        );
        assert_eq!(
            serde_json::from_str::<Severity>("\"medium\"").unwrap(),
            Severity::Medium
        );
        assert_eq!(
            serde_json::from_str::<Severity>("\"low\"").unwrap(),
            Severity::Low
        );
    }

    #[test]
    fn unrecognized_severity_falls_back_to_unknown() {
        assert_eq!(
            serde_json::from_str::<Severity>("\"catastrophic\"").unwrap(),
            Severity::Unknown
        );
    }
}
