use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Profile document upserted with shallow-merge semantics: new fields layer
/// onto whatever is already stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}
