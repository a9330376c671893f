//! Local mirror used when the remote store denies permission. A reported
//! emergency is never dropped because of an authorization misconfiguration;
//! the mirror is authoritative while degraded and is not reconciled back.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::SosAlert;
use crate::store::{encode_timestamp, StoreError};

const ALERTS_FILE: &str = "sos_alerts.json";
const USERS_FILE: &str = "users.json";

/// Mints the locally-scoped ids handed out while degraded. The prefix keeps
/// them distinguishable from store-assigned ids.
pub fn local_id(kind: &str) -> String {
    format!("local_{}_{}", kind, Utc::now().timestamp_millis())
}

pub struct FallbackStore {
    dir: PathBuf,
    // serializes read-modify-write cycles on the mirror files
    lock: Mutex<()>,
}

impl FallbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Prepends a full alert record to the mirror list (most recent first)
    /// and returns its id.
    pub async fn push_alert(&self, alert: SosAlert) -> Result<String, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.dir.join(ALERTS_FILE);
        let mut alerts = read_json::<Vec<SosAlert>>(&path).await?.unwrap_or_default();
        let id = alert.id.clone();
        alerts.insert(0, alert);
        write_json(&self.dir, &path, &alerts).await?;
        debug!("mirrored alert {} locally ({} total)", id, alerts.len());
        Ok(id)
    }

    pub async fn alerts_for_user(&self, user_id: &str) -> Result<Vec<SosAlert>, StoreError> {
        let _guard = self.lock.lock().await;
        let alerts = read_json::<Vec<SosAlert>>(&self.dir.join(ALERTS_FILE))
            .await?
            .unwrap_or_default();
        Ok(alerts
            .into_iter()
            .filter(|alert| alert.user_id == user_id)
            .collect())
    }

    /// Shallow-merges profile fields into the local user mirror, stamping
    /// `lastUpdated` with the local clock.
    pub async fn save_user(&self, user_id: &str, fields: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.dir.join(USERS_FILE);
        let mut users = read_json::<serde_json::Map<String, Value>>(&path)
            .await?
            .unwrap_or_default();

        let entry = users
            .entry(user_id.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let (Value::Object(existing), Value::Object(incoming)) = (entry, fields) {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
            existing.insert(
                "lastUpdated".to_string(),
                Value::String(encode_timestamp(Utc::now())),
            );
        }
        write_json(&self.dir, &path, &users).await?;
        Ok(())
    }

    pub async fn load_user(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        let users = read_json::<serde_json::Map<String, Value>>(&self.dir.join(USERS_FILE))
            .await?
            .unwrap_or_default();
        Ok(users.get(user_id).cloned())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn write_json<T: serde::Serialize>(
    dir: &Path,
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    fs::create_dir_all(dir).await?;
    // staged write plus rename; an interrupted write never clobbers the
    // current mirror file
    let staged = path.with_extension("json.tmp");
    fs::write(&staged, serde_json::to_vec_pretty(value)?).await?;
    fs::rename(&staged, path).await?;
    Ok(())
}
