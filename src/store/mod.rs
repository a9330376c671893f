//! Document store abstraction: a narrow CRUD/query/subscribe surface with
//! interchangeable backends (Postgres, in-memory).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod memory;
pub mod postgres;
pub mod queries;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Collection names, one logical collection per entity kind.
pub mod collections {
    pub const SOS_ALERTS: &str = "sos-alerts";
    pub const ANALYSIS_LOGS: &str = "analysis-logs";
    pub const SYSTEM_ALERTS: &str = "alerts";
    pub const NOTIFICATION_LOGS: &str = "notificationLogs";
    pub const USERS: &str = "users";
}

/// Sentinel replaced by the adapter's clock at write time.
pub const SERVER_TIMESTAMP: &str = "$serverTimestamp";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("permission denied by document store")]
    PermissionDenied,
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("unsupported field name in query: `{0}`")]
    InvalidField(String),
    #[error("document store backend error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("local fallback storage error: {0}")]
    Fallback(#[from] std::io::Error),
}

/// One stored document: store-assigned (or locally minted) id plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Decodes the document into a typed model, injecting the id as the
    /// `id` field the way the wire schema expects it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".to_string(), Value::String(self.id.clone()));
        }
        serde_json::from_value(data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the given JSON value. Missing fields never match.
    Eq(String, Value),
    /// Field is absent or JSON null.
    IsNull(String),
    /// Field is present and not JSON null.
    NotNull(String),
}

/// An (equality/null filter, descending-order field, limit) query triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_desc_by: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value));
        self
    }

    pub fn filter_is_null(mut self, field: &str) -> Self {
        self.filters.push(Filter::IsNull(field.to_string()));
        self
    }

    pub fn filter_not_null(mut self, field: &str) -> Self {
        self.filters.push(Filter::NotNull(field.to_string()));
        self
    }

    pub fn order_desc(mut self, field: &str) -> Self {
        self.order_desc_by = Some(field.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Cancellation handle for a live subscription. Cloneable; cancelling twice
/// (or cancelling a fallback handle) is a no-op.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Handle not wired to any live feed; cancel does nothing.
    pub(crate) fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A live feed of full current-match snapshots. The first snapshot is
/// delivered immediately on subscription; one more arrives each time the
/// matching set changes. Delivery is sequential per subscription.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Vec<Document>>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Vec<Document>>,
        handle: SubscriptionHandle,
    ) -> Self {
        Self { rx, handle }
    }

    /// Feed that delivers exactly one snapshot and then ends, with a
    /// detached handle. Used by degraded/fallback paths.
    pub(crate) fn single_snapshot(docs: Vec<Document>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(docs);
        Self {
            rx,
            handle: SubscriptionHandle::detached(),
        }
    }

    pub async fn next(&mut self) -> Option<Vec<Document>> {
        self.rx.recv().await
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document and returns its store-assigned id.
    async fn insert(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Creates or shallow-merges into the document with the given id.
    async fn upsert_merge(&self, collection: &str, id: &str, data: Value)
        -> Result<(), StoreError>;

    /// Shallow patch of an existing document. `NotFound` if the id is unknown.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError>;

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>, StoreError>;

    async fn subscribe(&self, collection: &str, query: Query)
        -> Result<Subscription, StoreError>;
}

/// Serializes a timestamp the way every adapter writes it: RFC3339, UTC,
/// microsecond precision, so string order is chronological order.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Replaces every `SERVER_TIMESTAMP` sentinel in the value tree with the
/// adapter's clock reading.
pub(crate) fn resolve_server_timestamps(value: &mut Value, now: DateTime<Utc>) {
    match value {
        Value::String(s) if s == SERVER_TIMESTAMP => {
            *value = Value::String(encode_timestamp(now));
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                resolve_server_timestamps(v, now);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                resolve_server_timestamps(v, now);
            }
        }
        _ => {}
    }
}

/// Shallow merge: top-level keys of `patch` overlay `target`.
pub(crate) fn merge_shallow(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        *target = patch;
        return;
    };
    match target {
        Value::Object(map) => {
            for (k, v) in patch {
                map.insert(k, v);
            }
        }
        _ => *target = Value::Object(patch),
    }
}

pub(crate) fn matches(data: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(field, expected) => data.get(field) == Some(expected),
        Filter::IsNull(field) => matches!(data.get(field), None | Some(Value::Null)),
        Filter::NotNull(field) => !matches!(data.get(field), None | Some(Value::Null)),
    })
}

/// Sort key for descending-order fields. Timestamps compare correctly as
/// strings because of the fixed `encode_timestamp` format.
pub(crate) fn order_key(data: &Value, field: &str) -> String {
    match data.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Applies filter/order/limit to an in-memory document set. Shared by the
/// memory adapter and the fallback mirror.
pub(crate) fn eval_query(docs: &[Document], query: &Query) -> Vec<Document> {
    let mut out: Vec<Document> = docs
        .iter()
        .filter(|d| matches(&d.data, &query.filters))
        .cloned()
        .collect();
    if let Some(field) = &query.order_desc_by {
        out.sort_by(|a, b| order_key(&b.data, field).cmp(&order_key(&a.data, field)));
    }
    if let Some(limit) = query.limit {
        out.truncate(limit);
    }
    out
}
