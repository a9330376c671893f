//! Postgres-backed document store. Documents live in a single jsonb table;
//! live subscriptions re-run their query whenever a LISTEN/NOTIFY change
//! notification for the collection arrives.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Pool, Postgres, QueryBuilder};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use super::{
    queries, resolve_server_timestamps, Document, DocumentStore, Filter, Query, StoreError,
    Subscription, SubscriptionHandle,
};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str) -> Result<DbPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(50)
        .connect(database_url)
        .await
        .map_err(map_db_err)?;
    Ok(pool)
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    /// Wraps an existing pool and ensures the documents schema exists.
    pub async fn new(pool: DbPool) -> Result<Self, StoreError> {
        sqlx::query(queries::CREATE_DOCUMENTS_TABLE)
            .execute(&pool)
            .await
            .map_err(map_db_err)?;
        sqlx::query(queries::CREATE_DOCUMENTS_ORDER_INDEX)
            .execute(&pool)
            .await
            .map_err(map_db_err)?;
        Ok(Self { pool })
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Self::new(init_pool(database_url).await?).await
    }

    /// Server-side clock, so stamps survive client clock skew.
    async fn server_now(&self) -> Result<DateTime<Utc>, StoreError> {
        sqlx::query_scalar::<_, DateTime<Utc>>(queries::SELECT_SERVER_NOW)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, collection: &str, mut data: Value) -> Result<String, StoreError> {
        let now = self.server_now().await?;
        resolve_server_timestamps(&mut data, now);
        let id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        sqlx::query(queries::INSERT_DOCUMENT)
            .bind(collection)
            .bind(&id)
            .bind(Json(data))
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        sqlx::query(queries::NOTIFY_COLLECTION_CHANGED)
            .bind(collection)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let data: Option<Json<Value>> = sqlx::query_scalar(queries::SELECT_DOCUMENT)
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(data.map(|data| Document {
            id: id.to_string(),
            data: data.0,
        }))
    }

    async fn upsert_merge(
        &self,
        collection: &str,
        id: &str,
        mut data: Value,
    ) -> Result<(), StoreError> {
        let now = self.server_now().await?;
        resolve_server_timestamps(&mut data, now);

        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        sqlx::query(queries::UPSERT_DOCUMENT_MERGE)
            .bind(collection)
            .bind(id)
            .bind(Json(data))
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        sqlx::query(queries::NOTIFY_COLLECTION_CHANGED)
            .bind(collection)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Value) -> Result<(), StoreError> {
        let now = self.server_now().await?;
        resolve_server_timestamps(&mut patch, now);

        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        let result = sqlx::query(queries::UPDATE_DOCUMENT_PATCH)
            .bind(collection)
            .bind(id)
            .bind(Json(patch))
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        sqlx::query(queries::NOTIFY_COLLECTION_CHANGED)
            .bind(collection)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>, StoreError> {
        run_query(&self.pool, collection, &query).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        query: Query,
    ) -> Result<Subscription, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(map_db_err)?;
        listener
            .listen(queries::CHANGE_CHANNEL)
            .await
            .map_err(map_db_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let pool = self.pool.clone();
        let collection = collection.to_string();

        tokio::spawn(async move {
            let mut last: Option<Vec<Document>> = None;
            loop {
                // initial snapshot on the first pass, refresh on each change
                match run_query(&pool, &collection, &query).await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            if tx.send(snapshot.clone()).is_err() {
                                return;
                            }
                            last = Some(snapshot);
                        }
                    }
                    Err(err) => warn!("subscription query on {} failed: {}", collection, err),
                }

                loop {
                    tokio::select! {
                        _ = task_token.cancelled() => return,
                        notification = listener.recv() => match notification {
                            Ok(n) if n.payload() == collection => break,
                            Ok(_) => continue,
                            Err(err) => {
                                warn!("change listener error: {}. Retrying...", err);
                                tokio::time::sleep(Duration::from_millis(500)).await;
                            }
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, SubscriptionHandle::new(token)))
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    doc_id: String,
    data: Json<Value>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.doc_id,
            data: row.data.0,
        }
    }
}

async fn run_query(
    pool: &DbPool,
    collection: &str,
    query: &Query,
) -> Result<Vec<Document>, StoreError> {
    let mut builder = build_select(collection, query)?;
    let rows: Vec<DocumentRow> = builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(map_db_err)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

fn build_select(
    collection: &str,
    query: &Query,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    for filter in &query.filters {
        let field = match filter {
            Filter::Eq(field, _) | Filter::IsNull(field) | Filter::NotNull(field) => field,
        };
        check_field(field)?;
    }
    if let Some(field) = &query.order_desc_by {
        check_field(field)?;
    }

    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT doc_id, data FROM documents WHERE collection = ");
    builder.push_bind(collection.to_string());
    for filter in &query.filters {
        match filter {
            Filter::Eq(field, value) => {
                builder.push(format!(" AND data->'{field}' = "));
                builder.push_bind(Json(value.clone()));
            }
            Filter::IsNull(field) => {
                builder.push(format!(
                    " AND (data->'{field}' IS NULL OR data->'{field}' = 'null'::jsonb)"
                ));
            }
            Filter::NotNull(field) => {
                builder.push(format!(
                    " AND data->'{field}' IS NOT NULL AND data->'{field}' <> 'null'::jsonb"
                ));
            }
        }
    }
    if let Some(field) = &query.order_desc_by {
        // documents without the order field sort after dated ones, matching
        // the in-memory adapter's ordering
        builder.push(format!(" ORDER BY data->>'{field}' DESC NULLS LAST"));
    }
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }
    Ok(builder)
}

/// Field names are interpolated into jsonb path expressions, so only plain
/// identifier-like names are accepted.
fn check_field(field: &str) -> Result<(), StoreError> {
    let ok = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

/// Postgres reports denied rules as SQLSTATE 42501 (insufficient privilege).
fn map_db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("42501") {
            return StoreError::PermissionDenied;
        }
    }
    StoreError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_selects_put_undated_documents_last() {
        let query = Query::new()
            .filter_eq("userId", serde_json::json!("u1"))
            .order_desc("createdAt")
            .limit(5);
        let sql = build_select("sos-alerts", &query).unwrap().into_sql();
        assert!(sql.contains("ORDER BY data->>'createdAt' DESC NULLS LAST"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn field_names_are_restricted_to_identifiers() {
        assert!(check_field("createdAt").is_ok());
        assert!(check_field("is_active2").is_ok());
        assert!(check_field("").is_err());
        assert!(check_field("a'; DROP TABLE documents; --").is_err());
        assert!(check_field("data->>x").is_err());
    }
}
